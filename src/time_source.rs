//! Time keeping and calendar formatting

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use embassy_time::Instant;

use crate::ui::Label;

// Include current UTC epoch at compile time
include!(concat!(env!("OUT_DIR"), "/utc.rs"));

/// Wall clock built from a known UTC time and the monotonic system time.
#[derive(Clone, Copy)]
pub struct WallClock {
    /// Clock time in milliseconds since the Unix epoch
    reference_millis: i64,
    /// Related system time
    instant: Instant,
}

impl WallClock {
    /// Start from the time the firmware was built.
    pub fn from_build_time() -> Self {
        Self::from_utc_millis(BUILD_UTC_MILLIS)
    }

    /// Start from a UTC time in milliseconds since the Unix epoch.
    pub fn from_utc_millis(reference_millis: i64) -> Self {
        Self {
            reference_millis,
            instant: Instant::now(),
        }
    }

    /// Current UTC time in milliseconds since the Unix epoch.
    pub fn now_millis(&self) -> i64 {
        let elapsed = Instant::now().duration_since(self.instant);
        self.reference_millis + elapsed.as_millis() as i64
    }

    /// Update time reference
    pub fn set_time(&mut self, utc_millis: i64) {
        *self = Self::from_utc_millis(utc_millis);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DateOrder {
    MonthDayYear,
    DayMonthYear,
    YearMonthDay,
}

/// Short numeric date, e.g. `3/3/24` or `03.03.24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DatePattern {
    pub order: DateOrder,
    pub separator: char,
    /// Zero-pad day and month
    pub pad: bool,
    /// Four digit year instead of two
    pub full_year: bool,
}

/// Calendar names and formats of a language/region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Locale {
    /// Day names, Monday first
    pub weekdays: [&'static str; 7],
    pub short_date: DatePattern,
    pub am: &'static str,
    pub pm: &'static str,
}

const ENGLISH_WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl Locale {
    pub const EN_US: Self = Self {
        weekdays: ENGLISH_WEEKDAYS,
        short_date: DatePattern {
            order: DateOrder::MonthDayYear,
            separator: '/',
            pad: false,
            full_year: false,
        },
        am: "AM",
        pm: "PM",
    };

    pub const EN_GB: Self = Self {
        weekdays: ENGLISH_WEEKDAYS,
        short_date: DatePattern {
            order: DateOrder::DayMonthYear,
            separator: '/',
            pad: true,
            full_year: true,
        },
        am: "am",
        pm: "pm",
    };

    pub const DE_DE: Self = Self {
        weekdays: [
            "Montag",
            "Dienstag",
            "Mittwoch",
            "Donnerstag",
            "Freitag",
            "Samstag",
            "Sonntag",
        ],
        short_date: DatePattern {
            order: DateOrder::DayMonthYear,
            separator: '.',
            pad: true,
            full_year: false,
        },
        am: "AM",
        pm: "PM",
    };

    pub const FR_FR: Self = Self {
        weekdays: [
            "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche",
        ],
        short_date: DatePattern {
            order: DateOrder::DayMonthYear,
            separator: '/',
            pad: true,
            full_year: true,
        },
        am: "AM",
        pm: "PM",
    };
}

impl Default for Locale {
    fn default() -> Self {
        Self::EN_US
    }
}

/// Locale and timezone as currently reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Environment {
    pub locale: Locale,
    pub utc_offset: FixedOffset,
}

impl Environment {
    pub fn utc(locale: Locale) -> Self {
        Self {
            locale,
            utc_offset: Utc.fix(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::utc(Locale::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AmPm {
    Am,
    Pm,
}

/// Everything the face shows about the current time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockSnapshot {
    /// 1–12
    pub hour12: u32,
    pub minute: u32,
    pub second: u32,
    pub am_pm: AmPm,
    pub weekday: Label,
    pub date_line: Label,
}

/// Formats wall clock time for the current locale and timezone.
///
/// Rebuilt whenever the environment changes while the face listens for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSource {
    utc_offset: FixedOffset,
    weekdays: [&'static str; 7],
    date_format: DatePattern,
    am_pm: [&'static str; 2],
}

impl TimeSource {
    pub fn new(environment: Environment) -> Self {
        let locale = environment.locale;
        Self {
            utc_offset: environment.utc_offset,
            weekdays: locale.weekdays,
            date_format: locale.short_date,
            am_pm: [locale.am, locale.pm],
        }
    }

    /// Break `now_ms` (UTC milliseconds since the epoch) down for display.
    pub fn snapshot(&self, now_ms: i64) -> ClockSnapshot {
        let utc = DateTime::<Utc>::from_timestamp(
            now_ms.div_euclid(1_000),
            (now_ms.rem_euclid(1_000) * 1_000_000) as u32,
        )
        .unwrap_or_default();
        let local = utc.with_timezone(&self.utc_offset);
        let hour = local.hour();

        ClockSnapshot {
            hour12: display_hour(hour % 12),
            minute: local.minute(),
            second: local.second(),
            am_pm: if hour < 12 { AmPm::Am } else { AmPm::Pm },
            weekday: Label::new(self.weekdays[local.weekday().num_days_from_monday() as usize])
                .unwrap_or_default(),
            date_line: self.format_date(&local),
        }
    }

    pub fn am_pm(&self, am_pm: AmPm) -> &'static str {
        match am_pm {
            AmPm::Am => self.am_pm[0],
            AmPm::Pm => self.am_pm[1],
        }
    }

    fn format_date(&self, date: &impl Datelike) -> Label {
        let pattern = self.date_format;
        let sep = pattern.separator;
        let width = if pattern.pad { 2 } else { 1 };
        let (year, year_width) = if pattern.full_year {
            (date.year(), 4)
        } else {
            (date.year().rem_euclid(100), 2)
        };
        let (day, month) = (date.day(), date.month());

        match pattern.order {
            DateOrder::MonthDayYear => Label::format(format_args!(
                "{:0w$}{}{:0w$}{}{:0yw$}",
                month,
                sep,
                day,
                sep,
                year,
                w = width,
                yw = year_width
            )),
            DateOrder::DayMonthYear => Label::format(format_args!(
                "{:0w$}{}{:0w$}{}{:0yw$}",
                day,
                sep,
                month,
                sep,
                year,
                w = width,
                yw = year_width
            )),
            DateOrder::YearMonthDay => Label::format(format_args!(
                "{:0yw$}{}{:0w$}{}{:0w$}",
                year,
                sep,
                month,
                sep,
                day,
                w = width,
                yw = year_width
            )),
        }
        .unwrap_or_default()
    }
}

/// Hour on a 12 hour dial: 0 is shown as 12, 1–12 as themselves.
///
/// Expects 0–12; 24 hour values are out of range.
pub const fn display_hour(hour: u32) -> u32 {
    if hour == 0 {
        12
    } else {
        hour
    }
}

/// Zero-padded two digit number, for minutes and seconds.
pub fn two_digits(value: u32) -> Label {
    Label::format(format_args!("{:02}", value)).unwrap_or_default()
}

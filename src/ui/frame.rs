//! Digital weather face
//!
//! Layout, top to bottom: `h:mm:ss` (or `h:mm AM` when dimmed), day of week, date,
//! a blank line, the high/low temperatures and the weather icon.

use embedded_graphics::{
    prelude::*,
    primitives::Rectangle,
};

use super::{DrawCommand, DrawList, Label, TextRole};
use crate::config::COLON_BLINK_PERIOD_MS;
use crate::render_state::{DisplayGeometry, WeatherSnapshot};
use crate::time_source::{two_digits, TimeSource};

const COLON: &str = ":";

/// Display mode for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RenderMode {
    pub ambient: bool,
    pub muted: bool,
    /// A peek card covers the lower part of the screen
    pub peek_card: bool,
}

impl RenderMode {
    /// No blinking and no seconds in these modes.
    pub const fn low_power(&self) -> bool {
        self.ambient || self.muted
    }
}

/// Colons are shown for the first half of each second so they blink on when the
/// time updates, and permanently while dimmed.
pub fn colon_visible(now_ms: i64, mode: RenderMode) -> bool {
    mode.low_power() || now_ms.rem_euclid(COLON_BLINK_PERIOD_MS) < COLON_BLINK_PERIOD_MS / 2
}

/// Produce the draw sequence for the frame at `now_ms`.
pub fn render<'a>(
    now_ms: i64,
    time: &TimeSource,
    geometry: &DisplayGeometry,
    weather: &'a WeatherSnapshot,
    mode: RenderMode,
) -> DrawList<'a> {
    let clock = time.snapshot(now_ms);
    let show_colons = colon_visible(now_ms, mode);
    let colon = Label::new(COLON).unwrap_or_default();
    let colon_width = geometry.text_width(TextRole::Colon, COLON);
    let mut frame = Frame::default();

    // Draw the background
    frame.push(DrawCommand::Background {
        area: Rectangle::new(Point::zero(), geometry.bounds),
        color: geometry.palette.background,
    });

    // Draw the hours
    let y = geometry.y_offset;
    let mut x = geometry.x_offset;
    let hour = Label::format(format_args!("{}", clock.hour12)).unwrap_or_default();
    frame.text(hour, Point::new(x, y), TextRole::Hour);
    x += geometry.text_width(TextRole::Hour, hour.as_str());

    if show_colons {
        frame.text(colon, Point::new(x, y), TextRole::Colon);
    }
    x += colon_width;

    // Draw the minutes
    let minute = two_digits(clock.minute);
    frame.text(minute, Point::new(x, y), TextRole::Minute);
    x += geometry.text_width(TextRole::Minute, minute.as_str());

    // Seconds only while fully interactive, AM/PM otherwise
    if mode.low_power() {
        x += colon_width;
        let am_pm = Label::new(time.am_pm(clock.am_pm)).unwrap_or_default();
        frame.text(am_pm, Point::new(x, y), TextRole::AmPm);
    } else {
        if show_colons {
            frame.text(colon, Point::new(x, y), TextRole::Colon);
        }
        x += colon_width;
        frame.text(two_digits(clock.second), Point::new(x, y), TextRole::Second);
    }

    // The rest would bleed into a peek card
    if mode.peek_card {
        return frame.commands;
    }

    let line = geometry.line_height;
    frame.text(
        clock.weekday,
        Point::new(geometry.x_offset, y + line),
        TextRole::Date,
    );
    frame.text(
        clock.date_line,
        Point::new(geometry.x_offset, y + line * 2),
        TextRole::Date,
    );

    if let (Some(high), Some(low)) = (weather.high_temp(), weather.low_temp()) {
        match Label::format(format_args!("{} {}", high, low)) {
            Ok(temps) => {
                let half_width = geometry.text_width(TextRole::Date, temps.as_str()) / 2;
                frame.text(
                    temps,
                    Point::new(geometry.center_x() - half_width, y + line * 4),
                    TextRole::Date,
                );
            }
            Err(e) => warn!("Weather line does not fit: {:?}", e),
        }
    }

    if let Some(icon) = weather.icon() {
        frame.push(DrawCommand::Bitmap {
            icon,
            position: Point::new(
                geometry.center_x() - icon.width() as i32 / 2,
                y + line * 5,
            ),
        });
    }

    frame.commands
}

#[derive(Default)]
struct Frame<'a> {
    commands: DrawList<'a>,
}

impl<'a> Frame<'a> {
    fn push(&mut self, command: DrawCommand<'a>) {
        if self.commands.push(command).is_err() {
            error!("Frame is full, dropping draw command");
        }
    }

    fn text(&mut self, text: Label, position: Point, role: TextRole) {
        self.push(DrawCommand::Text {
            text,
            position,
            role,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_state::{WeatherIcon, WeatherSnapshot};
    use crate::time_source::{Environment, Locale};
    use crate::ui::MAX_TEXT_LEN;

    /// 2024-03-03 (a Sunday) 12:00:00.250 UTC
    const NOON: i64 = 1_709_467_200_250;
    /// 2024-03-03 00:05:09.000 UTC
    const AFTER_MIDNIGHT: i64 = 1_709_424_309_000;

    fn time_source() -> TimeSource {
        TimeSource::new(Environment::utc(Locale::EN_US))
    }

    fn texts<'a>(frame: &'a DrawList<'_>) -> Vec<(&'a str, Point, TextRole)> {
        frame
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Text {
                    text,
                    position,
                    role,
                } => Some((text.as_str(), *position, *role)),
                _ => None,
            })
            .collect()
    }

    fn has_role(frame: &DrawList<'_>, wanted: TextRole) -> bool {
        texts(frame).iter().any(|(_, _, role)| *role == wanted)
    }

    fn colon_count(frame: &DrawList<'_>) -> usize {
        texts(frame)
            .iter()
            .filter(|(_, _, role)| *role == TextRole::Colon)
            .count()
    }

    fn weather(high: Option<&str>, low: Option<&str>) -> WeatherSnapshot {
        let mut weather = WeatherSnapshot::default();
        weather.set_temperatures(
            high.map(|t| Label::new(t).unwrap()),
            low.map(|t| Label::new(t).unwrap()),
        );
        weather
    }

    fn icon() -> WeatherIcon {
        let mut data = vec![4, 0, 2, 0];
        data.extend_from_slice(&[0xff; 16]);
        WeatherIcon::decode(&data).unwrap()
    }

    #[test]
    fn test_colon_blinks_only_when_interactive() {
        let interactive = RenderMode::default();
        assert!(colon_visible(0, interactive));
        assert!(colon_visible(499, interactive));
        assert!(!colon_visible(500, interactive));
        assert!(!colon_visible(999, interactive));
        assert!(colon_visible(1_000, interactive));

        let ambient = RenderMode {
            ambient: true,
            ..Default::default()
        };
        let muted = RenderMode {
            muted: true,
            ..Default::default()
        };
        for ms in [0, 250, 500, 750, 999] {
            assert!(colon_visible(ms, ambient));
            assert!(colon_visible(ms, muted));
        }
    }

    #[test]
    fn test_interactive_noon_shows_seconds() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = WeatherSnapshot::default();
        let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());

        let texts = texts(&frame);
        assert_eq!(texts[0].0, "12");
        assert_eq!(texts[0].2, TextRole::Hour);
        assert_eq!(colon_count(&frame), 2);

        let seconds: Vec<_> = texts.iter().filter(|t| t.2 == TextRole::Second).collect();
        assert_eq!(seconds.len(), 1);
        assert_eq!(seconds[0].0, "00");
        assert!(!has_role(&frame, TextRole::AmPm));
    }

    #[test]
    fn test_second_half_of_second_hides_colons() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = WeatherSnapshot::default();
        let frame = render(
            NOON + 500,
            &time_source(),
            &geometry,
            &weather,
            RenderMode::default(),
        );
        assert_eq!(colon_count(&frame), 0);
        assert!(has_role(&frame, TextRole::Second));
    }

    #[test]
    fn test_ambient_shows_am_pm_instead_of_seconds() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = WeatherSnapshot::default();
        let mode = RenderMode {
            ambient: true,
            ..Default::default()
        };
        let frame = render(NOON + 600, &time_source(), &geometry, &weather, mode);

        assert_eq!(colon_count(&frame), 1);
        assert!(!has_role(&frame, TextRole::Second));
        let am_pm: Vec<_> = texts(&frame)
            .into_iter()
            .filter(|t| t.2 == TextRole::AmPm)
            .collect();
        assert_eq!(am_pm.len(), 1);
        assert_eq!(am_pm[0].0, "PM");
    }

    #[test]
    fn test_midnight_hour_and_padding() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = WeatherSnapshot::default();
        let mode = RenderMode {
            muted: true,
            ..Default::default()
        };
        let frame = render(AFTER_MIDNIGHT, &time_source(), &geometry, &weather, mode);
        let texts = texts(&frame);

        assert_eq!(texts[0].0, "12");
        let minute = texts.iter().find(|t| t.2 == TextRole::Minute).unwrap();
        assert_eq!(minute.0, "05");
        let am_pm = texts.iter().find(|t| t.2 == TextRole::AmPm).unwrap();
        assert_eq!(am_pm.0, "AM");
    }

    #[test]
    fn test_time_row_advances_by_measured_width() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = WeatherSnapshot::default();
        let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());
        let texts = texts(&frame);

        let hour = texts[0];
        let minute = texts.iter().find(|t| t.2 == TextRole::Minute).unwrap();
        let second = texts.iter().find(|t| t.2 == TextRole::Second).unwrap();
        let colon = geometry.text_width(TextRole::Colon, ":");

        assert_eq!(hour.1, Point::new(geometry.x_offset, geometry.y_offset));
        assert_eq!(
            minute.1.x,
            hour.1.x + geometry.text_width(TextRole::Hour, "12") + colon
        );
        assert_eq!(
            second.1.x,
            minute.1.x + geometry.text_width(TextRole::Minute, "00") + colon
        );
    }

    #[test]
    fn test_date_lines() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = WeatherSnapshot::default();
        let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());
        let dates: Vec<_> = texts(&frame)
            .into_iter()
            .filter(|t| t.2 == TextRole::Date)
            .collect();

        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].0, "Sunday");
        assert_eq!(dates[0].1.y, geometry.y_offset + geometry.line_height);
        assert_eq!(dates[1].0, "3/3/24");
        assert_eq!(dates[1].1.y, geometry.y_offset + geometry.line_height * 2);
    }

    #[test]
    fn test_weather_line_is_centered() {
        let geometry = DisplayGeometry::for_shape(false);
        let weather = weather(Some("72°"), Some("58°"));
        let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());

        let line = texts(&frame)
            .into_iter()
            .find(|t| t.0 == "72° 58°")
            .unwrap();
        let width = geometry.text_width(TextRole::Date, "72° 58°");
        assert_eq!(line.1.x, geometry.center_x() - width / 2);
        assert_eq!(line.1.y, geometry.y_offset + geometry.line_height * 4);
    }

    #[test]
    fn test_long_temperatures_stay_on_the_weather_line() {
        let geometry = DisplayGeometry::for_shape(false);
        let high = "High 72°F feels 75°F";
        let low = "Low 58°F feels 55°F";
        let state = weather(Some(high), Some(low));
        let frame = render(
            NOON,
            &time_source(),
            &geometry,
            &state,
            RenderMode::default(),
        );

        let line = texts(&frame)
            .into_iter()
            .find(|t| t.1.y == geometry.y_offset + geometry.line_height * 4)
            .unwrap();
        assert_eq!(line.0, "High 72°F feels 75°F Low 58°F feels 55°F");

        // The widest values the decoder lets through still fit
        let widest = "9".repeat(MAX_TEXT_LEN);
        let state = weather(Some(&widest), Some(&widest));
        let frame = render(
            NOON,
            &time_source(),
            &geometry,
            &state,
            RenderMode::default(),
        );
        let dates: Vec<_> = texts(&frame)
            .into_iter()
            .filter(|t| t.2 == TextRole::Date)
            .collect();
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[2].0.len(), 2 * MAX_TEXT_LEN + 1);
    }

    #[test]
    fn test_weather_line_needs_both_temperatures() {
        let geometry = DisplayGeometry::for_shape(false);
        for weather in [weather(Some("72°"), None), weather(None, Some("58°"))] {
            let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());
            let dates = texts(&frame)
                .into_iter()
                .filter(|t| t.2 == TextRole::Date)
                .count();
            assert_eq!(dates, 2);
        }
    }

    #[test]
    fn test_icon_centered_below_weather() {
        let geometry = DisplayGeometry::for_shape(false);
        let mut weather = weather(Some("72°"), Some("58°"));
        weather.replace_icon(icon());
        let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());

        let position = frame
            .iter()
            .find_map(|command| match command {
                DrawCommand::Bitmap { position, .. } => Some(*position),
                _ => None,
            })
            .unwrap();
        assert_eq!(position.x, geometry.center_x() - 2);
        assert_eq!(position.y, geometry.y_offset + geometry.line_height * 5);
        assert!(matches!(frame.last(), Some(DrawCommand::Bitmap { .. })));
    }

    #[test]
    fn test_peek_card_hides_lower_lines() {
        let geometry = DisplayGeometry::for_shape(false);
        let mut weather = weather(Some("72°"), Some("58°"));
        weather.replace_icon(icon());
        let mode = RenderMode {
            peek_card: true,
            ..Default::default()
        };
        let frame = render(NOON, &time_source(), &geometry, &weather, mode);

        assert!(!has_role(&frame, TextRole::Date));
        assert!(!frame
            .iter()
            .any(|command| matches!(command, DrawCommand::Bitmap { .. })));
        // The time itself is still there
        assert!(has_role(&frame, TextRole::Second));
    }

    #[test]
    fn test_background_comes_first() {
        let geometry = DisplayGeometry::for_shape(true);
        let weather = WeatherSnapshot::default();
        let frame = render(NOON, &time_source(), &geometry, &weather, RenderMode::default());
        assert_eq!(
            frame[0],
            DrawCommand::Background {
                area: Rectangle::new(Point::zero(), geometry.bounds),
                color: geometry.palette.background,
            }
        );
        let hour = texts(&frame)[0];
        assert_eq!(hour.1.x, geometry.x_offset);
    }
}

//! State read by the renderer: the latest weather and the display geometry.

use embedded_graphics::{
    mono_font::{MonoFont, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    text::{renderer::TextRenderer, Baseline},
};
use profont::{PROFONT_12_POINT, PROFONT_14_POINT, PROFONT_24_POINT};

use crate::config::{
    ICON_HEADER_LEN, LCD_H, LCD_W, LINE_HEIGHT, MAX_ICON_PIXEL_BYTES, MAX_ICON_SIDE, X_OFFSET,
    X_OFFSET_ROUND, Y_OFFSET,
};
use crate::ui::{Label, TextRole};

/// Decoded weather icon, RGB565 little endian.
///
/// Only [`WeatherIcon::decode`] creates icons, so an icon is always complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeatherIcon {
    width: u32,
    height: u32,
    pixels: heapless::Vec<u8, MAX_ICON_PIXEL_BYTES>,
}

impl WeatherIcon {
    /// Decode an icon asset: width and height as little endian `u16`, followed by
    /// `width * height` RGB565 pixels.
    pub fn decode(data: &[u8]) -> Result<Self, IconError> {
        if data.len() < ICON_HEADER_LEN {
            return Err(IconError::Truncated);
        }
        let width = u16::from_le_bytes([data[0], data[1]]) as u32;
        let height = u16::from_le_bytes([data[2], data[3]]) as u32;
        if width == 0 || height == 0 || width > MAX_ICON_SIDE || height > MAX_ICON_SIDE {
            return Err(IconError::InvalidSize);
        }

        let body = &data[ICON_HEADER_LEN..];
        if body.len() != (width * height * 2) as usize {
            return Err(IconError::LengthMismatch);
        }
        let pixels = heapless::Vec::from_slice(body).map_err(|_| IconError::InvalidSize)?;

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IconError {
    /// Shorter than the header
    Truncated,
    /// Zero sized or larger than the icon slot
    InvalidSize,
    /// Pixel data does not match the header
    LengthMismatch,
}

/// Latest weather received from the companion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeatherSnapshot {
    high_temp: Option<Label>,
    low_temp: Option<Label>,
    icon: Option<WeatherIcon>,
}

impl WeatherSnapshot {
    pub fn high_temp(&self) -> Option<&Label> {
        self.high_temp.as_ref()
    }

    pub fn low_temp(&self) -> Option<&Label> {
        self.low_temp.as_ref()
    }

    pub fn icon(&self) -> Option<&WeatherIcon> {
        self.icon.as_ref()
    }

    pub(crate) fn set_temperatures(&mut self, high: Option<Label>, low: Option<Label>) {
        self.high_temp = high;
        self.low_temp = low;
    }

    pub(crate) fn replace_icon(&mut self, icon: WeatherIcon) {
        self.icon = Some(icon);
    }
}

/// Colors of the face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb565,
    pub digits: Rgb565,
    pub text: Rgb565,
}

impl Palette {
    /// Light blue background with white text
    pub const SUNSHINE: Self = Self {
        background: Rgb565::new(0, 42, 30),
        digits: Rgb565::WHITE,
        text: Rgb565::WHITE,
    };
}

/// Positions, fonts and colors, fixed until the next shape change.
#[derive(Clone, Copy)]
pub struct DisplayGeometry {
    pub is_round: bool,
    pub bounds: Size,
    /// Left edge of the time and date lines
    pub x_offset: i32,
    /// Baseline of the time row
    pub y_offset: i32,
    pub line_height: i32,
    pub digits_font: &'static MonoFont<'static>,
    pub am_pm_font: &'static MonoFont<'static>,
    pub date_font: &'static MonoFont<'static>,
    pub palette: Palette,
}

impl DisplayGeometry {
    /// Geometry for a round or square screen.
    pub fn for_shape(is_round: bool) -> Self {
        Self {
            is_round,
            bounds: Size::new(LCD_W, LCD_H),
            x_offset: if is_round { X_OFFSET_ROUND } else { X_OFFSET },
            y_offset: Y_OFFSET,
            line_height: LINE_HEIGHT,
            digits_font: &PROFONT_24_POINT,
            am_pm_font: if is_round {
                &PROFONT_12_POINT
            } else {
                &PROFONT_14_POINT
            },
            date_font: &PROFONT_12_POINT,
            palette: Palette::SUNSHINE,
        }
    }

    pub fn center_x(&self) -> i32 {
        self.bounds.width as i32 / 2
    }

    /// Character style for a piece of text.
    pub fn text_style(&self, role: TextRole) -> MonoTextStyle<'static, Rgb565> {
        match role {
            TextRole::Hour | TextRole::Minute | TextRole::Second | TextRole::Colon => {
                MonoTextStyle::new(self.digits_font, self.palette.digits)
            }
            TextRole::AmPm => MonoTextStyle::new(self.am_pm_font, self.palette.text),
            TextRole::Date => MonoTextStyle::new(self.date_font, self.palette.text),
        }
    }

    /// Horizontal advance of `text` drawn in the font of `role`.
    pub fn text_width(&self, role: TextRole, text: &str) -> i32 {
        self.text_style(role)
            .measure_string(text, Point::zero(), Baseline::Alphabetic)
            .next_position
            .x
    }
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self::for_shape(false)
    }
}

/// Everything the renderer reads besides the time.
#[derive(Clone, Default)]
pub struct RenderState {
    weather: WeatherSnapshot,
    geometry: DisplayGeometry,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weather(&self) -> &WeatherSnapshot {
        &self.weather
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    /// Forget everything, as on a fresh start.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn apply_shape(&mut self, is_round: bool) {
        self.geometry = DisplayGeometry::for_shape(is_round);
    }

    pub(crate) fn weather_mut(&mut self) -> &mut WeatherSnapshot {
        &mut self.weather
    }
}

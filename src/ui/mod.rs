//! UI definitions module
//!
//! A frame is described as a short list of [`DrawCommand`]s which can be checked
//! without a screen and executed against any `embedded-graphics` draw target.

use core::fmt;

use embedded_graphics::{
    image::{Image, ImageRawLE},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

use crate::render_state::{DisplayGeometry, WeatherIcon};

mod frame;

pub use frame::{colon_visible, render, RenderMode};

/// Longest single text value accepted from the companion.
pub const MAX_TEXT_LEN: usize = 32;

// Two values and a separator, as on the weather line
const LABEL_LEN: usize = 2 * MAX_TEXT_LEN + 1;

/// Most commands a single frame can hold.
pub const MAX_DRAW_COMMANDS: usize = 12;

/// Ordered draw commands for one frame.
pub type DrawList<'a> = heapless::Vec<DrawCommand<'a>, MAX_DRAW_COMMANDS>;

/// Fixed-capacity text for anything that ends up on screen.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Label {
    str_buf: [u8; LABEL_LEN],
    len: usize,
}

impl Label {
    /// Create an empty label
    pub const fn empty() -> Self {
        Self {
            str_buf: [0; LABEL_LEN],
            len: 0,
        }
    }

    /// Create a label holding a copy of `text`.
    pub fn new(text: &str) -> Result<Self, Error> {
        let bytes = text.as_bytes();
        if bytes.len() > LABEL_LEN {
            return Err(Error::Overflow);
        }
        let mut label = Self::empty();
        label.str_buf[..bytes.len()].copy_from_slice(bytes);
        label.len = bytes.len();
        Ok(label)
    }

    /// Create a label from format arguments.
    pub fn format(args: fmt::Arguments<'_>) -> Result<Self, Error> {
        let mut str_buf = [0; LABEL_LEN];
        let len = format_no_std::show(&mut str_buf, args)
            .map_err(|_| Error::Overflow)?
            .len();
        Ok(Self { str_buf, len })
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from `&str` or `fmt`, so always valid UTF-8
        core::str::from_utf8(&self.str_buf[..self.len]).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Label {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.as_str())
    }
}

/// Which font and color a piece of text is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TextRole {
    Hour,
    Minute,
    Second,
    Colon,
    AmPm,
    /// Day of week, date and weather lines
    Date,
}

/// One step of a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand<'a> {
    /// Fill `area` with `color`
    Background { area: Rectangle, color: Rgb565 },
    /// Text with its alphabetic baseline at `position`
    Text {
        text: Label,
        position: Point,
        role: TextRole,
    },
    /// Icon with its top left corner at `position`
    Bitmap {
        icon: &'a WeatherIcon,
        position: Point,
    },
}

impl DrawCommand<'_> {
    /// Execute the command on `target` using the fonts and colors of `geometry`.
    pub fn draw<D>(&self, geometry: &DisplayGeometry, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        match self {
            DrawCommand::Background { area, color } => {
                area.into_styled(PrimitiveStyle::with_fill(*color))
                    .draw(target)?;
            }
            DrawCommand::Text {
                text,
                position,
                role,
            } => {
                Text::with_baseline(
                    text.as_str(),
                    *position,
                    geometry.text_style(*role),
                    Baseline::Alphabetic,
                )
                .draw(target)?;
            }
            DrawCommand::Bitmap { icon, position } => {
                let raw: ImageRawLE<Rgb565> = ImageRawLE::new(icon.pixels(), icon.width());
                Image::new(&raw, *position).draw(target)?;
            }
        }
        Ok(())
    }
}

/// Draw a whole frame in order.
pub fn draw_frame<D>(
    commands: &[DrawCommand<'_>],
    geometry: &DisplayGeometry,
    target: &mut D,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    for command in commands {
        command.draw(geometry, target)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Text does not fit into a label
    Overflow,
}

//! PineTime peripherals used by the face

pub(super) mod backlight;
pub(super) mod button;
pub(super) mod display;

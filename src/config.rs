//! Watch face configuration constants
//!
//! Timing, layout and transport limits shared by the core and the firmware.

use embassy_time::Duration;

// =============================================================================
// Redraw cadence
// =============================================================================

/// Redraw period while interactive: twice a second so the colons can blink.
pub const NORMAL_UPDATE_RATE_MS: u64 = 500;

/// Redraw period while muted or in ambient mode.
pub const MUTE_UPDATE_RATE_MS: u64 = 60_000;

/// Colons are shown for the first half of every second.
pub const COLON_BLINK_PERIOD_MS: i64 = 1_000;

// =============================================================================
// Asset transfer
// =============================================================================

/// How long the fetcher waits for the data channel before giving up.
pub const ASSET_CONNECT_TIMEOUT: Duration = Duration::from_millis(30);

/// Upper bound for reading a complete asset from the companion.
pub const ASSET_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest weather icon edge in pixels.
pub const MAX_ICON_SIDE: u32 = 32;

/// Size of the icon header: width and height as little endian `u16`.
pub const ICON_HEADER_LEN: usize = 4;

/// Raw RGB565 pixel bytes of the largest icon.
pub const MAX_ICON_PIXEL_BYTES: usize = (MAX_ICON_SIDE * MAX_ICON_SIDE * 2) as usize;

/// Largest encoded icon asset.
pub const MAX_ASSET_LEN: usize = ICON_HEADER_LEN + MAX_ICON_PIXEL_BYTES;

// =============================================================================
// Layout (240x240 panel)
// =============================================================================

pub const LCD_W: u32 = 240;
pub const LCD_H: u32 = 240;

/// Left edge of the time for square screens.
pub const X_OFFSET: i32 = 24;
/// Left edge of the time for round screens, pulled in away from the bezel.
pub const X_OFFSET_ROUND: i32 = 40;
/// Baseline of the time row.
pub const Y_OFFSET: i32 = 70;
/// Distance between text baselines.
pub const LINE_HEIGHT: i32 = 25;

// =============================================================================
// Firmware power policy
// =============================================================================

/// Without input, the face drops into ambient mode after this long.
pub const AMBIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Without input, the screen turns off after this long in ambient mode.
pub const SCREEN_OFF_TIMEOUT: Duration = Duration::from_secs(50);

/// How long the BLE link advertises before reporting a failed connection.
pub const ADVERTISE_TIMEOUT: Duration = Duration::from_secs(30);

/// Backlight level while interactive (0–7).
pub const BRIGHTNESS_INTERACTIVE: u8 = 5;

/// Backlight level in ambient mode (0–7).
pub const BRIGHTNESS_AMBIENT: u8 = 1;

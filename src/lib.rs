//! Weather watch face core for the PineTime
//!
//! Everything that decides what the face shows and when lives here and runs on the
//! host as well as on the watch. The firmware binary (`main.rs`) owns the hardware,
//! turns button presses, timers and BLE traffic into [`face::FaceEvent`]s and carries
//! out the [`face::Action`]s the face asks for.
//!
//! Run the tests on the host with `cargo test --lib`.

// Use no_std only when NOT testing (tests need std for the test harness)
#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible in every module
mod fmt;

pub mod asset;
pub mod config;
pub mod face;
pub mod power;
pub mod render_state;
pub mod scheduler;
pub mod sync;
pub mod time_source;
pub mod ui;

pub use face::{Action, Actions, FaceEvent, HostEvent, WatchFace};

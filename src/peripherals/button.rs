//! Side button

use debouncr::{debounce_2, Debouncer, Edge, Repeat2};
use embassy_nrf::{
    gpio::{Input, Output},
    peripherals::{P0_13, P0_15},
};
use embassy_time::{Duration, Timer};

/// Time between two button samples.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Debounced side button, sampled every 10 ms.
pub struct Button<'a> {
    /// Button detection pin (high/low)
    pin: Input<'a, P0_13>,
    /// Button enable pin
    enable: Output<'a, P0_15>,
    debouncer: Debouncer<u8, Repeat2>,
}

impl<'a> Button<'a> {
    pub fn new(pin: Input<'a, P0_13>, enable: Output<'a, P0_15>) -> Self {
        Self {
            pin,
            enable,
            debouncer: debounce_2(false),
        }
    }

    /// Sample the button once. Returns `true` on a debounced press.
    pub async fn sample(&mut self) -> bool {
        self.enable.set_high();
        // The button needs a short time to give stable outputs
        Timer::after(Duration::from_nanos(1)).await;

        let pressed = self.debouncer.update(self.pin.is_high()) == Some(Edge::Rising);

        // Button consumes around 34µA when P0.15 is left high.
        // To reduce current consumption, set it low most of the time.
        self.enable.set_low();
        pressed
    }

    /// Wait for the next sample period, then sample.
    pub async fn poll(&mut self) -> bool {
        Timer::after(POLL_INTERVAL).await;
        self.sample().await
    }
}

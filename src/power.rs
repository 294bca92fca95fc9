//! Screen power policy
//!
//! The watch has no host deciding when the face is dimmed or hidden, so the
//! firmware derives it from button activity: a press wakes the face, a while
//! without input dims it, and a while longer turns the screen off.

use heapless::Vec;

use crate::config::{
    AMBIENT_TIMEOUT, BRIGHTNESS_AMBIENT, BRIGHTNESS_INTERACTIVE, SCREEN_OFF_TIMEOUT,
};
use crate::face::HostEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    Interactive,
    Ambient,
    Off,
}

impl PowerMode {
    /// Backlight level (0–7) for the mode.
    pub const fn brightness(&self) -> u8 {
        match self {
            PowerMode::Interactive => BRIGHTNESS_INTERACTIVE,
            PowerMode::Ambient => BRIGHTNESS_AMBIENT,
            PowerMode::Off => 0,
        }
    }
}

/// A mode switch and the host events announcing it to the face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerChange {
    pub mode: PowerMode,
    pub events: Vec<HostEvent, 2>,
}

pub struct PowerPolicy {
    mode: PowerMode,
    last_input_ms: u64,
}

impl PowerPolicy {
    /// Start interactive, as after boot.
    pub fn new(now_ms: u64) -> Self {
        Self {
            mode: PowerMode::Interactive,
            last_input_ms: now_ms,
        }
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    /// Button pressed.
    pub fn on_input(&mut self, now_ms: u64) -> Option<PowerChange> {
        self.last_input_ms = now_ms;
        let mut events = Vec::new();
        match self.mode {
            PowerMode::Interactive => return None,
            PowerMode::Ambient => {
                let _ = events.push(HostEvent::AmbientModeChanged(false));
            }
            PowerMode::Off => {
                let _ = events.push(HostEvent::AmbientModeChanged(false));
                let _ = events.push(HostEvent::VisibilityChanged(true));
            }
        }
        Some(self.switch(PowerMode::Interactive, events))
    }

    /// Check the idle timeouts.
    pub fn poll(&mut self, now_ms: u64) -> Option<PowerChange> {
        let idle = now_ms.saturating_sub(self.last_input_ms);
        let mut events = Vec::new();
        match self.mode {
            PowerMode::Interactive if idle >= AMBIENT_TIMEOUT.as_millis() => {
                let _ = events.push(HostEvent::AmbientModeChanged(true));
                Some(self.switch(PowerMode::Ambient, events))
            }
            PowerMode::Ambient
                if idle >= AMBIENT_TIMEOUT.as_millis() + SCREEN_OFF_TIMEOUT.as_millis() =>
            {
                let _ = events.push(HostEvent::VisibilityChanged(false));
                Some(self.switch(PowerMode::Off, events))
            }
            _ => None,
        }
    }

    fn switch(&mut self, mode: PowerMode, events: Vec<HostEvent, 2>) -> PowerChange {
        debug!("Power mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        PowerChange { mode, events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMBIENT_MS: u64 = AMBIENT_TIMEOUT.as_millis();
    const OFF_MS: u64 = AMBIENT_MS + SCREEN_OFF_TIMEOUT.as_millis();

    #[test]
    fn test_idle_dims_then_turns_off() {
        let mut policy = PowerPolicy::new(1_000);
        assert_eq!(policy.poll(1_000 + AMBIENT_MS - 1), None);

        let change = policy.poll(1_000 + AMBIENT_MS).unwrap();
        assert_eq!(change.mode, PowerMode::Ambient);
        assert_eq!(
            change.events.as_slice(),
            &[HostEvent::AmbientModeChanged(true)]
        );
        assert_eq!(change.mode.brightness(), BRIGHTNESS_AMBIENT);
        // Reported once
        assert_eq!(policy.poll(1_000 + AMBIENT_MS + 5), None);

        let change = policy.poll(1_000 + OFF_MS).unwrap();
        assert_eq!(change.mode, PowerMode::Off);
        assert_eq!(
            change.events.as_slice(),
            &[HostEvent::VisibilityChanged(false)]
        );
        assert_eq!(policy.poll(1_000 + OFF_MS * 2), None);
    }

    #[test]
    fn test_button_wakes_from_off() {
        let mut policy = PowerPolicy::new(0);
        policy.poll(AMBIENT_MS);
        policy.poll(OFF_MS);
        assert_eq!(policy.mode(), PowerMode::Off);

        let change = policy.on_input(OFF_MS + 10).unwrap();
        assert_eq!(change.mode, PowerMode::Interactive);
        assert_eq!(
            change.events.as_slice(),
            &[
                HostEvent::AmbientModeChanged(false),
                HostEvent::VisibilityChanged(true),
            ]
        );
        assert_eq!(change.mode.brightness(), BRIGHTNESS_INTERACTIVE);
    }

    #[test]
    fn test_button_restarts_idle_timer() {
        let mut policy = PowerPolicy::new(0);
        assert_eq!(policy.on_input(AMBIENT_MS - 1), None);
        assert_eq!(policy.poll(AMBIENT_MS + 10), None);
        assert!(policy.poll(AMBIENT_MS * 2).is_some());

        let change = policy.on_input(AMBIENT_MS * 2 + 1).unwrap();
        assert_eq!(
            change.events.as_slice(),
            &[HostEvent::AmbientModeChanged(false)]
        );
    }
}

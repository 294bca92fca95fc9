//! Redraw cadence
//!
//! The face redraws twice a second while interactive (so the colon can blink) and
//! once a minute while muted. Ticks are aligned to wall clock boundaries, so a
//! frame always lands right after the displayed time changes.

use crate::config::{MUTE_UPDATE_RATE_MS, NORMAL_UPDATE_RATE_MS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerState {
    Stopped,
    Running,
}

/// What the owner of the timer has to do after a mode change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerCommand {
    /// Replace any pending tick with one `delay_ms` from now
    Schedule { delay_ms: u64 },
    /// Drop the pending tick
    Cancel,
}

/// Decides when the next redraw tick is due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateScheduler {
    visible: bool,
    ambient: bool,
    muted: bool,
    state: TimerState,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateScheduler {
    pub const fn new() -> Self {
        Self {
            visible: false,
            ambient: false,
            muted: false,
            state: TimerState::Stopped,
        }
    }

    /// Ticks are only wanted while the face is on screen and not dimmed.
    pub const fn should_run(&self) -> bool {
        self.visible && !self.ambient
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running)
    }

    pub const fn state(&self) -> TimerState {
        self.state
    }

    pub const fn interval_ms(&self) -> u64 {
        if self.muted || self.ambient {
            MUTE_UPDATE_RATE_MS
        } else {
            NORMAL_UPDATE_RATE_MS
        }
    }

    pub fn set_visible(&mut self, visible: bool) -> Option<TimerCommand> {
        self.visible = visible;
        self.update()
    }

    pub fn set_ambient(&mut self, ambient: bool) -> Option<TimerCommand> {
        self.ambient = ambient;
        self.update()
    }

    /// A running timer is re-phased to the new interval.
    pub fn set_muted(&mut self, muted: bool, now_ms: i64) -> Option<TimerCommand> {
        let changed = self.muted != muted;
        self.muted = muted;
        if changed && self.is_running() && self.should_run() {
            return Some(TimerCommand::Schedule {
                delay_ms: self.delay_from(now_ms),
            });
        }
        self.update()
    }

    /// Stop for good, e.g. when the face is destroyed.
    pub fn cancel(&mut self) -> Option<TimerCommand> {
        self.visible = false;
        self.update()
    }

    /// Handle an expired tick.
    ///
    /// Returns the delay until the next tick, or `None` if the tick is stale or
    /// the timer should no longer run. The caller redraws either way unless the
    /// tick was stale.
    pub fn tick(&mut self, now_ms: i64) -> Option<u64> {
        if !self.is_running() {
            debug!("Ignoring stale update tick");
            return None;
        }
        if !self.should_run() {
            self.state = TimerState::Stopped;
            return None;
        }
        Some(self.delay_from(now_ms))
    }

    fn update(&mut self) -> Option<TimerCommand> {
        match (self.should_run(), self.state) {
            (true, TimerState::Stopped) => {
                self.state = TimerState::Running;
                Some(TimerCommand::Schedule { delay_ms: 0 })
            }
            (false, TimerState::Running) => {
                self.state = TimerState::Stopped;
                Some(TimerCommand::Cancel)
            }
            _ => None,
        }
    }

    /// Time left until the next multiple of the interval.
    fn delay_from(&self, now_ms: i64) -> u64 {
        let interval = self.interval_ms() as i64;
        (interval - now_ms.rem_euclid(interval)) as u64
    }
}

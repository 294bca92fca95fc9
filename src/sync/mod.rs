//! Connection to the companion phone
//!
//! [`SyncSession`] only decides; the firmware owns the actual BLE link and carries
//! out the [`LinkCommand`]s the session returns.

use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};
use heapless::Vec;

use crate::ui::Label;

pub mod protocol;
pub mod requester;

use protocol::{
    AssetRef, DataEventBuffer, DataEventKind, HIGH_TEMP_KEY, LOW_TEMP_KEY, WEATHER_IMAGE_KEY,
    WEATHER_PATH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// No companion connected before advertising ended
    Timeout,
    /// The radio stack refused to advertise or connect
    Radio,
    /// Connected, but the peer does not speak the sync protocol
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncConnection {
    Disconnected,
    Connecting,
    Connected,
    Failed(ConnectionError),
}

/// Reports from the link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Connected,
    Suspended,
    Failed(ConnectionError),
    DataChanged(DataEventBuffer),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkCommand {
    Connect,
    Disconnect,
    AddDataListener,
    RemoveDataListener,
    /// Ask every companion to push the current weather
    RequestSync,
}

pub type LinkCommands = Vec<LinkCommand, 3>;

/// Requests for the task owning the radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkControl {
    Connect,
    Disconnect,
}

/// Wait until `wanted` is requested. Requests queue in order, so a disconnect
/// followed by a reconnect is seen as both.
pub async fn wait_for_control<M: RawMutex, const N: usize>(
    controls: &Channel<M, LinkControl, N>,
    wanted: LinkControl,
) {
    loop {
        let control = controls.receive().await;
        if control == wanted {
            return;
        }
        trace!("Skipping link control {:?}", control);
    }
}

/// Weather carried by one data item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeatherUpdate {
    pub high_temp: Option<Label>,
    pub low_temp: Option<Label>,
    /// `None` keeps the current icon
    pub icon: Option<AssetRef>,
}

pub type WeatherUpdates = Vec<WeatherUpdate, { protocol::MAX_EVENTS }>;

/// Lifecycle of the companion connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSession {
    state: SyncConnection,
    listening: bool,
}

impl Default for SyncSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncSession {
    pub const fn new() -> Self {
        Self {
            state: SyncConnection::Disconnected,
            listening: false,
        }
    }

    pub const fn state(&self) -> SyncConnection {
        self.state
    }

    /// Whether incoming data items are processed.
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// The face became visible.
    pub fn on_visible(&mut self) -> LinkCommands {
        let mut commands = LinkCommands::new();
        if self.state == SyncConnection::Disconnected {
            self.state = SyncConnection::Connecting;
            push(&mut commands, LinkCommand::Connect);
        }
        commands
    }

    /// Stop listening, then disconnect. Safe to call in any state.
    pub fn teardown(&mut self) -> LinkCommands {
        let mut commands = LinkCommands::new();
        if self.listening {
            self.listening = false;
            push(&mut commands, LinkCommand::RemoveDataListener);
        }
        if matches!(
            self.state,
            SyncConnection::Connected | SyncConnection::Connecting
        ) {
            push(&mut commands, LinkCommand::Disconnect);
        }
        self.state = SyncConnection::Disconnected;
        commands
    }

    pub fn on_connected(&mut self) -> LinkCommands {
        let mut commands = LinkCommands::new();
        if self.state != SyncConnection::Connecting {
            warn!("Stale connection report in state {:?}", self.state);
            push(&mut commands, LinkCommand::Disconnect);
            return commands;
        }

        info!("Companion connected");
        self.state = SyncConnection::Connected;
        self.listening = true;
        push(&mut commands, LinkCommand::AddDataListener);
        push(&mut commands, LinkCommand::RequestSync);
        commands
    }

    /// The link went away underneath us.
    pub fn on_suspended(&mut self) -> LinkCommands {
        info!("Companion connection suspended");
        let mut commands = LinkCommands::new();
        if self.listening {
            self.listening = false;
            push(&mut commands, LinkCommand::RemoveDataListener);
        }
        self.state = SyncConnection::Disconnected;
        commands
    }

    /// Failures are not retried; only becoming invisible leaves `Failed`.
    pub fn on_failed(&mut self, error: ConnectionError) {
        if self.state == SyncConnection::Connecting {
            warn!("Companion connection failed: {:?}", error);
            self.state = SyncConnection::Failed(error);
        } else {
            debug!("Ignoring connection failure in state {:?}", self.state);
        }
    }

    /// Extract weather from a buffer of data events.
    pub fn weather_updates(&self, events: &DataEventBuffer) -> WeatherUpdates {
        let mut updates = WeatherUpdates::new();
        if !self.listening {
            debug!("Not listening, dropping {} data events", events.len());
            return updates;
        }

        for event in events {
            if event.kind != DataEventKind::Changed {
                debug!("Ignoring data event of kind {:?}", event.kind);
                continue;
            }
            if event.path.as_str() != WEATHER_PATH {
                debug!("Ignoring data item at {}", event.path.as_str());
                continue;
            }

            let update = WeatherUpdate {
                high_temp: event.data.get_string(HIGH_TEMP_KEY).copied(),
                low_temp: event.data.get_string(LOW_TEMP_KEY).copied(),
                icon: event.data.get_asset(WEATHER_IMAGE_KEY).cloned(),
            };
            if update.icon.is_none() {
                debug!("Weather item without icon");
            }
            if updates.push(update).is_err() {
                error!("Dropping weather update, {} already pending", updates.len());
            }
        }
        updates
    }
}

fn push(commands: &mut LinkCommands, command: LinkCommand) {
    if commands.push(command).is_err() {
        error!("Dropping link command {:?}", command);
    }
}

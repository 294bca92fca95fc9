//! The watch face
//!
//! [`WatchFace`] reacts to everything the firmware reports (lifecycle changes from
//! the host, companion traffic, timer ticks, finished icon downloads) and answers
//! with [`Action`]s. It never touches hardware itself, so the whole behavior can be
//! driven from tests.

use chrono::FixedOffset;
use embedded_graphics::primitives::Rectangle;

use crate::render_state::{DisplayGeometry, RenderState, WeatherIcon};
use crate::scheduler::{TimerCommand, UpdateScheduler};
use crate::sync::protocol::AssetRef;
use crate::sync::{LinkCommand, LinkCommands, SyncEvent, SyncSession};
use crate::time_source::{Environment, Locale, TimeSource};
use crate::ui::{self, DrawList, RenderMode};

/// Lifecycle and environment reports from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Created,
    Destroyed,
    VisibilityChanged(bool),
    AmbientModeChanged(bool),
    /// `true` while notifications are muted
    InterruptionFilterChanged(bool),
    ShapeApplied {
        round: bool,
    },
    /// Area covered by a peek card, if any
    PeekCardChanged(Option<Rectangle>),
    /// Once a minute
    TimeTick,
    LocaleChanged(Locale),
    TimeZoneChanged(FixedOffset),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FaceEvent {
    Host(HostEvent),
    Sync(SyncEvent),
    /// The redraw timer expired
    TimerTick,
    IconFetched(WeatherIcon),
}

/// Work the firmware carries out on behalf of the face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Draw a new frame
    Redraw,
    /// Replace the pending timer tick with one `delay_ms` from now
    ScheduleTick { delay_ms: u64 },
    CancelTick,
    Link(LinkCommand),
    FetchIcon(AssetRef),
}

pub const MAX_ACTIONS: usize = 8;

pub type Actions = heapless::Vec<Action, MAX_ACTIONS>;

pub struct WatchFace {
    scheduler: UpdateScheduler,
    session: SyncSession,
    state: RenderState,
    time: TimeSource,
    /// Latest locale and timezone reported by the host
    environment: Environment,
    /// Environment changes are only picked up while registered
    receiver_registered: bool,
    visible: bool,
    ambient: bool,
    muted: bool,
    peek_card: Option<Rectangle>,
}

impl Default for WatchFace {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}

impl WatchFace {
    pub fn new(environment: Environment) -> Self {
        Self {
            scheduler: UpdateScheduler::new(),
            session: SyncSession::new(),
            state: RenderState::new(),
            time: TimeSource::new(environment),
            environment,
            receiver_registered: false,
            visible: false,
            ambient: false,
            muted: false,
            peek_card: None,
        }
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn render_state(&self) -> &RenderState {
        &self.state
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        self.state.geometry()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mode(&self) -> RenderMode {
        RenderMode {
            ambient: self.ambient,
            muted: self.muted,
            peek_card: self
                .peek_card
                .map_or(false, |card| card.size.width > 0 && card.size.height > 0),
        }
    }

    /// Draw callback: the frame for `now_ms`.
    pub fn draw(&self, now_ms: i64) -> DrawList<'_> {
        ui::render(
            now_ms,
            &self.time,
            self.state.geometry(),
            self.state.weather(),
            self.mode(),
        )
    }

    pub fn handle(&mut self, event: FaceEvent, now_ms: i64) -> Actions {
        let mut actions = Actions::new();
        match event {
            FaceEvent::Host(event) => self.on_host(event, now_ms, &mut actions),
            FaceEvent::Sync(event) => self.on_sync(event, &mut actions),
            FaceEvent::TimerTick => {
                // A stale tick after the timer stopped draws nothing
                if let Some(delay_ms) = self.scheduler.tick(now_ms) {
                    push(&mut actions, Action::Redraw);
                    push(&mut actions, Action::ScheduleTick { delay_ms });
                }
            }
            FaceEvent::IconFetched(icon) => {
                self.state.weather_mut().replace_icon(icon);
                push(&mut actions, Action::Redraw);
            }
        }
        actions
    }

    fn on_host(&mut self, event: HostEvent, now_ms: i64, actions: &mut Actions) {
        match event {
            HostEvent::Created => {
                debug!("Watch face created");
                self.state.reset();
                self.peek_card = None;
            }
            HostEvent::Destroyed => {
                debug!("Watch face destroyed");
                self.visible = false;
                timer(actions, self.scheduler.cancel());
                link(actions, self.session.teardown());
                self.receiver_registered = false;
            }
            HostEvent::VisibilityChanged(true) => {
                self.visible = true;
                link(actions, self.session.on_visible());
                self.register_receiver();
                timer(actions, self.scheduler.set_visible(true));
                push(actions, Action::Redraw);
            }
            HostEvent::VisibilityChanged(false) => {
                self.visible = false;
                link(actions, self.session.teardown());
                self.receiver_registered = false;
                timer(actions, self.scheduler.set_visible(false));
            }
            HostEvent::AmbientModeChanged(ambient) => {
                self.ambient = ambient;
                timer(actions, self.scheduler.set_ambient(ambient));
                push(actions, Action::Redraw);
            }
            HostEvent::InterruptionFilterChanged(muted) => {
                if self.muted != muted {
                    self.muted = muted;
                    timer(actions, self.scheduler.set_muted(muted, now_ms));
                    push(actions, Action::Redraw);
                }
            }
            HostEvent::ShapeApplied { round } => {
                self.state.apply_shape(round);
                push(actions, Action::Redraw);
            }
            HostEvent::PeekCardChanged(card) => {
                self.peek_card = card;
                push(actions, Action::Redraw);
            }
            HostEvent::TimeTick => push(actions, Action::Redraw),
            HostEvent::LocaleChanged(locale) => {
                self.environment.locale = locale;
                self.environment_changed(actions);
            }
            HostEvent::TimeZoneChanged(utc_offset) => {
                self.environment.utc_offset = utc_offset;
                self.environment_changed(actions);
            }
        }
    }

    fn on_sync(&mut self, event: SyncEvent, actions: &mut Actions) {
        match event {
            SyncEvent::Connected => link(actions, self.session.on_connected()),
            SyncEvent::Suspended => link(actions, self.session.on_suspended()),
            SyncEvent::Failed(error) => self.session.on_failed(error),
            SyncEvent::DataChanged(events) => {
                let updates = self.session.weather_updates(&events);
                if updates.is_empty() {
                    return;
                }
                for update in updates {
                    info!(
                        "Weather update: high {:?}, low {:?}",
                        update.high_temp, update.low_temp
                    );
                    self.state
                        .weather_mut()
                        .set_temperatures(update.high_temp, update.low_temp);
                    if let Some(icon) = update.icon {
                        push(actions, Action::FetchIcon(icon));
                    }
                }
                push(actions, Action::Redraw);
            }
        }
    }

    /// Register for locale and timezone changes, picking up what changed meanwhile.
    fn register_receiver(&mut self) {
        self.receiver_registered = true;
        self.time = TimeSource::new(self.environment);
    }

    fn environment_changed(&mut self, actions: &mut Actions) {
        if !self.receiver_registered {
            debug!("Deferring environment change until visible");
            return;
        }
        self.time = TimeSource::new(self.environment);
        push(actions, Action::Redraw);
    }
}

fn push(actions: &mut Actions, action: Action) {
    if actions.push(action).is_err() {
        error!("Too many actions, dropping one");
    }
}

fn timer(actions: &mut Actions, command: Option<TimerCommand>) {
    match command {
        Some(TimerCommand::Schedule { delay_ms }) => {
            push(actions, Action::ScheduleTick { delay_ms })
        }
        Some(TimerCommand::Cancel) => push(actions, Action::CancelTick),
        None => {}
    }
}

fn link(actions: &mut Actions, commands: LinkCommands) {
    for command in commands {
        push(actions, Action::Link(command));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetError, AssetFetcher, AssetSource};
    use crate::config::MUTE_UPDATE_RATE_MS;
    use crate::sync::protocol::{decode_events, tests::weather_frame};
    use crate::sync::SyncConnection;
    use crate::ui::{DrawCommand, TextRole};
    use embassy_futures::block_on;
    use embedded_graphics::prelude::*;

    /// 2024-03-03 (a Sunday) 12:00:00.250 UTC
    const NOON: i64 = 1_709_467_200_250;

    fn host(event: HostEvent) -> FaceEvent {
        FaceEvent::Host(event)
    }

    fn data(high: &str, low: &str, icon: Option<&[u8]>) -> FaceEvent {
        let events = decode_events(&weather_frame(high, low, icon)).unwrap();
        FaceEvent::Sync(SyncEvent::DataChanged(events))
    }

    fn icon() -> WeatherIcon {
        WeatherIcon::decode(&[1, 0, 1, 0, 0xff, 0xff]).unwrap()
    }

    /// Created, shaped and on screen.
    fn visible_face() -> WatchFace {
        let mut face = WatchFace::default();
        face.handle(host(HostEvent::Created), NOON);
        face.handle(host(HostEvent::ShapeApplied { round: false }), NOON);
        face.handle(host(HostEvent::VisibilityChanged(true)), NOON);
        face
    }

    fn connected_face() -> WatchFace {
        let mut face = visible_face();
        face.handle(FaceEvent::Sync(SyncEvent::Connected), NOON);
        face
    }

    fn texts(frame: &DrawList<'_>) -> Vec<(std::string::String, TextRole)> {
        frame
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Text { text, role, .. } => Some((text.as_str().into(), *role)),
                _ => None,
            })
            .collect()
    }

    fn has_text(frame: &DrawList<'_>, wanted: &str) -> bool {
        texts(frame).iter().any(|(text, _)| text == wanted)
    }

    fn has_role(frame: &DrawList<'_>, wanted: TextRole) -> bool {
        texts(frame).iter().any(|(_, role)| *role == wanted)
    }

    fn has_icon(frame: &DrawList<'_>) -> bool {
        frame
            .iter()
            .any(|command| matches!(command, DrawCommand::Bitmap { .. }))
    }

    #[test]
    fn test_becoming_visible() {
        let mut face = WatchFace::default();
        face.handle(host(HostEvent::Created), NOON);
        let actions = face.handle(host(HostEvent::VisibilityChanged(true)), NOON);

        assert_eq!(
            actions.as_slice(),
            &[
                Action::Link(LinkCommand::Connect),
                Action::ScheduleTick { delay_ms: 0 },
                Action::Redraw,
            ]
        );
        assert!(face.is_visible());
        assert!(face.scheduler().is_running());
        assert_eq!(face.session().state(), SyncConnection::Connecting);
    }

    #[test]
    fn test_interactive_noon() {
        let mut face = visible_face();
        let actions = face.handle(FaceEvent::TimerTick, NOON);
        assert_eq!(
            actions.as_slice(),
            &[Action::Redraw, Action::ScheduleTick { delay_ms: 250 }]
        );

        let frame = face.draw(NOON);
        assert!(has_role(&frame, TextRole::Colon));
        assert!(texts(&frame).contains(&("00".into(), TextRole::Second)));
        assert!(!has_role(&frame, TextRole::AmPm));
    }

    #[test]
    fn test_ambient_mode() {
        let mut face = visible_face();
        let actions = face.handle(host(HostEvent::AmbientModeChanged(true)), NOON);
        assert_eq!(actions.as_slice(), &[Action::CancelTick, Action::Redraw]);
        assert!(!face.scheduler().is_running());
        assert_eq!(face.scheduler().interval_ms(), MUTE_UPDATE_RATE_MS);

        // Colon stays on in the blink-off half of the second
        let frame = face.draw(NOON + 500);
        assert!(has_role(&frame, TextRole::Colon));
        assert!(has_text(&frame, "PM"));
        assert!(!has_role(&frame, TextRole::Second));
        drop(frame);

        // The minute tick from the host keeps the dimmed face current
        assert_eq!(
            face.handle(host(HostEvent::TimeTick), NOON).as_slice(),
            &[Action::Redraw]
        );
    }

    #[test]
    fn test_weather_then_icon() {
        let mut face = connected_face();
        let actions = face.handle(data("72°", "58°", Some(b"icon-1")), NOON);
        assert_eq!(
            actions.as_slice(),
            &[
                Action::FetchIcon(AssetRef::new(b"icon-1").unwrap()),
                Action::Redraw,
            ]
        );

        // Temperatures are in before the icon arrives
        let frame = face.draw(NOON);
        assert!(has_text(&frame, "72° 58°"));
        assert!(!has_icon(&frame));
        drop(frame);

        let actions = face.handle(FaceEvent::IconFetched(icon()), NOON);
        assert_eq!(actions.as_slice(), &[Action::Redraw]);
        let frame = face.draw(NOON);
        assert!(has_text(&frame, "72° 58°"));
        assert!(has_icon(&frame));
    }

    /// Source whose reads never finish.
    struct StalledSource;

    impl AssetSource for StalledSource {
        async fn connect(&mut self) -> Result<(), AssetError> {
            Ok(())
        }

        async fn read_asset(&mut self, _: &AssetRef, _: &mut [u8]) -> Result<usize, AssetError> {
            core::future::pending().await
        }

        async fn disconnect(&mut self) {}
    }

    #[test]
    fn test_fetch_timeout_keeps_temperatures() {
        let mut face = connected_face();
        let actions = face.handle(data("72°", "58°", Some(b"icon-1")), NOON);
        let Some(Action::FetchIcon(asset)) = actions.first() else {
            panic!("expected a fetch, got {:?}", actions);
        };

        let mut fetcher = AssetFetcher::new(StalledSource)
            .with_read_timeout(embassy_time::Duration::from_millis(20));
        assert!(block_on(fetcher.fetch(Some(asset))).is_none());

        let frame = face.draw(NOON);
        assert!(has_text(&frame, "72° 58°"));
        assert!(!has_icon(&frame));
        assert!(face.render_state().weather().icon().is_none());
    }

    #[test]
    fn test_icon_arriving_after_invisible() {
        let mut face = connected_face();
        face.handle(data("72°", "58°", Some(b"icon-1")), NOON);

        let actions = face.handle(host(HostEvent::VisibilityChanged(false)), NOON);
        assert_eq!(
            actions.as_slice(),
            &[
                Action::Link(LinkCommand::RemoveDataListener),
                Action::Link(LinkCommand::Disconnect),
                Action::CancelTick,
            ]
        );

        // The late completion only touches the weather
        let actions = face.handle(FaceEvent::IconFetched(icon()), NOON);
        assert_eq!(actions.as_slice(), &[Action::Redraw]);
        assert!(face.render_state().weather().icon().is_some());
        assert_eq!(face.session().state(), SyncConnection::Disconnected);
        assert!(!face.session().is_listening());
    }

    #[test]
    fn test_item_without_icon_keeps_old_icon() {
        let mut face = connected_face();
        face.handle(FaceEvent::IconFetched(icon()), NOON);
        let actions = face.handle(data("70°", "50°", None), NOON);

        assert_eq!(actions.as_slice(), &[Action::Redraw]);
        assert!(has_icon(&face.draw(NOON)));
        assert!(has_text(&face.draw(NOON), "70° 50°"));
    }

    #[test]
    fn test_data_before_connection_is_ignored() {
        let mut face = visible_face();
        assert!(face.handle(data("72°", "58°", None), NOON).is_empty());
        assert!(face.render_state().weather().high_temp().is_none());
    }

    #[test]
    fn test_connected_requests_sync() {
        let mut face = visible_face();
        let actions = face.handle(FaceEvent::Sync(SyncEvent::Connected), NOON);
        assert_eq!(
            actions.as_slice(),
            &[
                Action::Link(LinkCommand::AddDataListener),
                Action::Link(LinkCommand::RequestSync),
            ]
        );
    }

    #[test]
    fn test_stale_timer_tick() {
        let mut face = visible_face();
        face.handle(host(HostEvent::VisibilityChanged(false)), NOON);
        assert!(face.handle(FaceEvent::TimerTick, NOON).is_empty());
    }

    #[test]
    fn test_mute_rephases_timer() {
        let mut face = visible_face();
        let actions = face.handle(host(HostEvent::InterruptionFilterChanged(true)), NOON);
        assert_eq!(
            actions.as_slice(),
            &[Action::ScheduleTick { delay_ms: 59_750 }, Action::Redraw]
        );
        assert!(face.mode().muted);
        assert!(!has_role(&face.draw(NOON), TextRole::Second));

        // Repeating the same filter changes nothing
        assert!(face
            .handle(host(HostEvent::InterruptionFilterChanged(true)), NOON)
            .is_empty());
    }

    #[test]
    fn test_environment_changes_wait_for_visibility() {
        let mut face = WatchFace::default();
        face.handle(host(HostEvent::Created), NOON);

        let actions = face.handle(host(HostEvent::LocaleChanged(Locale::DE_DE)), NOON);
        assert!(actions.is_empty());
        assert!(has_text(&face.draw(NOON), "Sunday"));

        face.handle(host(HostEvent::VisibilityChanged(true)), NOON);
        assert!(has_text(&face.draw(NOON), "Sonntag"));

        let plus_one = FixedOffset::east_opt(3_600).unwrap();
        let actions = face.handle(host(HostEvent::TimeZoneChanged(plus_one)), NOON);
        assert_eq!(actions.as_slice(), &[Action::Redraw]);
        let frame = face.draw(NOON);
        assert!(texts(&frame).contains(&("1".into(), TextRole::Hour)));
    }

    #[test]
    fn test_peek_card() {
        let mut face = visible_face();
        face.handle(host(HostEvent::PeekCardChanged(Some(Rectangle::new(
            Point::new(0, 150),
            Size::new(240, 90),
        )))), NOON);
        assert!(!has_role(&face.draw(NOON), TextRole::Date));

        // An empty card covers nothing
        face.handle(host(HostEvent::PeekCardChanged(Some(Rectangle::new(
            Point::new(0, 240),
            Size::zero(),
        )))), NOON);
        assert!(has_role(&face.draw(NOON), TextRole::Date));

        face.handle(host(HostEvent::PeekCardChanged(None)), NOON);
        assert!(has_role(&face.draw(NOON), TextRole::Date));
    }

    #[test]
    fn test_round_shape() {
        let mut face = visible_face();
        face.handle(host(HostEvent::ShapeApplied { round: true }), NOON);
        assert!(face.geometry().is_round);

        // Created starts over with the square default
        face.handle(host(HostEvent::Created), NOON);
        assert!(!face.geometry().is_round);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut face = connected_face();
        let actions = face.handle(host(HostEvent::Destroyed), NOON);
        assert_eq!(
            actions.as_slice(),
            &[
                Action::CancelTick,
                Action::Link(LinkCommand::RemoveDataListener),
                Action::Link(LinkCommand::Disconnect),
            ]
        );
        assert!(face.handle(host(HostEvent::Destroyed), NOON).is_empty());
        assert!(face
            .handle(host(HostEvent::VisibilityChanged(false)), NOON)
            .is_empty());
    }

    #[test]
    fn test_connection_failure_is_not_retried() {
        let mut face = visible_face();
        let failed = FaceEvent::Sync(SyncEvent::Failed(crate::sync::ConnectionError::Timeout));
        assert!(face.handle(failed, NOON).is_empty());

        // Ambient flicker while visible does not reconnect
        face.handle(host(HostEvent::AmbientModeChanged(true)), NOON);
        let actions = face.handle(host(HostEvent::AmbientModeChanged(false)), NOON);
        assert!(!actions.contains(&Action::Link(LinkCommand::Connect)));

        // Going through invisible does
        face.handle(host(HostEvent::VisibilityChanged(false)), NOON);
        let actions = face.handle(host(HostEvent::VisibilityChanged(true)), NOON);
        assert!(actions.contains(&Action::Link(LinkCommand::Connect)));
    }
}

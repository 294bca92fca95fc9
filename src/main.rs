#![no_std]
#![no_main]

mod peripherals;
mod system;

// Panic handler and debugging
use defmt::unwrap;

use defmt_rtt as _;
use panic_probe as _;

// Device
use core::future::pending;

use embassy_executor::Spawner;
use embassy_futures::select::{select4, Either4};
use embassy_nrf::{
    bind_interrupts,
    gpio::{Input, Level, Output, OutputDrive, Pull},
    interrupt::{self, InterruptExt, Priority},
    peripherals::SPI2,
    spim,
};
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, channel::Channel, signal::Signal};
use embassy_time::{Duration, Instant, Timer};
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    SPIM2_SPIS2_SPI2 => spim::InterruptHandler<SPI2>;
});

// Crate
use peripherals::{backlight::Backlight, button::Button, display::Display};
use pinetime_weatherface::{
    asset::AssetFetcher,
    config::BRIGHTNESS_INTERACTIVE,
    power::{PowerMode, PowerPolicy},
    render_state::WeatherIcon,
    sync::{protocol::AssetRef, requester::SyncRequester, LinkCommand, LinkControl},
    time_source::{Environment, WallClock},
    Action, FaceEvent, HostEvent, WatchFace,
};
use system::{
    bluetooth::{self, BleAssetSource, BleLink, Server, SyncEvents},
    config::SystemConfig,
};

// Communication channels
static HOST_EVENTS: Channel<ThreadModeRawMutex, HostEvent, 8> = Channel::new();
static SYNC_EVENTS: SyncEvents = Channel::new();
static ICON_FETCHED: Signal<ThreadModeRawMutex, WeatherIcon> = Signal::new();
static FETCH_REQUESTS: Channel<ThreadModeRawMutex, AssetRef, 2> = Channel::new();
static SYNC_REQUESTS: Signal<ThreadModeRawMutex, ()> = Signal::new();

/// Runs the face: every event goes through here, one at a time.
#[embassy_executor::task(pool_size = 1)]
async fn render_loop(mut display: Display<SPI2>, clock: WallClock) {
    let mut face = WatchFace::new(Environment::default());
    let mut deadline: Option<Instant> = None;

    loop {
        let next_tick = deadline;
        let tick = async move {
            match next_tick {
                Some(at) => Timer::at(at).await,
                None => pending().await,
            }
        };

        let event = match select4(
            HOST_EVENTS.receive(),
            SYNC_EVENTS.receive(),
            ICON_FETCHED.wait(),
            tick,
        )
        .await
        {
            Either4::First(event) => FaceEvent::Host(event),
            Either4::Second(event) => FaceEvent::Sync(event),
            Either4::Third(icon) => FaceEvent::IconFetched(icon),
            Either4::Fourth(()) => {
                deadline = None;
                FaceEvent::TimerTick
            }
        };

        let now_ms = clock.now_millis();
        let was_visible = face.is_visible();
        let actions = face.handle(event, now_ms);

        // Leave no stale frame behind for the next wake-up
        if was_visible && !face.is_visible() {
            if let Err(e) = display.clear(face.geometry().palette.background) {
                defmt::warn!("Failed to clear display: {:?}", e);
            }
        }

        for action in actions {
            match action {
                Action::Redraw => {
                    if !face.is_visible() {
                        continue;
                    }
                    if let Err(e) = display.draw(&face.draw(now_ms), face.geometry()) {
                        defmt::warn!("Failed to draw frame: {:?}", e);
                    }
                }
                Action::ScheduleTick { delay_ms } => {
                    deadline = Some(Instant::now() + Duration::from_millis(delay_ms));
                }
                Action::CancelTick => deadline = None,
                Action::Link(command) => execute_link(command),
                Action::FetchIcon(asset) => {
                    if FETCH_REQUESTS.try_send(asset).is_err() {
                        defmt::warn!("Icon fetch queue full, dropping request");
                    }
                }
            }
        }
    }
}

fn execute_link(command: LinkCommand) {
    match command {
        LinkCommand::Connect => bluetooth::control(LinkControl::Connect),
        LinkCommand::Disconnect => bluetooth::control(LinkControl::Disconnect),
        LinkCommand::AddDataListener => bluetooth::set_listening(true),
        LinkCommand::RemoveDataListener => bluetooth::set_listening(false),
        LinkCommand::RequestSync => SYNC_REQUESTS.signal(()),
    }
}

/// Wake on button presses, dim and turn off the screen when idle.
#[embassy_executor::task(pool_size = 1)]
async fn power(mut button: Button<'static>, mut backlight: Backlight<'static>) {
    let mut policy = PowerPolicy::new(Instant::now().as_millis());
    loop {
        let pressed = button.poll().await;
        let now_ms = Instant::now().as_millis();
        let change = if pressed {
            policy.on_input(now_ms)
        } else {
            policy.poll(now_ms)
        };

        if let Some(change) = change {
            match change.mode {
                PowerMode::Off => backlight.off(),
                mode => {
                    if let Err(e) = backlight.set(mode.brightness()) {
                        defmt::warn!("Failed to set backlight: {:?}", e);
                    }
                }
            }
            for event in change.events {
                HOST_EVENTS.send(event).await;
            }
        }
    }
}

/// One time tick per wall clock minute.
#[embassy_executor::task(pool_size = 1)]
async fn time_tick(clock: WallClock) {
    loop {
        let now = clock.now_millis();
        let wait = 60_000 - now.rem_euclid(60_000);
        Timer::after_millis(wait as u64).await;
        HOST_EVENTS.send(HostEvent::TimeTick).await;
    }
}

#[embassy_executor::task(pool_size = 1)]
async fn softdevice(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task(pool_size = 1)]
async fn companion_link(sd: &'static Softdevice, server: &'static Server) {
    bluetooth::run(sd, server, &SYNC_EVENTS).await
}

#[embassy_executor::task(pool_size = 1)]
async fn asset_worker(mut fetcher: AssetFetcher<BleAssetSource>) {
    fetcher
        .serve(FETCH_REQUESTS.receiver(), &ICON_FETCHED)
        .await
}

#[embassy_executor::task(pool_size = 1)]
async fn sync_requester(mut requester: SyncRequester<BleLink>) {
    requester.serve(&SYNC_REQUESTS).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_nrf::init(SystemConfig::nrf());
    defmt::info!("Initializing");

    // The SoftDevice owns priorities 0, 1 and 4
    interrupt::SPIM2_SPIS2_SPI2.set_priority(Priority::P3);

    // Initialize Backlight
    let backlight = unwrap!(Backlight::init(
        Output::new(p.P0_14, Level::High, OutputDrive::Standard),
        Output::new(p.P0_22, Level::High, OutputDrive::Standard),
        Output::new(p.P0_23, Level::High, OutputDrive::Standard),
        BRIGHTNESS_INTERACTIVE,
    ));

    // Initialize Button
    let button = Button::new(
        Input::new(p.P0_13, Pull::None),
        Output::new(p.P0_15, Level::Low, OutputDrive::Standard),
    );

    // Initialize SPI
    let mut spim_config = spim::Config::default();
    // Use SPI at 8MHz (the fastest clock available on the nRF52832),
    // otherwise refreshing will be super slow.
    spim_config.frequency = spim::Frequency::M8;
    // SPI must be used in mode 3. Mode 0 (the default) won't work.
    spim_config.mode = spim::MODE_3;

    let spim = spim::Spim::new(p.SPI2, Irqs, p.P0_02, p.P0_04, p.P0_03, spim_config);

    // Initialize LCD
    let display = unwrap!(Display::init(
        spim,
        Output::new(p.P0_25, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_18, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_26, Level::Low, OutputDrive::Standard),
    ));

    // Initialize Bluetooth
    let sd = Softdevice::enable(&SystemConfig::softdevice());
    static SERVER: StaticCell<Server> = StaticCell::new();
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));
    let sd: &'static Softdevice = sd;

    let clock = WallClock::from_build_time();

    defmt::info!("Initialization finished");

    // Bring the face up like a host would
    for event in [
        HostEvent::Created,
        HostEvent::ShapeApplied { round: false },
        HostEvent::VisibilityChanged(true),
    ] {
        HOST_EVENTS.send(event).await;
    }

    // Schedule tasks
    unwrap!(spawner.spawn(softdevice(sd)));
    unwrap!(spawner.spawn(companion_link(sd, server)));
    unwrap!(spawner.spawn(asset_worker(AssetFetcher::new(BleAssetSource::new(server)))));
    unwrap!(spawner.spawn(sync_requester(SyncRequester::new(BleLink::new(server)))));
    unwrap!(spawner.spawn(power(button, backlight)));
    unwrap!(spawner.spawn(time_tick(clock)));
    unwrap!(spawner.spawn(render_loop(display, clock)));
}

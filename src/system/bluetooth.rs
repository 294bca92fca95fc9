//! Bluetooth link to the companion phone
//!
//! The watch is a GATT peripheral exposing one weather sync service:
//!
//! - `data` (write): the phone writes encoded data event buffers
//! - `request` (notify): the watch sends messages, `[path_len][path][payload]`
//! - `asset_request` (notify): the watch asks for an asset by reference
//! - `asset_chunk` (write): the phone streams the asset as `[status][bytes...]`

use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, Ordering},
};

use embassy_futures::select::{select, Either};
use embassy_sync::{
    blocking_mutex::{raw::ThreadModeRawMutex, Mutex},
    channel::Channel,
};
use heapless::Vec;
use nrf_softdevice::{
    ble::{
        advertisement_builder::{
            Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList,
        },
        gatt_server::{self, NotifyValueError},
        peripheral::{self, AdvertiseError},
        Connection,
    },
    Softdevice,
};

use pinetime_weatherface::{
    asset::{AssetError, AssetSource, ChunkReader},
    config::ADVERTISE_TIMEOUT,
    sync::{
        protocol::{decode_events, AssetRef, MAX_ASSET_REF_LEN},
        requester::{CompanionLink, LinkError, NodeList},
        wait_for_control, ConnectionError, LinkControl, SyncEvent,
    },
};

use super::config::ATT_MTU;

/// Largest characteristic write
const PAYLOAD_LEN: usize = ATT_MTU as usize - 3;
/// Largest message notified on `request`
const MESSAGE_LEN: usize = 64;

type Payload = Vec<u8, PAYLOAD_LEN>;
type Message = Vec<u8, MESSAGE_LEN>;
type AssetRequest = Vec<u8, MAX_ASSET_REF_LEN>;

/// Events reported to the render loop
pub type SyncEvents = Channel<ThreadModeRawMutex, SyncEvent, 2>;

/// Weather sync service UUID, little endian
const WEATHER_SERVICE_UUID: [u8; 16] = [
    0x10, 0x7a, 0x5e, 0x1c, 0x6d, 0x2b, 0x8e, 0x8a, 0x0e, 0x4f, 0x3c, 0x7f, 0x01, 0x00, 0x4b, 0x9a,
];

pub static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .full_name("PineTime")
    .build();

pub static SCAN_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .services_128(ServiceList::Complete, &[WEATHER_SERVICE_UUID])
    .build();

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub weather: WeatherSyncService,
}

#[nrf_softdevice::gatt_service(uuid = "9a4b0001-7f3c-4f0e-8a8e-2b6d1c5e7a10")]
pub struct WeatherSyncService {
    #[characteristic(uuid = "9a4b0002-7f3c-4f0e-8a8e-2b6d1c5e7a10", write)]
    pub data: Payload,
    #[characteristic(uuid = "9a4b0003-7f3c-4f0e-8a8e-2b6d1c5e7a10", notify)]
    pub request: Message,
    #[characteristic(uuid = "9a4b0004-7f3c-4f0e-8a8e-2b6d1c5e7a10", notify)]
    pub asset_request: AssetRequest,
    #[characteristic(uuid = "9a4b0005-7f3c-4f0e-8a8e-2b6d1c5e7a10", write)]
    pub asset_chunk: Payload,
}

static BLE_CONTROL: Channel<ThreadModeRawMutex, LinkControl, 4> = Channel::new();
static LISTENING: AtomicBool = AtomicBool::new(false);
static CONNECTION: Mutex<ThreadModeRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));
static ASSET_CHUNKS: Channel<ThreadModeRawMutex, Payload, 4> = Channel::new();

/// Ask the link task to connect or disconnect.
pub fn control(control: LinkControl) {
    if BLE_CONTROL.try_send(control).is_err() {
        defmt::warn!("Link control queue full, dropping {:?}", control);
    }
}

/// Forward incoming data buffers only while set.
pub fn set_listening(listening: bool) {
    LISTENING.store(listening, Ordering::Relaxed);
}

fn connection() -> Option<Connection> {
    CONNECTION.lock(|conn| conn.borrow().clone())
}

/// Advertise when asked to connect, serve the connection until either side ends it.
pub async fn run(sd: &'static Softdevice, server: &'static Server, events: &'static SyncEvents) -> ! {
    loop {
        wait_for_control(&BLE_CONTROL, LinkControl::Connect).await;

        let config = peripheral::Config {
            // In units of 10 ms
            timeout: Some((ADVERTISE_TIMEOUT.as_millis() / 10) as u16),
            ..Default::default()
        };
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };

        defmt::info!("Advertising");
        let advertise = peripheral::advertise_connectable(sd, adv, &config);
        let conn = match select(advertise, wait_for_control(&BLE_CONTROL, LinkControl::Disconnect)).await {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(AdvertiseError::Timeout)) => {
                events.send(SyncEvent::Failed(ConnectionError::Timeout)).await;
                continue;
            }
            Either::First(Err(e)) => {
                defmt::warn!("Advertising failed: {:?}", e);
                events.send(SyncEvent::Failed(ConnectionError::Radio)).await;
                continue;
            }
            Either::Second(()) => {
                defmt::info!("Advertising cancelled");
                continue;
            }
        };

        defmt::info!("Connection established");
        CONNECTION.lock(|current| current.replace(Some(conn.clone())));
        events.send(SyncEvent::Connected).await;

        let serve = gatt_server::run(&conn, server, |event| on_gatt_event(event, events));
        match select(serve, wait_for_control(&BLE_CONTROL, LinkControl::Disconnect)).await {
            Either::First(_) => {
                defmt::info!("Companion disconnected");
                CONNECTION.lock(|current| current.replace(None));
                events.send(SyncEvent::Suspended).await;
            }
            Either::Second(()) => {
                CONNECTION.lock(|current| current.replace(None));
                // Already gone if this fails
                let _ = conn.disconnect();
            }
        }
    }
}

fn on_gatt_event(event: ServerEvent, events: &SyncEvents) {
    let ServerEvent::Weather(event) = event;
    match event {
        WeatherSyncServiceEvent::DataWrite(data) => {
            if !LISTENING.load(Ordering::Relaxed) {
                defmt::debug!("No data listener, dropping {} bytes", data.len());
                return;
            }
            match decode_events(&data) {
                Ok(buffer) => {
                    if events.try_send(SyncEvent::DataChanged(buffer)).is_err() {
                        defmt::warn!("Sync event queue full, dropping data");
                    }
                }
                Err(e) => defmt::warn!("Malformed data buffer: {:?}", e),
            }
        }
        WeatherSyncServiceEvent::AssetChunkWrite(chunk) => {
            if ASSET_CHUNKS.try_send(chunk).is_err() {
                defmt::warn!("Asset chunk queue full, dropping chunk");
            }
        }
        WeatherSyncServiceEvent::RequestCccdWrite { notifications } => {
            defmt::debug!("Request notifications: {}", notifications);
        }
        WeatherSyncServiceEvent::AssetRequestCccdWrite { notifications } => {
            defmt::debug!("Asset request notifications: {}", notifications);
        }
    }
}

fn link_error(error: NotifyValueError) -> LinkError {
    match error {
        NotifyValueError::Disconnected => LinkError::Disconnected,
        NotifyValueError::Raw(_) => LinkError::Busy,
    }
}

/// Sends messages to the connected phone.
pub struct BleLink {
    server: &'static Server,
}

impl BleLink {
    pub fn new(server: &'static Server) -> Self {
        Self { server }
    }
}

impl CompanionLink for BleLink {
    async fn connected_nodes(&mut self) -> Result<NodeList, LinkError> {
        let mut nodes = NodeList::new();
        if let Some(handle) = connection().and_then(|conn| conn.handle()) {
            nodes.push(handle).map_err(|_| LinkError::TooLarge)?;
        }
        Ok(nodes)
    }

    async fn send_message(&mut self, node: u16, path: &str, payload: &[u8]) -> Result<(), LinkError> {
        let conn = connection()
            .filter(|conn| conn.handle() == Some(node))
            .ok_or(LinkError::Disconnected)?;

        let mut message = Message::new();
        message
            .push(path.len() as u8)
            .map_err(|_| LinkError::TooLarge)?;
        message
            .extend_from_slice(path.as_bytes())
            .map_err(|_| LinkError::TooLarge)?;
        message
            .extend_from_slice(payload)
            .map_err(|_| LinkError::TooLarge)?;

        self.server
            .weather
            .request_notify(&conn, &message)
            .map_err(link_error)
    }
}

/// Pulls assets from the connected phone chunk by chunk.
pub struct BleAssetSource {
    server: &'static Server,
}

impl BleAssetSource {
    pub fn new(server: &'static Server) -> Self {
        Self { server }
    }
}

impl AssetSource for BleAssetSource {
    async fn connect(&mut self) -> Result<(), AssetError> {
        connection().map(|_| ()).ok_or(AssetError::NotConnected)
    }

    async fn read_asset(&mut self, asset: &AssetRef, buf: &mut [u8]) -> Result<usize, AssetError> {
        let conn = connection().ok_or(AssetError::NotConnected)?;

        // Drop chunks of an abandoned transfer
        while ASSET_CHUNKS.try_receive().is_ok() {}

        let request = AssetRequest::from_slice(asset.as_bytes()).map_err(|_| AssetError::TooLarge)?;
        self.server
            .weather
            .asset_request_notify(&conn, &request)
            .map_err(|_| AssetError::NotConnected)?;

        let mut reader = ChunkReader::new(buf);
        loop {
            let chunk = ASSET_CHUNKS.receive().await;
            if let Some(len) = reader.push(&chunk)? {
                return Ok(len);
            }
        }
    }

    async fn disconnect(&mut self) {
        while ASSET_CHUNKS.try_receive().is_ok() {}
    }
}

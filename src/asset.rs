//! Weather icon fetching
//!
//! Icons arrive as asset references inside a data item. The bytes themselves are
//! pulled from the companion by a separate worker so the render loop never waits
//! on the radio.

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::Receiver,
    signal::Signal,
};
use embassy_time::{with_timeout, Duration};

use crate::config::{ASSET_CONNECT_TIMEOUT, ASSET_READ_TIMEOUT, MAX_ASSET_LEN};
use crate::render_state::WeatherIcon;
use crate::sync::protocol::AssetRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssetError {
    /// Companion is not connected
    NotConnected,
    /// Companion does not know the asset
    NotFound,
    /// Asset is larger than the receive buffer
    TooLarge,
    /// Transfer aborted midway
    Interrupted,
}

/// Where asset bytes come from.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    /// Make sure the data channel is usable.
    async fn connect(&mut self) -> Result<(), AssetError>;

    /// Read the whole asset into `buf`, returning its length.
    async fn read_asset(&mut self, asset: &AssetRef, buf: &mut [u8]) -> Result<usize, AssetError>;

    async fn disconnect(&mut self);
}

/// Chunk status byte: more chunks follow
pub const CHUNK_MORE: u8 = 0;
/// Chunk status byte: last chunk of the asset
pub const CHUNK_LAST: u8 = 1;
/// Chunk status byte: the companion has no such asset
pub const CHUNK_NOT_FOUND: u8 = 2;

/// Reassembles an asset streamed as `[status][bytes...]` chunks.
pub struct ChunkReader<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Append one chunk. Returns the asset length once the last chunk is in.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<usize>, AssetError> {
        let (status, bytes) = chunk.split_first().ok_or(AssetError::Interrupted)?;
        if *status == CHUNK_NOT_FOUND {
            return Err(AssetError::NotFound);
        }

        let end = self.len + bytes.len();
        self.buf
            .get_mut(self.len..end)
            .ok_or(AssetError::TooLarge)?
            .copy_from_slice(bytes);
        self.len = end;

        match *status {
            CHUNK_MORE => Ok(None),
            CHUNK_LAST => Ok(Some(self.len)),
            _ => Err(AssetError::Interrupted),
        }
    }
}

/// Resolves asset references into decoded icons.
pub struct AssetFetcher<S> {
    source: S,
    read_timeout: Duration,
    buf: [u8; MAX_ASSET_LEN],
}

impl<S: AssetSource> AssetFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            read_timeout: ASSET_READ_TIMEOUT,
            buf: [0; MAX_ASSET_LEN],
        }
    }

    /// Override how long a single asset read may take.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Fetch and decode one icon. Every failure is logged and yields `None`.
    pub async fn fetch(&mut self, asset: Option<&AssetRef>) -> Option<WeatherIcon> {
        let Some(asset) = asset else {
            error!("Asset must be non-null");
            return None;
        };

        match with_timeout(ASSET_CONNECT_TIMEOUT, self.source.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Asset channel unavailable: {:?}", e);
                return None;
            }
            Err(_) => {
                warn!("Timed out connecting asset channel");
                return None;
            }
        }

        let read = with_timeout(
            self.read_timeout,
            self.source.read_asset(asset, &mut self.buf),
        )
        .await;
        self.source.disconnect().await;

        let len = match read {
            Ok(Ok(len)) => len,
            Ok(Err(e)) => {
                warn!("Failed to read asset: {:?}", e);
                return None;
            }
            Err(_) => {
                warn!("Timed out reading asset");
                return None;
            }
        };

        let data = self.buf.get(..len)?;
        match WeatherIcon::decode(data) {
            Ok(icon) => {
                debug!("Fetched {}x{} icon", icon.width(), icon.height());
                Some(icon)
            }
            Err(e) => {
                warn!("Asset is not an icon: {:?}", e);
                None
            }
        }
    }

    /// Fetch every requested asset and hand completed icons to the render loop.
    ///
    /// `completions` holds one icon, so a newer completion replaces one the render
    /// loop has not picked up yet.
    pub async fn serve<M: RawMutex, const N: usize>(
        &mut self,
        requests: Receiver<'_, M, AssetRef, N>,
        completions: &Signal<M, WeatherIcon>,
    ) -> ! {
        loop {
            let asset = requests.receive().await;
            if let Some(icon) = self.fetch(Some(&asset)).await {
                completions.signal(icon);
            }
        }
    }
}

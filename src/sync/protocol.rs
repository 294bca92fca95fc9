//! Companion data protocol
//!
//! The phone pushes data items as compact, length prefixed frames:
//!
//! ```text
//! buffer   := count:u8 event{count}
//! event    := kind:u8 path:str entries:u8 entry{entries}
//! entry    := key:str tag:u8 value
//! value    := 0 text:str | 1 asset:bytes
//! str      := len:u8 utf8[len]
//! bytes    := len:u8 u8[len]
//! ```

use heapless::{String, Vec};

use crate::ui::{Label, MAX_TEXT_LEN};

/// Data item path carrying the weather.
pub const WEATHER_PATH: &str = "/weather_wearable_path";
pub const HIGH_TEMP_KEY: &str = "high_temp_key";
pub const LOW_TEMP_KEY: &str = "low_temp_key";
pub const WEATHER_IMAGE_KEY: &str = "weather_image_key";

/// Message path asking the companion to push the current weather.
pub const REQUEST_SYNC_PATH: &str = "/request_sync_path";

pub(crate) const KIND_CHANGED: u8 = 1;
const KIND_DELETED: u8 = 2;
const TAG_TEXT: u8 = 0;
const TAG_ASSET: u8 = 1;

pub const MAX_ASSET_REF_LEN: usize = 20;
pub const MAX_KEY_LEN: usize = 24;
pub const MAX_PATH_LEN: usize = 32;
pub const MAX_ENTRIES: usize = 4;
pub const MAX_EVENTS: usize = 2;

/// Opaque handle of a binary asset held by the companion.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssetRef(Vec<u8, MAX_ASSET_REF_LEN>);

impl AssetRef {
    pub fn new(id: &[u8]) -> Result<Self, DecodeError> {
        Vec::from_slice(id)
            .map(Self)
            .map_err(|_| DecodeError::Overflow)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataValue {
    Text(Label),
    Asset(AssetRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataEntry {
    pub key: String<MAX_KEY_LEN>,
    pub value: DataValue,
}

/// Key/value content of a data item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataMap {
    entries: Vec<DataEntry, MAX_ENTRIES>,
}

impl DataMap {
    /// Text stored under `key`, if any.
    pub fn get_string(&self, key: &str) -> Option<&Label> {
        match self.get(key) {
            Some(DataValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Asset reference stored under `key`, if any.
    pub fn get_asset(&self, key: &str) -> Option<&AssetRef> {
        match self.get(key) {
            Some(DataValue::Asset(asset)) => Some(asset),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, key: &str) -> Option<&DataValue> {
        self.entries
            .iter()
            .find(|entry| entry.key.as_str() == key)
            .map(|entry| &entry.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataEventKind {
    Changed,
    Deleted,
    Unknown(u8),
}

impl From<u8> for DataEventKind {
    fn from(value: u8) -> Self {
        match value {
            KIND_CHANGED => Self::Changed,
            KIND_DELETED => Self::Deleted,
            other => Self::Unknown(other),
        }
    }
}

/// One changed or deleted data item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataEvent {
    pub kind: DataEventKind,
    pub path: String<MAX_PATH_LEN>,
    pub data: DataMap,
}

pub type DataEventBuffer = Vec<DataEvent, MAX_EVENTS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Frame ends in the middle of a field
    Truncated,
    /// Text is not UTF-8
    InvalidUtf8,
    /// Value tag is neither text nor asset
    UnknownTag(u8),
    /// Field or count exceeds its capacity
    Overflow,
}

/// Decode a buffer of data events as written by the companion.
pub fn decode_events(data: &[u8]) -> Result<DataEventBuffer, DecodeError> {
    let mut reader = Reader::new(data);
    let mut events = DataEventBuffer::new();

    for _ in 0..reader.u8()? {
        let kind = DataEventKind::from(reader.u8()?);
        let path = reader.string()?;
        let mut map = DataMap::default();
        for _ in 0..reader.u8()? {
            let key = reader.string()?;
            let value = match reader.u8()? {
                TAG_TEXT => DataValue::Text(text_value(reader.str()?)?),
                TAG_ASSET => DataValue::Asset(AssetRef::new(reader.bytes()?)?),
                tag => return Err(DecodeError::UnknownTag(tag)),
            };
            map.entries
                .push(DataEntry { key, value })
                .map_err(|_| DecodeError::Overflow)?;
        }
        events
            .push(DataEvent {
                kind,
                path,
                data: map,
            })
            .map_err(|_| DecodeError::Overflow)?;
    }

    Ok(events)
}

fn text_value(text: &str) -> Result<Label, DecodeError> {
    if text.len() > MAX_TEXT_LEN {
        return Err(DecodeError::Overflow);
    }
    Label::new(text).map_err(|_| DecodeError::Overflow)
}

/// Cursor over a received frame.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        let (first, rest) = self.data.split_first().ok_or(DecodeError::Truncated)?;
        self.data = rest;
        Ok(*first)
    }

    fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u8()? as usize;
        if self.data.len() < len {
            return Err(DecodeError::Truncated);
        }
        let (field, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(field)
    }

    fn str(&mut self) -> Result<&'a str, DecodeError> {
        core::str::from_utf8(self.bytes()?).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn string<const N: usize>(&mut self) -> Result<String<N>, DecodeError> {
        let mut string = String::new();
        string
            .push_str(self.str()?)
            .map_err(|_| DecodeError::Overflow)?;
        Ok(string)
    }
}

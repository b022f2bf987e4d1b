//! Zero-copy message views over pooled buffers.
//!
//! A [`Message`] is a `(buffer handle, offset)` pair: the frame header and
//! payload are decoded in place, and several messages may share one buffer
//! when a single read returned frames back-to-back. The buffer returns to
//! its pool when the last referring message drops.

use serde::de::DeserializeOwned;

use crate::buffer::BufferRef;
use crate::codec::Dialect;
use crate::error::{Error, Result};

/// Message kinds routed by the core.
///
/// The numeric values are the on-wire discriminants of the tagged dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Kind {
    /// Also the disconnect signal: routing a `None` tears the transport down.
    None = 0,
    GamePacket = 1,
    FieldInfo = 2,
    StartCommand = 3,
    MatchConfiguration = 4,
    PlayerInput = 5,
    DesiredGameState = 6,
    RenderGroup = 7,
    RemoveRenderGroup = 8,
    MatchComm = 9,
    BallPrediction = 10,
    ConnectionSettings = 11,
    StopCommand = 12,
    SetLoadout = 13,
    InitComplete = 14,
    ControllableTeamInfo = 15,
    RenderingStatus = 16,
    /// Anything this revision does not route.
    Unknown = u16::MAX,
}

impl Kind {
    #[must_use]
    pub const fn from_wire(raw: u16) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::GamePacket,
            2 => Self::FieldInfo,
            3 => Self::StartCommand,
            4 => Self::MatchConfiguration,
            5 => Self::PlayerInput,
            6 => Self::DesiredGameState,
            7 => Self::RenderGroup,
            8 => Self::RemoveRenderGroup,
            9 => Self::MatchComm,
            10 => Self::BallPrediction,
            11 => Self::ConnectionSettings,
            12 => Self::StopCommand,
            13 => Self::SetLoadout,
            14 => Self::InitComplete,
            15 => Self::ControllableTeamInfo,
            16 => Self::RenderingStatus,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn to_wire(self) -> u16 {
        self as u16
    }
}

/// A framed message viewed in place inside a pooled buffer.
#[derive(Clone, Default)]
pub struct Message {
    buffer: Option<BufferRef>,
    offset: usize,
    dialect: Dialect,
}

impl Message {
    /// View the frame starting at `offset` inside `buffer`.
    #[must_use]
    pub fn new(buffer: BufferRef, offset: usize, dialect: Dialect) -> Self {
        Self {
            buffer: Some(buffer),
            offset,
            dialect,
        }
    }

    /// Whether this message points into a buffer and its declared extent
    /// fits inside it.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(buffer) = &self.buffer else {
            return false;
        };
        let capacity = buffer.capacity();
        if self.offset + self.dialect.header_len() > capacity {
            return false;
        }
        self.offset + self.size_with_header() <= capacity
    }

    /// Message kind from the tagged header. The self-describing dialect
    /// carries its discriminant inside the payload and reports `Unknown`.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self.dialect {
            Dialect::Tagged => {
                let header = self.header();
                Kind::from_wire(u16::from_be_bytes([header[0], header[1]]))
            }
            Dialect::SelfDescribing => Kind::Unknown,
        }
    }

    /// Payload length in bytes, excluding the header.
    #[must_use]
    pub fn len(&self) -> usize {
        let header = self.header();
        let at = self.dialect.header_len() - 2;
        usize::from(u16::from_be_bytes([header[at], header[at + 1]]))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame length including the header.
    #[must_use]
    pub fn size_with_header(&self) -> usize {
        self.dialect.header_len() + self.len()
    }

    /// The whole wire frame, header included.
    #[must_use]
    pub fn span(&self) -> &[u8] {
        let buffer = self.buffer.as_ref().expect("valid message");
        &buffer.as_slice()[self.offset..self.offset + self.size_with_header()]
    }

    /// The raw payload bytes.
    #[must_use]
    pub fn payload_bytes(&self) -> &[u8] {
        &self.span()[self.dialect.header_len()..]
    }

    /// Decode and validate the payload as `T`.
    ///
    /// Rejection is a [`Error::DecodeValidation`]; the caller logs and drops
    /// the message, and the stream continues.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        if !self.is_valid() {
            return Err(Error::validation(
                std::any::type_name::<T>(),
                "message does not point into a buffer",
            ));
        }
        rmp_serde::from_slice(self.payload_bytes())
            .map_err(|e| Error::validation(std::any::type_name::<T>(), e.to_string()))
    }

    /// The underlying buffer handle, if any.
    #[must_use]
    pub fn buffer(&self) -> Option<&BufferRef> {
        self.buffer.as_ref()
    }

    /// Invalidate this message, releasing its buffer reference.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.offset = 0;
    }

    fn header(&self) -> &[u8] {
        let buffer = self.buffer.as_ref().expect("valid message");
        &buffer.as_slice()[self.offset..self.offset + self.dialect.header_len()]
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.buffer.is_none() {
            return f.write_str("Message(invalid)");
        }
        f.debug_struct("Message")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::pool::BufferPools;

    #[test]
    fn kind_round_trips_through_wire_values() {
        for raw in 0..=16u16 {
            let kind = Kind::from_wire(raw);
            assert_ne!(kind, Kind::Unknown);
            assert_eq!(kind.to_wire(), raw);
        }
        assert_eq!(Kind::from_wire(999), Kind::Unknown);
    }

    #[test]
    fn header_fields_decode_in_place() {
        let pools = BufferPools::new();
        let msg = codec::encode(&pools, Dialect::Tagged, Kind::MatchComm, b"hello").unwrap();
        assert!(msg.is_valid());
        assert_eq!(msg.kind(), Kind::MatchComm);
        assert_eq!(msg.len(), 5);
        assert_eq!(msg.size_with_header(), 9);
        assert_eq!(msg.payload_bytes(), b"hello");
    }

    #[test]
    fn default_message_is_invalid() {
        let msg = Message::default();
        assert!(!msg.is_valid());
        assert!(msg.buffer().is_none());
    }

    #[test]
    fn take_leaves_an_invalid_message_behind() {
        let pools = BufferPools::new();
        let mut slot = codec::encode(&pools, Dialect::Tagged, Kind::GamePacket, b"x").unwrap();
        let taken = std::mem::take(&mut slot);
        assert!(taken.is_valid());
        assert!(!slot.is_valid());
    }

    #[test]
    fn payload_validation_rejects_garbage() {
        #[derive(Debug, serde::Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            value: u32,
        }

        let pools = BufferPools::new();
        let msg = codec::encode(&pools, Dialect::Tagged, Kind::GamePacket, b"\xff\xff\xff").unwrap();
        let err = msg.payload::<Strict>().unwrap_err();
        assert!(err.is_recoverable());
    }
}

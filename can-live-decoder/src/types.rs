//! Core types for the CAN live decoder library
//!
//! This module defines the values that flow through the pipeline: raw frames
//! coming off the bus, the closed set of known frame identifiers and
//! indicators, and the decoded responses delivered to the consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Mask selecting the 29-bit identifier of an extended CAN frame
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Raw CAN frame as handed over by the transport
///
/// Immutable once received; consumed by the decode step.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Receive timestamp in nanoseconds since epoch
    pub timestamp_ns: u64,
    /// CAN identifier (11-bit or 29-bit, flag bits may still be set)
    pub can_id: u32,
    /// Frame payload (0-8 bytes for classic CAN)
    pub data: Vec<u8>,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
}

impl RawFrame {
    /// Create a frame stamped with the current time
    pub fn new(can_id: u32, data: impl Into<Vec<u8>>) -> Self {
        let timestamp_ns = Utc::now()
            .timestamp_nanos_opt()
            .map(|ns| ns.max(0) as u64)
            .unwrap_or_default();
        Self {
            timestamp_ns,
            can_id,
            data: data.into(),
            is_extended: can_id > 0x7FF,
        }
    }

    /// Builder method: override the receive timestamp
    pub fn with_timestamp_ns(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Convert timestamp from nanoseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = (self.timestamp_ns / 1_000_000_000) as i64;
        let nsecs = (self.timestamp_ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_else(Utc::now)
    }

    /// Identifier with the EFF/RTR/ERR flag bits stripped
    pub fn masked_id(&self) -> u32 {
        self.can_id & CAN_EFF_MASK
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Known frame identifiers of the vehicle protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameId {
    /// Vehicle speed
    CarSpeed,
    /// Engine RPM
    EngineSpeed,
    /// Fuel level
    FuelLevel,
    /// Engine coolant temperature
    EngineTemperature,
    /// Multiplexed frame: secondary speed plus indicator bitfield
    Other,
}

impl FrameId {
    /// All known identifiers, in wire order
    pub const ALL: [FrameId; 5] = [
        FrameId::CarSpeed,
        FrameId::EngineSpeed,
        FrameId::FuelLevel,
        FrameId::EngineTemperature,
        FrameId::Other,
    ];

    /// Wire value of this identifier on the bus
    pub const fn wire_id(self) -> u32 {
        match self {
            FrameId::CarSpeed => 0x101,
            FrameId::EngineSpeed => 0x102,
            FrameId::FuelLevel => 0x103,
            FrameId::EngineTemperature => 0x104,
            FrameId::Other => 0x105,
        }
    }

    /// Resolve a raw identifier; flag bits above the 29-bit id are ignored
    pub fn from_wire(can_id: u32) -> Option<FrameId> {
        let id = can_id & CAN_EFF_MASK;
        Self::ALL.into_iter().find(|f| f.wire_id() == id)
    }

    /// Lower-case hexadecimal form, e.g. "105"
    pub fn to_hex(self) -> String {
        format!("{:x}", self.wire_id())
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::CarSpeed => write!(f, "CAR_SPEED"),
            FrameId::EngineSpeed => write!(f, "ENGINE_SPEED"),
            FrameId::FuelLevel => write!(f, "FUEL_LEVEL"),
            FrameId::EngineTemperature => write!(f, "ENGINE_TEMPERATURE"),
            FrameId::Other => write!(f, "OTHER"),
        }
    }
}

impl FromStr for FrameId {
    type Err = DecoderError;

    /// Parse the hexadecimal wire form ("105", "0x105", case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw = u32::from_str_radix(digits, 16)
            .map_err(|_| DecoderError::InvalidData(format!("not a hex identifier: {:?}", s)))?;
        FrameId::from_wire(raw).ok_or(DecoderError::UnsupportedFrame(raw))
    }
}

/// Boolean indicators packed into the low 24 bits of the OTHER frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorId {
    Gate,
    Plates,
    ParkingBrake,
    LowFuel,
    CheckEngine,
    OilPressure,
    BatteryCharge,
    SeatBelt,
}

/// Width of the indicator bitfield in bits
pub const INDICATOR_FIELD_BITS: u8 = 24;

impl IndicatorId {
    /// The closed set of indicators
    pub const ALL: [IndicatorId; 8] = [
        IndicatorId::Gate,
        IndicatorId::Plates,
        IndicatorId::ParkingBrake,
        IndicatorId::LowFuel,
        IndicatorId::CheckEngine,
        IndicatorId::OilPressure,
        IndicatorId::BatteryCharge,
        IndicatorId::SeatBelt,
    ];

    /// 0-based bit position inside the 24-bit indicator field
    pub const fn bit_position(self) -> u8 {
        match self {
            IndicatorId::Gate => 0,
            IndicatorId::Plates => 1,
            IndicatorId::ParkingBrake => 2,
            IndicatorId::LowFuel => 3,
            IndicatorId::CheckEngine => 8,
            IndicatorId::OilPressure => 9,
            IndicatorId::BatteryCharge => 16,
            IndicatorId::SeatBelt => 23,
        }
    }
}

// Every indicator must live inside the 24-bit field.
const _: () = {
    let mut i = 0;
    while i < IndicatorId::ALL.len() {
        assert!(IndicatorId::ALL[i].bit_position() < INDICATOR_FIELD_BITS);
        i += 1;
    }
};

impl fmt::Display for IndicatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorId::Gate => "gate",
            IndicatorId::Plates => "plates",
            IndicatorId::ParkingBrake => "parking_brake",
            IndicatorId::LowFuel => "low_fuel",
            IndicatorId::CheckEngine => "check_engine",
            IndicatorId::OilPressure => "oil_pressure",
            IndicatorId::BatteryCharge => "battery_charge",
            IndicatorId::SeatBelt => "seat_belt",
        };
        write!(f, "{}", name)
    }
}

/// Indicator states keyed by indicator
pub type Indicators = BTreeMap<IndicatorId, bool>;

/// Result code accompanying every delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultCode {
    Success,
    Error,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "OK"),
            ResultCode::Error => write!(f, "ERROR"),
        }
    }
}

/// The unit delivered downstream
///
/// Either a decoded value for a known frame or a pure error signal; the
/// constructors never produce both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedResponse {
    timestamp: Timestamp,
    frame_id: Option<FrameId>,
    value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    indicators: Option<Indicators>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DecodedResponse {
    /// Successful decode of a known frame
    pub fn decoded(
        timestamp: Timestamp,
        frame_id: FrameId,
        value: i64,
        indicators: Option<Indicators>,
    ) -> Self {
        Self {
            timestamp,
            frame_id: Some(frame_id),
            value: Some(value),
            indicators,
            error: None,
        }
    }

    /// Error signal, optionally tied to the frame that caused it
    pub fn failure(frame_id: Option<FrameId>, message: impl Into<String>) -> Self {
        Self::failure_at(Utc::now(), frame_id, message)
    }

    /// Error signal stamped with the time of the frame it concerns
    pub fn failure_at(
        timestamp: Timestamp,
        frame_id: Option<FrameId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            frame_id,
            value: None,
            indicators: None,
            error: Some(message.into()),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn frame_id(&self) -> Option<FrameId> {
        self.frame_id
    }

    /// Primary decoded value (absent on error responses)
    pub fn value(&self) -> Option<i64> {
        self.value
    }

    /// Indicator states (OTHER frame only)
    pub fn indicators(&self) -> Option<&Indicators> {
        self.indicators.as_ref()
    }

    /// State of a single indicator, if this response carries indicators
    pub fn indicator(&self, id: IndicatorId) -> Option<bool> {
        self.indicators.as_ref().and_then(|m| m.get(&id).copied())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Errors raised by the bus transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Receive timed out")]
    Timeout,

    #[error("Transport closed")]
    Closed,

    #[error("Bus error frame: 0x{0:X}")]
    ErrorFrame(u32),

    #[error("Transport is not open")]
    NotOpen,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Errors that can occur during decoding and listening
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Unsupported frame: CAN ID 0x{0:X}")]
    UnsupportedFrame(u32),

    #[error("Malformed payload for {frame_id}: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        frame_id: FrameId,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Listener already started")]
    AlreadyStarted,

    #[error("Stop already requested before start")]
    StopPending,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_wire_lookup() {
        assert_eq!(FrameId::from_wire(0x101), Some(FrameId::CarSpeed));
        assert_eq!(FrameId::from_wire(0x105), Some(FrameId::Other));
        assert_eq!(FrameId::from_wire(0x106), None);
        // EFF flag bit is ignored
        assert_eq!(FrameId::from_wire(0x8000_0102), Some(FrameId::EngineSpeed));
    }

    #[test]
    fn test_frame_id_hex_forms() {
        assert_eq!(FrameId::Other.to_hex(), "105");
        assert_eq!("105".parse::<FrameId>().unwrap(), FrameId::Other);
        assert_eq!("0x104".parse::<FrameId>().unwrap(), FrameId::EngineTemperature);
        assert!(matches!(
            "7ff".parse::<FrameId>(),
            Err(DecoderError::UnsupportedFrame(0x7FF))
        ));
        assert!(matches!("zz".parse::<FrameId>(), Err(DecoderError::InvalidData(_))));
    }

    #[test]
    fn test_indicator_positions_unique() {
        let mut seen = std::collections::HashSet::new();
        for id in IndicatorId::ALL {
            assert!(seen.insert(id.bit_position()), "duplicate bit for {}", id);
        }
    }

    #[test]
    fn test_response_constructors() {
        let ok = DecodedResponse::decoded(Utc::now(), FrameId::CarSpeed, 42, None);
        assert_eq!(ok.value(), Some(42));
        assert!(!ok.is_error());
        assert!(ok.indicators().is_none());

        let err = DecodedResponse::failure(None, "link down");
        assert!(err.is_error());
        assert_eq!(err.value(), None);
        assert_eq!(err.frame_id(), None);
        assert_eq!(err.error(), Some("link down"));

        let recorded = RawFrame::new(0x101, vec![0x64]).with_timestamp_ns(1_500_000_000);
        let stamped = DecodedResponse::failure_at(recorded.timestamp(), Some(FrameId::CarSpeed), "short");
        assert_eq!(stamped.timestamp(), recorded.timestamp());
        assert_eq!(stamped.frame_id(), Some(FrameId::CarSpeed));
    }

    #[test]
    fn test_raw_frame_timestamp() {
        let frame = RawFrame::new(0x101, vec![0x64, 0x00]).with_timestamp_ns(1_500_000_000);
        assert_eq!(frame.timestamp().timestamp(), 1);
        assert_eq!(frame.timestamp().timestamp_subsec_nanos(), 500_000_000);
        assert_eq!(frame.dlc(), 2);
        assert!(!frame.is_extended);
    }
}

//! Static frame schema table
//!
//! The vehicle protocol is fixed, so each known identifier is bound to a
//! schema descriptor at compile time instead of being loaded from a
//! signal database.

use crate::types::{FrameId, INDICATOR_FIELD_BITS};

/// Byte order for value extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for field interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// Location and interpretation of the primary value in a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueField {
    /// First payload byte of the field
    pub byte_offset: usize,
    /// Field width in bytes (1, 2, 4 or 8)
    pub width: usize,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Optional sub-field extraction applied to the raw field: (shift, mask)
    pub extract: Option<(u8, u64)>,
}

impl ValueField {
    /// Number of payload bytes the field needs
    pub const fn required_bytes(&self) -> usize {
        self.byte_offset + self.width
    }
}

/// Layout of the indicator bitfield inside the raw field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorLayout {
    /// Mask applied to the raw field to isolate the indicator bits
    pub field_mask: u64,
}

/// Schema descriptor for one frame identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchema {
    pub frame_id: FrameId,
    pub wire_id: u32,
    pub value: ValueField,
    pub indicators: Option<IndicatorLayout>,
}

impl FrameSchema {
    /// Number of payload bytes this schema requires
    pub const fn required_bytes(&self) -> usize {
        self.value.required_bytes()
    }
}

/// Two-byte signed little-endian reading (speed, RPM, fuel, temperature)
const I16_LE: ValueField = ValueField {
    byte_offset: 0,
    width: 2,
    byte_order: ByteOrder::LittleEndian,
    value_type: ValueType::Signed,
    extract: None,
};

/// Bits 24-39 of the 64-bit little-endian OTHER payload
const OTHER_SPEED: ValueField = ValueField {
    byte_offset: 0,
    width: 8,
    byte_order: ByteOrder::LittleEndian,
    value_type: ValueType::Unsigned,
    extract: Some((24, 0xFFFF)),
};

const OTHER_INDICATORS: IndicatorLayout = IndicatorLayout {
    field_mask: (1u64 << INDICATOR_FIELD_BITS) - 1,
};

static SCHEMAS: [FrameSchema; 5] = [
    FrameSchema {
        frame_id: FrameId::CarSpeed,
        wire_id: FrameId::CarSpeed.wire_id(),
        value: I16_LE,
        indicators: None,
    },
    FrameSchema {
        frame_id: FrameId::EngineSpeed,
        wire_id: FrameId::EngineSpeed.wire_id(),
        value: I16_LE,
        indicators: None,
    },
    FrameSchema {
        frame_id: FrameId::FuelLevel,
        wire_id: FrameId::FuelLevel.wire_id(),
        value: I16_LE,
        indicators: None,
    },
    FrameSchema {
        frame_id: FrameId::EngineTemperature,
        wire_id: FrameId::EngineTemperature.wire_id(),
        value: I16_LE,
        indicators: None,
    },
    FrameSchema {
        frame_id: FrameId::Other,
        wire_id: FrameId::Other.wire_id(),
        value: OTHER_SPEED,
        indicators: Some(OTHER_INDICATORS),
    },
];

/// The full schema table
pub fn schemas() -> &'static [FrameSchema] {
    &SCHEMAS
}

/// Look up the schema for a raw CAN identifier
pub fn lookup(can_id: u32) -> Option<&'static FrameSchema> {
    let frame_id = FrameId::from_wire(can_id)?;
    schema_for(frame_id)
}

/// Schema bound to a known identifier
pub fn schema_for(frame_id: FrameId) -> Option<&'static FrameSchema> {
    SCHEMAS.iter().find(|s| s.frame_id == frame_id)
}

//! Frame decoding engine
//!
//! Maps a raw frame onto the static schema table and produces a
//! [`DecodedResponse`]. Decoding is pure and stateless; it never touches I/O
//! and can be exercised in isolation.

use crate::schema::{self, ByteOrder, FrameSchema, IndicatorLayout, ValueField, ValueType};
use crate::types::{DecodedResponse, DecoderError, IndicatorId, Indicators, RawFrame, Result};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Outcome of decoding a single frame
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Frame matched a known schema
    Decoded(DecodedResponse),
    /// Identifier is not part of the protocol; must not be forwarded
    Unsupported(u32),
}

impl DecodeOutcome {
    /// Convert into a response, treating unsupported frames as an error
    pub fn into_response(self) -> Result<DecodedResponse> {
        match self {
            DecodeOutcome::Decoded(response) => Ok(response),
            DecodeOutcome::Unsupported(id) => Err(DecoderError::UnsupportedFrame(id)),
        }
    }
}

/// Stateless frame decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw frame
    ///
    /// # Returns
    /// * `Ok(DecodeOutcome::Decoded)` for a known identifier with a valid payload
    /// * `Ok(DecodeOutcome::Unsupported)` for an identifier outside the protocol
    /// * `Err(DecoderError::MalformedPayload)` if the payload is too short
    pub fn decode(&self, frame: &RawFrame) -> Result<DecodeOutcome> {
        let Some(schema) = schema::lookup(frame.can_id) else {
            log::trace!("Unsupported CAN ID: 0x{:X}", frame.masked_id());
            return Ok(DecodeOutcome::Unsupported(frame.masked_id()));
        };

        let (value, indicators) = Self::apply_schema(&frame.data, schema)?;

        log::debug!(
            "Decoded {} (ID 0x{:X}): value={}",
            schema.frame_id,
            schema.wire_id,
            value
        );

        Ok(DecodeOutcome::Decoded(DecodedResponse::decoded(
            frame.timestamp(),
            schema.frame_id,
            value,
            indicators,
        )))
    }

    /// Extract the primary value and optional indicators for a schema
    fn apply_schema(data: &[u8], schema: &FrameSchema) -> Result<(i64, Option<Indicators>)> {
        let required = schema.required_bytes();
        if data.len() < required {
            log::warn!(
                "Frame {} requires {} bytes but only has {} bytes",
                schema.frame_id,
                required,
                data.len()
            );
            return Err(DecoderError::MalformedPayload {
                frame_id: schema.frame_id,
                expected: required,
                actual: data.len(),
            });
        }

        let raw = Self::read_raw(data, &schema.value);
        let value = Self::primary_value(raw, &schema.value);
        let indicators = schema
            .indicators
            .map(|layout| Self::extract_indicators(raw, &layout));

        Ok((value, indicators))
    }

    /// Read the raw field bits, most significant bits first in the result
    fn read_raw(data: &[u8], field: &ValueField) -> u64 {
        let bytes = &data[field.byte_offset..field.required_bytes()];
        match field.byte_order {
            ByteOrder::LittleEndian => LittleEndian::read_uint(bytes, field.width),
            ByteOrder::BigEndian => BigEndian::read_uint(bytes, field.width),
        }
    }

    /// Interpret the raw field as the primary value
    fn primary_value(raw: u64, field: &ValueField) -> i64 {
        if let Some((shift, mask)) = field.extract {
            return ((raw >> shift) & mask) as i64;
        }
        match field.value_type {
            ValueType::Unsigned => raw as i64,
            ValueType::Signed => Self::sign_extend(raw, field.width * 8),
        }
    }

    /// Map each indicator to its bit inside the masked field
    fn extract_indicators(raw: u64, layout: &IndicatorLayout) -> Indicators {
        let field = raw & layout.field_mask;
        IndicatorId::ALL
            .into_iter()
            .map(|id| (id, is_bit_set(field, id.bit_position())))
            .collect()
    }

    /// Sign-extend a value from N bits to 64 bits
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}

/// Test a single bit of a bitfield
///
/// Bits at or beyond 64 are reported as clear.
pub fn is_bit_set(value: u64, bit: u8) -> bool {
    value.checked_shr(bit as u32).map_or(false, |v| (v & 1) != 0)
}

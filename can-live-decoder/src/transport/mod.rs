//! Bus transports
//!
//! The listener only needs a blocking "receive next frame or fail"
//! primitive. Each transport implements [`Transport`] over a concrete
//! source of frames.

use crate::types::{RawFrame, TransportError};

pub mod candump;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use candump::CandumpReplay;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use self::socketcan::SocketCanTransport;

/// Common trait for all frame sources
///
/// A transport is moved onto the listener thread, so it must be `Send`.
pub trait Transport: Send {
    /// Acquire the underlying link; must succeed before the first receive
    fn open(&mut self) -> Result<(), TransportError>;

    /// Block until the next frame arrives or the link fails
    ///
    /// Transports with a read timeout return [`TransportError::Timeout`]
    /// when it elapses. [`TransportError::Closed`] means no further frame
    /// will ever arrive.
    fn receive_frame(&mut self) -> Result<RawFrame, TransportError>;

    /// Transmit a frame; not used by the receive path
    fn send_frame(&mut self, can_id: u32, data: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn receive_frame(&mut self) -> Result<RawFrame, TransportError> {
        (**self).receive_frame()
    }

    fn send_frame(&mut self, can_id: u32, data: &[u8]) -> Result<(), TransportError> {
        (**self).send_frame(can_id, data)
    }
}

/// Classic CAN payload limit
pub const CAN_MAX_DLEN: usize = 8;

/// Reject frames the bus cannot carry
pub(crate) fn validate_outgoing(can_id: u32, data: &[u8]) -> Result<(), TransportError> {
    if data.len() > CAN_MAX_DLEN {
        return Err(TransportError::InvalidFrame(format!(
            "payload of {} bytes exceeds {} bytes",
            data.len(),
            CAN_MAX_DLEN
        )));
    }
    if can_id > crate::types::CAN_EFF_MASK {
        return Err(TransportError::InvalidFrame(format!(
            "identifier 0x{:X} exceeds 29 bits",
            can_id
        )));
    }
    Ok(())
}

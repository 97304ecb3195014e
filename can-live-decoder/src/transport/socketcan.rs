//! Linux SocketCAN transport
//!
//! Reads classic CAN frames from a raw `CAN_RAW` socket bound to an
//! interface such as `can0` or `vcan0`. A read timeout keeps the receive
//! call from blocking forever, which lets the listener notice a stop
//! request even on a silent bus.

use super::{validate_outgoing, Transport};
use crate::types::{RawFrame, TransportError};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Id, Socket, StandardId};
use std::io;
use std::time::Duration;

/// Default receive timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Transport over a SocketCAN interface
pub struct SocketCanTransport {
    interface: String,
    read_timeout: Option<Duration>,
    socket: Option<CanSocket>,
}

impl SocketCanTransport {
    /// Create a transport for `interface`; nothing is opened yet
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            socket: None,
        }
    }

    /// Builder method: receive timeout (None = block indefinitely)
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn socket(&self) -> Result<&CanSocket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::NotOpen)
    }
}

impl Transport for SocketCanTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        log::info!("Opening CAN socket on interface: {}", self.interface);

        let socket = CanSocket::open(&self.interface).map_err(|e| {
            log::error!("Failed to open CAN socket on {}: {}", self.interface, e);
            TransportError::Io(e)
        })?;

        if let Some(timeout) = self.read_timeout {
            socket.set_read_timeout(timeout)?;
        }

        log::info!("CAN socket opened successfully on {}", self.interface);
        self.socket = Some(socket);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<RawFrame, TransportError> {
        let frame = match self.socket()?.read_frame() {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(TransportError::Timeout);
            }
            Err(e) => return Err(TransportError::Io(e)),
        };

        if let CanFrame::Error(_) = frame {
            return Err(TransportError::ErrorFrame(frame.raw_id()));
        }

        let mut raw = RawFrame::new(frame.raw_id(), frame.data().to_vec());
        raw.is_extended = frame.is_extended();
        Ok(raw)
    }

    fn send_frame(&mut self, can_id: u32, data: &[u8]) -> Result<(), TransportError> {
        validate_outgoing(can_id, data)?;

        let id: Id = match StandardId::new(can_id as u16).filter(|_| can_id <= 0x7FF) {
            Some(id) => id.into(),
            None => ExtendedId::new(can_id)
                .ok_or_else(|| TransportError::InvalidFrame(format!("bad identifier 0x{:X}", can_id)))?
                .into(),
        };
        let frame = CanFrame::new(id, data)
            .ok_or_else(|| TransportError::InvalidFrame("payload too long".to_string()))?;

        self.socket()?.write_frame(&frame)?;
        Ok(())
    }
}

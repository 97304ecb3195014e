//! CAN Live Decoder Library
//!
//! A streaming decoder for a small, fixed vehicle CAN protocol. Frames are
//! read continuously from a bus transport, decoded into strongly typed
//! values and delivered to a consumer on another thread.
//!
//! # Architecture
//!
//! - [`schema`]: static table binding each known frame identifier to its payload layout
//! - [`FrameDecoder`]: pure mapping from a raw frame to a [`DecodedResponse`]
//! - [`Listener`]: dedicated thread running the read-decode-dispatch loop
//! - [`ResultChannel`]: ordered, non-blocking delivery to a single consumer
//! - [`transport`]: the [`Transport`] trait plus candump replay and SocketCAN sources
//!
//! The library does NOT:
//! - Transmit frames as part of decoding
//! - Filter or reconfigure the bus
//! - Buffer history for consumers that are not registered
//!
//! # Example Usage
//!
//! ```no_run
//! use can_live_decoder::{CandumpReplay, Listener, ListenerConfig, ResultChannel, ResultCode};
//!
//! let channel = ResultChannel::new();
//! let receiver = channel.subscribe();
//!
//! let transport = CandumpReplay::from_path("drive.log");
//! let mut listener = Listener::new(transport, channel).with_config(ListenerConfig::new());
//! listener.start().unwrap();
//!
//! while let Some(delivery) = receiver.recv() {
//!     match delivery.code {
//!         ResultCode::Success => println!("{:?}", delivery.response),
//!         ResultCode::Error => eprintln!("Error: {:?}", delivery.response.error()),
//!     }
//! }
//! ```

// Public modules
pub mod channel;
pub mod config;
pub mod decoder;
pub mod listener;
pub mod schema;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use channel::{ConsumerHandle, Delivery, DispatchStatus, ResultChannel, ResultConsumer, ResultReceiver};
pub use config::ListenerConfig;
pub use decoder::{is_bit_set, DecodeOutcome, FrameDecoder};
pub use listener::{Listener, ListenerState, ListenerStats, StopHandle};
pub use transport::{CandumpReplay, Transport};
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use transport::SocketCanTransport;
pub use types::{
    DecodedResponse, DecoderError, FrameId, IndicatorId, Indicators, RawFrame, Result,
    ResultCode, Timestamp, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

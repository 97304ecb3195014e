//! Continuous read-decode-dispatch loop
//!
//! [`Listener`] owns a transport until it is started, then moves it onto a
//! dedicated thread that repeatedly:
//! 1. blocks on [`Transport::receive_frame`]
//! 2. decodes the frame with [`FrameDecoder`]
//! 3. dispatches the result (or the failure) through the [`ResultChannel`]
//!
//! Unsupported frames are dropped. Malformed payloads and transport errors
//! are surfaced as error responses and the loop keeps going, since a noisy
//! or flapping bus must not halt monitoring. Only a closed transport or a
//! stop request ends the loop.
//!
//! Stopping is cooperative: the stop flag is checked between receives, so
//! a receive that is blocked inside the transport is only interrupted by the
//! transport's own read timeout (see [`TransportError::Timeout`]).

use crate::channel::{DispatchStatus, ResultChannel};
use crate::config::ListenerConfig;
use crate::decoder::{DecodeOutcome, FrameDecoder};
use crate::transport::Transport;
use crate::types::{DecodedResponse, DecoderError, RawFrame, Result, ResultCode, TransportError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

/// Lifecycle of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListenerState {
    /// Created, transport not yet opened
    Idle,
    /// Loop thread is receiving frames
    Running,
    /// Stop requested, loop has not exited yet
    Stopping,
    /// Loop has exited; cannot be restarted
    Stopped,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Idle,
            1 => ListenerState::Running,
            2 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

/// Counters collected by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub frames_unsupported: u64,
    pub frames_malformed: u64,
    pub transport_errors: u64,
    pub results_delivered: u64,
    pub results_dropped: u64,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_decoded: AtomicU64,
    frames_unsupported: AtomicU64,
    frames_malformed: AtomicU64,
    transport_errors: AtomicU64,
    results_delivered: AtomicU64,
    results_dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_unsupported: self.frames_unsupported.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
    counters: Counters,
}

impl Shared {
    fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            ListenerState::Running as u8,
            ListenerState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Cloneable handle that asks a running listener to stop
///
/// Safe to call from a signal handler thread; it only sets a flag.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("stop_requested", &self.shared.stop_requested())
            .finish()
    }
}

/// Read loop driving a transport into a result channel
pub struct Listener<T: Transport + 'static> {
    config: ListenerConfig,
    transport: Option<T>,
    decoder: FrameDecoder,
    channel: ResultChannel,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<Option<T>>>,
}

impl<T: Transport + 'static> Listener<T> {
    /// Create an idle listener with the default configuration
    pub fn new(transport: T, channel: ResultChannel) -> Self {
        Self {
            config: ListenerConfig::default(),
            transport: Some(transport),
            decoder: FrameDecoder::new(),
            channel,
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                state: AtomicU8::new(ListenerState::Idle as u8),
                counters: Counters::default(),
            }),
            handle: None,
        }
    }

    /// Builder method: replace the configuration (only meaningful before `start`)
    pub fn with_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// The channel results are dispatched to
    pub fn channel(&self) -> &ResultChannel {
        &self.channel
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state()
    }

    /// Snapshot of the loop counters
    pub fn stats(&self) -> ListenerStats {
        self.shared.counters.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The transport, while it is not owned by the loop thread
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Open the transport and start the loop on its own thread
    ///
    /// Fails with [`DecoderError::AlreadyStarted`] unless the listener is
    /// idle, and with [`DecoderError::StopPending`] if a stop was requested
    /// before starting. On any failure the listener stays idle and keeps
    /// its transport.
    pub fn start(&mut self) -> Result<()> {
        if self.state() != ListenerState::Idle {
            return Err(DecoderError::AlreadyStarted);
        }
        if self.shared.stop_requested() {
            return Err(DecoderError::StopPending);
        }
        self.config.validate()?;
        let mut transport = self.transport.take().ok_or(DecoderError::AlreadyStarted)?;

        if let Err(e) = transport.open() {
            log::error!("Failed to open transport: {}", e);
            self.transport = Some(transport);
            return Err(e.into());
        }

        let run = LoopContext {
            decoder: self.decoder,
            channel: self.channel.clone(),
            shared: Arc::clone(&self.shared),
            backoff: self.config.error_backoff(),
        };

        // Transport moves to the thread only once the spawn has succeeded
        let (hand_off, taken) = mpsc::channel::<T>();
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || taken.recv().ok().map(|transport| run.run(transport)));

        match spawned {
            Ok(handle) => {
                self.shared.set_state(ListenerState::Running);
                if let Err(mpsc::SendError(transport)) = hand_off.send(transport) {
                    self.transport = Some(transport);
                }
                log::info!("CAN listener started on thread '{}'", self.config.thread_name);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to spawn CAN listener thread: {}", e);
                self.transport = Some(transport);
                Err(DecoderError::ThreadSpawn(e))
            }
        }
    }

    /// Ask the loop to stop without waiting for it
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// Request a stop and wait for the loop thread to exit
    ///
    /// May block until the transport returns from a pending receive.
    pub fn stop(&mut self) -> ListenerStats {
        self.request_stop();
        self.wait()
    }

    /// Wait for the loop thread to exit on its own (closed transport or stop handle)
    pub fn wait(&mut self) -> ListenerStats {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Some(transport)) => self.transport = Some(transport),
                Ok(None) => {}
                Err(_) => log::error!("CAN listener thread panicked"),
            }
            self.shared.set_state(ListenerState::Stopped);
            log::info!("CAN listener stopped");
        }
        self.stats()
    }

    /// True once the loop thread has exited (or was never started)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl<T: Transport + 'static> Drop for Listener<T> {
    fn drop(&mut self) {
        // Joining could block on the transport, so the thread is only signalled
        if self.handle.is_some() {
            self.shared.request_stop();
        }
    }
}

/// Everything the loop thread owns besides the transport
struct LoopContext {
    decoder: FrameDecoder,
    channel: ResultChannel,
    shared: Arc<Shared>,
    backoff: std::time::Duration,
}

impl LoopContext {
    fn run<T: Transport>(self, mut transport: T) -> T {
        log::info!("CAN receive loop running");

        while !self.shared.stop_requested() {
            match transport.receive_frame() {
                Ok(frame) => {
                    Counters::bump(&self.shared.counters.frames_received);
                    self.handle_frame(frame);
                }
                Err(TransportError::Timeout) => continue,
                Err(TransportError::Closed) => {
                    log::info!("Transport closed, CAN receive loop exiting");
                    break;
                }
                Err(e) => {
                    log::warn!("CAN read error: {}", e);
                    Counters::bump(&self.shared.counters.transport_errors);
                    self.dispatch(ResultCode::Error, DecodedResponse::failure(None, e.to_string()));
                    if !self.backoff.is_zero() && !self.shared.stop_requested() {
                        thread::sleep(self.backoff);
                    }
                }
            }
        }

        self.shared.set_state(ListenerState::Stopped);
        log::info!("CAN receive loop stopped");
        transport
    }

    fn handle_frame(&self, frame: RawFrame) {
        match self.decoder.decode(&frame) {
            Ok(DecodeOutcome::Decoded(response)) => {
                Counters::bump(&self.shared.counters.frames_decoded);
                self.dispatch(ResultCode::Success, response);
            }
            Ok(DecodeOutcome::Unsupported(id)) => {
                log::debug!("Dropping unsupported frame 0x{:X}", id);
                Counters::bump(&self.shared.counters.frames_unsupported);
            }
            Err(e) => {
                Counters::bump(&self.shared.counters.frames_malformed);
                let frame_id = match &e {
                    DecoderError::MalformedPayload { frame_id, .. } => Some(*frame_id),
                    _ => None,
                };
                self.dispatch(
                    ResultCode::Error,
                    DecodedResponse::failure_at(frame.timestamp(), frame_id, e.to_string()),
                );
            }
        }
    }

    fn dispatch(&self, code: ResultCode, response: DecodedResponse) {
        let counters = &self.shared.counters;
        match self.channel.dispatch(code, response) {
            DispatchStatus::Delivered => Counters::bump(&counters.results_delivered),
            _ => Counters::bump(&counters.results_dropped),
        }
    }
}

//! Listener configuration types
//!
//! This module defines the minimal configuration needed by the listener
//! loop and its result channel. Transport selection and output formatting
//! are handled by the application layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the listener loop and result channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Maximum number of undelivered results per consumer (None = unbounded)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Pause after a transport error before the next receive (default: 100ms)
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Name of the listener thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_error_backoff() -> u64 {
    100
}

fn default_thread_name() -> String {
    "can-listener".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            error_backoff_ms: default_error_backoff(),
            thread_name: default_thread_name(),
        }
    }
}

impl ListenerConfig {
    /// Create a new listener configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: bound the per-consumer queue
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Builder method: set the transport error backoff
    pub fn with_error_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.error_backoff_ms = backoff_ms;
        self
    }

    /// Builder method: set the listener thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Check the configuration for values the listener cannot run with
    pub fn validate(&self) -> crate::types::Result<()> {
        if self.queue_capacity == Some(0) {
            return Err(crate::types::DecoderError::Config(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(crate::types::DecoderError::Config(
                "thread_name must not be empty".to_string(),
            ));
        }
        if self.thread_name.contains('\0') {
            return Err(crate::types::DecoderError::Config(
                "thread_name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }
}

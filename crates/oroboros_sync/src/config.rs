//! Queue and core thread configuration.
//!
//! Loaded once at startup, either from defaults, a preset, or a TOML table:
//!
//! ```toml
//! thread_name = "oroboros-core"
//! max_in_flight_batches = 4
//!
//! [queue]
//! initial_capacity = 256
//! recycled_buffers = 4
//! ```

use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

/// Buffer sizing for a command queue.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of a fresh pending buffer, in commands.
    pub initial_capacity: usize,
    /// Emptied buffers kept for reuse after playback.
    pub recycled_buffers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            recycled_buffers: 4,
        }
    }
}

impl QueueConfig {
    /// Sizing for a busy simulation thread: a few thousand commands a frame.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            initial_capacity: 4096,
            recycled_buffers: 8,
        }
    }

    /// Parses and validates a TOML table. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the TOML is malformed or the
    /// values do not validate.
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `recycled_buffers` is zero.
    pub fn validate(&self) -> SyncResult<()> {
        if self.recycled_buffers == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.recycled_buffers must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Settings for the [`CoreThread`](crate::CoreThread).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreThreadConfig {
    /// OS thread name.
    pub thread_name: String,
    /// Submitted batches the core thread may lag behind before `submit`
    /// blocks the producer.
    pub max_in_flight_batches: usize,
    /// Sizing of the core thread's shared queue.
    pub queue: QueueConfig,
}

impl Default for CoreThreadConfig {
    fn default() -> Self {
        Self {
            thread_name: "oroboros-core".to_owned(),
            max_in_flight_batches: 4,
            queue: QueueConfig::default(),
        }
    }
}

impl CoreThreadConfig {
    /// Production preset.
    ///
    /// Two frames in flight keeps latency at most two frames behind the
    /// simulation while absorbing a single slow core frame.
    #[must_use]
    pub fn production() -> Self {
        Self {
            thread_name: "oroboros-core".to_owned(),
            max_in_flight_batches: 2,
            queue: QueueConfig::production(),
        }
    }

    /// Parses and validates a TOML table. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the TOML is malformed or the
    /// values do not validate.
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for an empty thread name, zero
    /// in-flight batches, or an invalid queue section.
    pub fn validate(&self) -> SyncResult<()> {
        if self.thread_name.is_empty() {
            return Err(SyncError::InvalidConfig(
                "thread_name must not be empty".to_owned(),
            ));
        }
        if self.max_in_flight_batches == 0 {
            return Err(SyncError::InvalidConfig(
                "max_in_flight_batches must be at least 1".to_owned(),
            ));
        }
        self.queue.validate()
    }
}

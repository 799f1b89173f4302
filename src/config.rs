//! Engine configuration.
//!
//! [`EngineConfig`] gathers the tunables an embedding server may load from
//! its own configuration source. Every field has a default matching the
//! protocol engine's fixed limits, and missing fields fall back to them when
//! deserializing.

use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::{
    dispatch::DispatchConfig,
    frame::{FRAME_BUFFER_SIZE, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE},
};

/// Default size of each connection's receive buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Default cap on bytes waiting to be written to one peer.
pub const DEFAULT_WRITE_LIMIT: usize = 4 * MAX_MESSAGE_SIZE;

/// Invalid configuration values.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The dispatch queue cannot hold any unit.
    #[error("dispatch queue capacity must be at least 1")]
    ZeroCapacity,
    /// A worker bound was zero.
    #[error("worker bounds must be at least 1")]
    ZeroWorkers,
    /// `min_workers` exceeded `max_workers`.
    #[error("min_workers ({min}) exceeds max_workers ({max})")]
    InvertedWorkerBounds {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Idle workers would retire immediately.
    #[error("idle timeout must be positive")]
    ZeroIdleTimeout,
    /// The receive buffer was empty.
    #[error("read buffer size must be at least 1")]
    ZeroReadBuffer,
    /// The frame buffer cannot hold a header and at least one payload byte.
    #[error("frame buffer size {0} leaves no room for payload after the header")]
    FrameBufferTooSmall(usize),
    /// The outbound queue cannot hold one full frame.
    #[error("write limit {limit} is smaller than the frame buffer ({frame})")]
    WriteLimitTooSmall {
        /// Configured write limit.
        limit: usize,
        /// Configured frame buffer size.
        frame: usize,
    },
}

/// Tunables for one [`WebSocketService`](crate::service::WebSocketService).
///
/// # Default Values
/// - `dispatch`: [`DispatchConfig::default`]
/// - `read_buffer_size`: 8192 bytes
/// - `frame_buffer_size`: 8192 bytes, giving 8188-byte frame payloads
/// - `write_limit`: four maximum-size messages (8 MiB)
///
/// ```
/// use wiresocket::config::EngineConfig;
///
/// let cfg = EngineConfig::default();
/// assert_eq!(cfg.max_frame_payload().get(), 8188);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dispatch queue sizing.
    pub dispatch: DispatchConfig,
    /// Size of the fixed receive buffer each connection reads into.
    pub read_buffer_size: usize,
    /// Outbound frame buffer size; frame payloads are capped at this minus
    /// the header budget.
    pub frame_buffer_size: usize,
    /// Bytes allowed to wait for a slow peer before its sends fail and the
    /// connection is closed.
    pub write_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            frame_buffer_size: FRAME_BUFFER_SIZE,
            write_limit: DEFAULT_WRITE_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Largest payload written into one outbound frame.
    #[must_use]
    pub fn max_frame_payload(&self) -> NonZeroUsize {
        NonZeroUsize::MIN.saturating_add(
            self.frame_buffer_size
                .saturating_sub(FRAME_HEADER_SIZE)
                .saturating_sub(1),
        )
    }

    /// Clamp values to sane bounds.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.dispatch = self.dispatch.normalized();
        self.read_buffer_size = self.read_buffer_size.max(1);
        self.frame_buffer_size = self.frame_buffer_size.max(FRAME_HEADER_SIZE + 1);
        self.write_limit = self.write_limit.max(self.frame_buffer_size);
        self
    }

    /// Reject values [`normalized`](Self::normalized) would have to repair.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate()?;
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ZeroReadBuffer);
        }
        if self.frame_buffer_size <= FRAME_HEADER_SIZE {
            return Err(ConfigError::FrameBufferTooSmall(self.frame_buffer_size));
        }
        if self.write_limit < self.frame_buffer_size {
            return Err(ConfigError::WriteLimitTooSmall {
                limit: self.write_limit,
                frame: self.frame_buffer_size,
            });
        }
        Ok(())
    }
}

/// Deserialize a [`Duration`] given as whole milliseconds.
pub(crate) fn duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_engine_limits() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.dispatch.capacity, 5000);
        assert_eq!(cfg.dispatch.min_workers, 5);
        assert_eq!(cfg.dispatch.max_workers, 500);
        assert_eq!(cfg.dispatch.idle_timeout, Duration::from_secs(10));
        assert_eq!(cfg.read_buffer_size, 8192);
        assert_eq!(cfg.max_frame_payload().get(), 8188);
        assert_eq!(cfg.write_limit, 8 * 1024 * 1024);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "dispatch": { "capacity": 10, "idle_timeout_ms": 250 } }"#,
        )
        .expect("valid config");
        assert_eq!(cfg.dispatch.capacity, 10);
        assert_eq!(cfg.dispatch.idle_timeout, Duration::from_millis(250));
        assert_eq!(cfg.dispatch.max_workers, 500);
        assert_eq!(cfg.frame_buffer_size, 8192);
    }

    #[rstest]
    #[case::tiny_frame_buffer(
        EngineConfig { frame_buffer_size: 4, ..EngineConfig::default() },
        ConfigError::FrameBufferTooSmall(4)
    )]
    #[case::no_read_buffer(
        EngineConfig { read_buffer_size: 0, ..EngineConfig::default() },
        ConfigError::ZeroReadBuffer
    )]
    #[case::inverted_workers(
        EngineConfig {
            dispatch: DispatchConfig { min_workers: 9, max_workers: 3, ..DispatchConfig::default() },
            ..EngineConfig::default()
        },
        ConfigError::InvertedWorkerBounds { min: 9, max: 3 }
    )]
    #[case::tiny_write_limit(
        EngineConfig { write_limit: 100, ..EngineConfig::default() },
        ConfigError::WriteLimitTooSmall { limit: 100, frame: 8192 }
    )]
    fn validate_reports_first_problem(#[case] cfg: EngineConfig, #[case] expected: ConfigError) {
        assert_eq!(cfg.validate(), Err(expected));
        assert!(cfg.normalized().validate().is_ok());
    }

    #[test]
    fn smallest_frame_buffer_carries_one_byte() {
        let cfg = EngineConfig {
            frame_buffer_size: 0,
            ..EngineConfig::default()
        }
        .normalized();
        assert_eq!(cfg.max_frame_payload().get(), 1);
    }
}

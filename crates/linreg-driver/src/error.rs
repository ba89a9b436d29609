// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for accelerator driver operations

use linreg_isa::EncodeError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, LinregError>;

/// Errors that can occur while driving the accelerator
#[derive(Debug, Error)]
pub enum LinregError {
    /// An operand did not fit its instruction field
    #[error("Encoding failed: {source}")]
    Encode {
        /// Underlying encoder error
        #[from]
        source: EncodeError,
    },

    /// A send or receive did not complete within its bound
    #[error("Channel {operation} timed out after {duration_ms}ms")]
    ChannelTimeout {
        /// `send` or `receive`
        operation: &'static str,
        /// Timeout in milliseconds
        duration_ms: u64,
    },

    /// The peer end of the channel is gone
    #[error("Channel closed: {reason}")]
    ChannelClosed {
        /// Reason for closure
        reason: String,
    },

    /// Device node not found at the expected path
    #[error("Device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Problem data cannot be addressed by the instruction set
    #[error("Invalid problem: {reason}")]
    InvalidProblem {
        /// Reason for rejection
        reason: String,
    },

    /// Configuration rejected before the run started
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// Run cancelled through its token
    #[error("Run cancelled before iteration {iteration}")]
    Cancelled {
        /// Iteration that would have been issued next
        iteration: u32,
    },
}

impl LinregError {
    /// Create a channel timeout error
    pub fn channel_timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::ChannelTimeout {
            operation,
            duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a channel closed error
    pub fn channel_closed(reason: impl Into<String>) -> Self {
        Self::ChannelClosed {
            reason: reason.into(),
        }
    }

    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create an invalid problem error
    pub fn invalid_problem(reason: impl Into<String>) -> Self {
        Self::InvalidProblem {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// True for failures of the channel itself (stall or closed peer)
    pub const fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            Self::ChannelTimeout { .. } | Self::ChannelClosed { .. } | Self::Io { .. }
        )
    }
}

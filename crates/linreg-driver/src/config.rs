// SPDX-License-Identifier: AGPL-3.0-only

//! Run configuration
//!
//! Defaults reproduce the observed accelerator configuration: threshold 1,
//! iteration cap 1000, scale 2048, one tick per 100 000 cycles of 50 ns.

use crate::error::{LinregError, Result};
use crate::tick::TimerConfig;
use linreg_isa::layout::MAX_ITERATION;
use linreg_isa::FixedScale;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the accelerator device node
pub const DEVICE_ENV: &str = "LINREG_DEVICE";

/// Conventional device node for hardware runs
pub const DEFAULT_DEVICE: &str = "/dev/linreg0";

/// Control loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinregConfig {
    /// Convergence threshold in fixed-point units (absolute)
    pub threshold: u32,

    /// Exclusive cap on the iteration counter
    pub max_iterations: u32,

    /// Bound on each send
    pub send_timeout: Duration,

    /// Bound on each receive
    pub receive_timeout: Duration,

    /// Fixed-point scale of the problem data and the virtual accelerators
    pub scale: FixedScale,

    /// Tick period for elapsed-time estimates
    pub timer: TimerConfig,
}

impl Default for LinregConfig {
    fn default() -> Self {
        Self {
            threshold: 1,
            max_iterations: 1000,
            send_timeout: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(1),
            scale: FixedScale::default(),
            timer: TimerConfig::default(),
        }
    }
}

impl LinregConfig {
    /// Set the convergence threshold
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the iteration cap
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set both channel timeouts
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self.receive_timeout = timeout;
        self
    }

    /// Set the fixed-point scale
    #[must_use]
    pub const fn with_scale(mut self, scale: FixedScale) -> Self {
        self.scale = scale;
        self
    }

    /// Set the timer period
    #[must_use]
    pub const fn with_timer(mut self, timer: TimerConfig) -> Self {
        self.timer = timer;
        self
    }

    /// Device node named by `LINREG_DEVICE`, if set and non-empty
    pub fn device_from_env() -> Option<PathBuf> {
        std::env::var_os(DEVICE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// Reject configurations the control loop cannot honour
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations < 2 {
            return Err(LinregError::invalid_config(format!(
                "max_iterations = {} leaves no iteration to run",
                self.max_iterations
            )));
        }
        if self.max_iterations - 1 > MAX_ITERATION {
            return Err(LinregError::invalid_config(format!(
                "max_iterations = {} exceeds the 29-bit iteration field",
                self.max_iterations
            )));
        }
        if self.send_timeout.is_zero() || self.receive_timeout.is_zero() {
            return Err(LinregError::invalid_config("channel timeouts must be non-zero"));
        }
        if self.timer.period_cycles == 0 || self.timer.ns_per_cycle == 0 {
            return Err(LinregError::invalid_config("timer period must be non-zero"));
        }

        debug!(
            "Config: threshold {} cap {} timeouts {:?}/{:?} scale 2^{}",
            self.threshold,
            self.max_iterations,
            self.send_timeout,
            self.receive_timeout,
            self.scale.shift()
        );
        Ok(())
    }
}

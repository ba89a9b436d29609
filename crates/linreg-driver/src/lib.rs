// SPDX-License-Identifier: AGPL-3.0-only

//! Host driver for the gradient-descent linear regression accelerator.
//!
//! The accelerator is a fixed-function unit reachable only through a pair of
//! 32-bit word FIFOs. This crate encodes the problem into instructions, runs
//! the iterate-and-poll control loop over a [`WordChannel`], and estimates
//! elapsed time from a periodic tick source.
//!
//! # Channel hierarchy
//!
//! ```text
//! Hardware:
//!   DeviceChannel       — character device carrying little-endian words
//!
//! Development / CI:
//!   FifoChannel         — bounded FIFO pair, accelerator on its own thread
//!   SoftwareAccelerator — synchronous in-process virtual accelerator
//!
//! Tests:
//!   RecordingChannel    — records the trace, replays scripted responses
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use linreg_driver::{open_channel, ChannelSelection, ControlLoop, LinregConfig, Problem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let problem = Problem::reference();
//! let config = LinregConfig::default();
//! let channel = open_channel(&ChannelSelection::Software, problem.m(), problem.n(), config.scale)?;
//!
//! let report = ControlLoop::new(channel, config).run(&problem)?;
//! println!("{} after {} iterations: {}", report.status, report.iterations, report.model());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod channel;
pub mod channels;
mod config;
mod control;
pub mod convergence;
mod error;
pub mod problem;
pub mod tick;

pub use channel::{open_channel, ChannelSelection, ChannelType, WordChannel};
pub use channels::{
    fifo_pair, spawn_software, AcceleratorEndpoint, DeviceChannel, FifoChannel, RecordingChannel,
    SoftwareAccelerator,
};
pub use config::{LinregConfig, DEFAULT_DEVICE, DEVICE_ENV};
pub use control::{
    upload_sequence, CancelToken, ControlLoop, ControlState, ConvergenceStatus, RunReport,
};
pub use convergence::has_converged;
pub use error::{LinregError, Result};
pub use problem::{Model, Problem};
pub use tick::{ElapsedEstimate, ManualTicker, ThreadTicker, TickCounter, TickSource, TimerConfig};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        open_channel, CancelToken, ChannelSelection, ControlLoop, ConvergenceStatus,
        LinregConfig, LinregError, Problem, Result, RunReport, TickCounter, TickSource,
        WordChannel,
    };
}

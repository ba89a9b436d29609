// SPDX-License-Identifier: AGPL-3.0-only

//! Word channel abstraction
//!
//! The accelerator is reachable only through a pair of ordered, blocking,
//! 32-bit word FIFOs: one host → accelerator, one accelerator → host. There is
//! no framing; the control loop owns sequencing and counts.

use crate::channels::{DeviceChannel, SoftwareAccelerator};
use crate::error::Result;
use linreg_isa::{FixedScale, Word};
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

/// Point-to-point word channel to the accelerator
///
/// Ordering contract:
/// - Words are consumed by the accelerator in send order (single producer)
/// - Each word received after a `COMPUTE` is one theta component, index order
pub trait WordChannel: Debug + Send {
    /// Send one word, waiting at most `timeout` for the accelerator to accept it
    ///
    /// # Errors
    ///
    /// Returns `ChannelTimeout` if the word was not accepted in time,
    /// `ChannelClosed` if the accelerator end is gone.
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()>;

    /// Receive one word, waiting at most `timeout` for the accelerator to produce it
    ///
    /// # Errors
    ///
    /// Returns `ChannelTimeout` if no word arrived in time,
    /// `ChannelClosed` if the accelerator end is gone.
    fn receive(&mut self, timeout: Duration) -> Result<Word>;

    /// Channel type for debugging
    fn channel_type(&self) -> ChannelType;
}

impl<C: WordChannel + ?Sized> WordChannel for Box<C> {
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()> {
        (**self).send(word, timeout)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        (**self).receive(timeout)
    }

    fn channel_type(&self) -> ChannelType {
        (**self).channel_type()
    }
}

impl<C: WordChannel + ?Sized> WordChannel for &mut C {
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()> {
        (**self).send(word, timeout)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        (**self).receive(timeout)
    }

    fn channel_type(&self) -> ChannelType {
        (**self).channel_type()
    }
}

/// Channel type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// In-process virtual accelerator, executes words synchronously
    Software,

    /// Bounded FIFO pair to an accelerator running on its own thread
    Fifo,

    /// Character device carrying little-endian words
    Device,

    /// Test double recording the instruction trace
    Recording,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Software => write!(f, "Software (virtual accelerator)"),
            Self::Fifo => write!(f, "FIFO (threaded virtual accelerator)"),
            Self::Device => write!(f, "Device"),
            Self::Recording => write!(f, "Recording"),
        }
    }
}

/// Channel selection strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelection {
    /// Synchronous in-process virtual accelerator
    Software,

    /// Virtual accelerator behind a bounded FIFO of the given depth
    Threaded {
        /// FIFO depth in words, each direction
        depth: usize,
    },

    /// Hardware FIFO exposed as a character device
    Device {
        /// Device node, e.g. `/dev/linreg0`
        path: PathBuf,
    },
}

/// Open the channel described by `selection`
///
/// The virtual accelerators are built for an `m × n` problem at `scale`;
/// hardware ignores those parameters (its dimensions are fixed at synthesis).
///
/// # Errors
///
/// Returns error if the device cannot be opened or the accelerator thread
/// cannot be spawned.
pub fn open_channel(
    selection: &ChannelSelection,
    m: usize,
    n: usize,
    scale: FixedScale,
) -> Result<Box<dyn WordChannel>> {
    match selection {
        ChannelSelection::Software => {
            tracing::info!("Using software accelerator ({m}×{n})");
            Ok(Box::new(SoftwareAccelerator::new(m, n, scale)))
        }

        ChannelSelection::Threaded { depth } => {
            tracing::info!("Using threaded software accelerator ({m}×{n}, depth {depth})");
            let channel = crate::channels::fifo::spawn_software(
                SoftwareAccelerator::new(m, n, scale),
                *depth,
            )?;
            Ok(Box::new(channel))
        }

        ChannelSelection::Device { path } => {
            tracing::info!("Using device channel {}", path.display());
            DeviceChannel::open(path).map(|c| Box::new(c) as Box<dyn WordChannel>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_selection_always_opens() {
        let channel = open_channel(&ChannelSelection::Software, 6, 2, FixedScale::default())
            .expect("software channel");
        assert_eq!(channel.channel_type(), ChannelType::Software);
    }

    #[test]
    fn missing_device_is_reported() {
        let result = open_channel(
            &ChannelSelection::Device {
                path: PathBuf::from("/dev/linreg-does-not-exist"),
            },
            6,
            2,
            FixedScale::default(),
        );
        assert!(matches!(
            result,
            Err(crate::LinregError::DeviceNotFound { .. })
        ));
    }
}

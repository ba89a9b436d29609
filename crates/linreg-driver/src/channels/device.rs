// SPDX-License-Identifier: AGPL-3.0-only

//! Character-device channel
//!
//! Platforms that bridge the accelerator's FIFOs to Linux expose them as a
//! stream device: each `write` of 4 bytes pushes one word, each 4-byte `read`
//! pops one result. Words travel little-endian.
//!
//! The device is opened non-blocking and every transfer waits with `poll`
//! under the caller's timeout, so a stalled accelerator surfaces as
//! `ChannelTimeout` instead of hanging the control thread.

use crate::channel::{ChannelType, WordChannel};
use crate::error::{LinregError, Result};
use linreg_isa::Word;
use rustix::event::{poll, PollFd, PollFlags};
use rustix::fs::OFlags;
use rustix::io::Errno;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// Hardware word FIFO behind a character device
#[derive(Debug)]
pub struct DeviceChannel {
    path: PathBuf,
    file: File,
}

impl DeviceChannel {
    /// Open the device node at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the node does not exist or cannot be opened read/write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LinregError::device_not_found(path));
        }

        #[allow(clippy::cast_possible_wrap)]
        let nonblock_flag = OFlags::NONBLOCK.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nonblock_flag)
            .open(path)?;

        info!("Opened accelerator channel {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Device node path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the device is ready for `flags` or `deadline` passes
    fn wait(&self, flags: PollFlags, deadline: Instant, operation: &'static str, timeout: Duration) -> Result<()> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinregError::channel_timeout(operation, timeout));
            }

            let millis = i32::try_from(remaining.as_millis().max(1)).unwrap_or(i32::MAX);
            let mut fds = [PollFd::new(&self.file, flags)];
            match poll(&mut fds, millis) {
                Ok(0) | Err(Errno::INTR) => continue,
                Ok(_) => {
                    let revents = fds[0].revents();
                    if revents.intersects(PollFlags::HUP | PollFlags::ERR) && !revents.contains(flags) {
                        return Err(LinregError::channel_closed(format!(
                            "{} reported {revents:?}",
                            self.path.display()
                        )));
                    }
                    return Ok(());
                }
                Err(e) => return Err(std::io::Error::from(e).into()),
            }
        }
    }
}

impl WordChannel for DeviceChannel {
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let le = word.to_le();
        let bytes = bytemuck::bytes_of(&le);
        let mut written = 0;

        while written < WORD_BYTES {
            match rustix::io::write(&self.file, &bytes[written..]) {
                Ok(0) => return Err(LinregError::channel_closed("device accepted 0 bytes")),
                Ok(n) => written += n,
                Err(Errno::AGAIN | Errno::INTR) => {
                    self.wait(PollFlags::OUT, deadline, "send", timeout)?;
                }
                Err(e) => return Err(std::io::Error::from(e).into()),
            }
        }

        debug!("Device {} <- {word:#010x}", self.path.display());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0_u8; WORD_BYTES];
        let mut filled = 0;

        while filled < WORD_BYTES {
            match rustix::io::read(&self.file, &mut buf[filled..]) {
                Ok(0) => return Err(LinregError::channel_closed("device reached end of stream")),
                Ok(n) => filled += n,
                Err(Errno::AGAIN | Errno::INTR) => {
                    self.wait(PollFlags::IN, deadline, "receive", timeout)?;
                }
                Err(e) => return Err(std::io::Error::from(e).into()),
            }
        }

        let word = Word::from_le(bytemuck::pod_read_unaligned(&buf));
        debug!("Device {} -> {word:#010x}", self.path.display());
        Ok(word)
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Device
    }
}

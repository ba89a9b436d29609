// SPDX-License-Identifier: AGPL-3.0-only

//! Word channel implementations
//!
//! - **Software**: in-process virtual accelerator (CI, no hardware)
//! - **Fifo**: bounded FIFO pair to a virtual accelerator on its own thread
//! - **Device**: hardware FIFO exposed as a character device
//! - **Recording**: scripted test double capturing the instruction trace

pub mod device;
pub mod fifo;
pub mod recording;
pub mod software;

pub use device::DeviceChannel;
pub use fifo::{fifo_pair, spawn_software, AcceleratorEndpoint, FifoChannel};
pub use recording::RecordingChannel;
pub use software::SoftwareAccelerator;

// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded FIFO channel pair
//!
//! Models the hardware's two unidirectional word FIFOs with bounded
//! `std::sync::mpsc::sync_channel`s. The host end implements `WordChannel`
//! with bounded waits; the accelerator end is served by a thread.
//!
//! ```text
//!  host ── FifoChannel::send ──▶ [depth words] ──▶ AcceleratorEndpoint::recv
//!  host ◀─ FifoChannel::receive ◀ [depth words] ◀── AcceleratorEndpoint::send
//! ```

use crate::channel::{ChannelType, WordChannel};
use crate::channels::SoftwareAccelerator;
use crate::error::{LinregError, Result};
use linreg_isa::Word;
use std::sync::mpsc::{
    sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Back-off between attempts while the outbound FIFO is full
const FULL_BACKOFF: Duration = Duration::from_micros(50);

/// Host end of a FIFO pair
#[derive(Debug)]
pub struct FifoChannel {
    to_accelerator: Option<SyncSender<Word>>,
    from_accelerator: Receiver<Word>,
    worker: Option<JoinHandle<Result<()>>>,
}

/// Accelerator end of a FIFO pair
#[derive(Debug)]
pub struct AcceleratorEndpoint {
    commands: Receiver<Word>,
    results: SyncSender<Word>,
}

/// Create a connected host/accelerator FIFO pair, `depth` words each way.
pub fn fifo_pair(depth: usize) -> (FifoChannel, AcceleratorEndpoint) {
    let (cmd_tx, cmd_rx) = sync_channel(depth);
    let (res_tx, res_rx) = sync_channel(depth);
    (
        FifoChannel {
            to_accelerator: Some(cmd_tx),
            from_accelerator: res_rx,
            worker: None,
        },
        AcceleratorEndpoint {
            commands: cmd_rx,
            results: res_tx,
        },
    )
}

/// Run `accelerator` on its own thread behind a FIFO pair.
///
/// The thread exits when the host end is dropped.
///
/// # Errors
///
/// Returns error if the thread cannot be spawned.
pub fn spawn_software(accelerator: SoftwareAccelerator, depth: usize) -> Result<FifoChannel> {
    let (mut host, endpoint) = fifo_pair(depth);
    let worker = std::thread::Builder::new()
        .name("linreg-accelerator".into())
        .spawn(move || endpoint.serve(accelerator))?;
    host.worker = Some(worker);
    Ok(host)
}

impl AcceleratorEndpoint {
    /// Block until the host sends a word. `None` once the host end is gone.
    pub fn recv(&self) -> Option<Word> {
        self.commands.recv().ok()
    }

    /// Block until the host has room for a result. `false` once the host end is gone.
    pub fn send(&self, word: Word) -> bool {
        self.results.send(word).is_ok()
    }

    /// Execute words with `accelerator` until the host hangs up.
    ///
    /// # Errors
    ///
    /// Returns error if the host sends a word with an unassigned opcode.
    pub fn serve(self, mut accelerator: SoftwareAccelerator) -> Result<()> {
        info!("Accelerator thread started");
        while let Some(word) = self.recv() {
            accelerator.execute_word(word)?;
            while let Some(out) = accelerator.pop_output() {
                if !self.send(out) {
                    debug!("Host closed while results pending");
                    return Ok(());
                }
            }
        }
        info!(
            "Accelerator thread stopped after {} instructions",
            accelerator.executed()
        );
        Ok(())
    }
}

impl WordChannel for FifoChannel {
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()> {
        let tx = self
            .to_accelerator
            .as_ref()
            .ok_or_else(|| LinregError::channel_closed("host end already shut down"))?;

        let deadline = Instant::now() + timeout;
        let mut pending = word;
        loop {
            match tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_)) => {
                    return Err(LinregError::channel_closed("accelerator end disconnected"));
                }
                Err(TrySendError::Full(w)) => pending = w,
            }

            if Instant::now() >= deadline {
                return Err(LinregError::channel_timeout("send", timeout));
            }
            std::thread::sleep(FULL_BACKOFF);
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        self.from_accelerator
            .recv_timeout(timeout)
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => LinregError::channel_timeout("receive", timeout),
                RecvTimeoutError::Disconnected => {
                    LinregError::channel_closed("accelerator end disconnected")
                }
            })
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Fifo
    }
}

impl Drop for FifoChannel {
    fn drop(&mut self) {
        // Closing the command FIFO ends the accelerator's receive loop
        drop(self.to_accelerator.take());
        if let Some(worker) = self.worker.take() {
            // Unblock a worker stuck on a full result FIFO
            while !worker.is_finished() {
                while self.from_accelerator.try_recv().is_ok() {}
                std::thread::yield_now();
            }
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Accelerator thread failed: {e}"),
                Err(_) => warn!("Accelerator thread panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ControlLoop, ControlState, LinregConfig, Problem};
    use linreg_isa::{FixedScale, Instruction};

    const WAIT: Duration = Duration::from_millis(500);

    #[test]
    fn words_cross_in_order() {
        let (mut host, endpoint) = fifo_pair(4);
        let echo = std::thread::spawn(move || {
            while let Some(w) = endpoint.recv() {
                if !endpoint.send(w + 1) {
                    break;
                }
            }
        });

        for w in [10, 20, 30] {
            host.send(w, WAIT).unwrap();
        }
        assert_eq!(host.receive(WAIT).unwrap(), 11);
        assert_eq!(host.receive(WAIT).unwrap(), 21);
        assert_eq!(host.receive(WAIT).unwrap(), 31);

        drop(host);
        echo.join().unwrap();
    }

    #[test]
    fn receive_times_out_on_silent_accelerator() {
        let (mut host, _endpoint) = fifo_pair(1);
        let err = host.receive(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, LinregError::ChannelTimeout { operation: "receive", .. }));
    }

    #[test]
    fn send_times_out_when_fifo_full() {
        let (mut host, _endpoint) = fifo_pair(1);
        host.send(1, WAIT).unwrap();
        let err = host.send(2, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, LinregError::ChannelTimeout { operation: "send", .. }));
    }

    #[test]
    fn dropped_accelerator_reports_closed() {
        let (mut host, endpoint) = fifo_pair(1);
        drop(endpoint);
        assert!(matches!(
            host.send(1, WAIT),
            Err(LinregError::ChannelClosed { .. })
        ));
        assert!(matches!(
            host.receive(WAIT),
            Err(LinregError::ChannelClosed { .. })
        ));
    }

    #[test]
    fn run_over_dropped_accelerator_fails_closed() {
        let (host, endpoint) = fifo_pair(4);
        drop(endpoint);
        let mut ctl = ControlLoop::new(host, LinregConfig::default().with_timeout(WAIT));
        let err = ctl.run(&Problem::reference()).unwrap_err();
        assert!(matches!(err, LinregError::ChannelClosed { .. }));
        assert_eq!(ctl.state(), ControlState::Failed);
    }

    #[test]
    fn closed_result_fifo_still_gets_terminal_reset() {
        let (host, endpoint) = fifo_pair(32);
        let AcceleratorEndpoint { commands, results } = endpoint;
        drop(results);

        let mut ctl = ControlLoop::new(host, LinregConfig::default().with_timeout(WAIT));
        let err = ctl.run(&Problem::reference()).unwrap_err();
        assert!(matches!(err, LinregError::ChannelClosed { .. }));
        assert_eq!(ctl.state(), ControlState::Failed);

        // reset, 21-word upload, first compute, terminal reset
        let received: Vec<Instruction> = commands
            .try_iter()
            .map(|w| Instruction::decode(w).unwrap())
            .collect();
        assert_eq!(received.len(), 24);
        assert_eq!(received[22], Instruction::Compute { iteration: 1 });
        assert_eq!(received.last(), Some(&Instruction::Reset));
    }

    #[test]
    fn threaded_software_accelerator_answers_compute() {
        let mut host = spawn_software(SoftwareAccelerator::new(1, 2, FixedScale::default()), 8)
            .unwrap();
        for insn in [
            Instruction::Reset,
            Instruction::store_x(2048, 0, 0).unwrap(),
            Instruction::store_x(2048, 0, 1).unwrap(),
            Instruction::store_y(4096, 0).unwrap(),
            Instruction::store_t(0, 0).unwrap(),
            Instruction::store_t(0, 1).unwrap(),
            Instruction::store_alpha(1024).unwrap(),
            Instruction::compute(1).unwrap(),
        ] {
            host.send(insn.encode().unwrap(), WAIT).unwrap();
        }
        let t0: i32 = bytemuck::cast(host.receive(WAIT).unwrap());
        let t1: i32 = bytemuck::cast(host.receive(WAIT).unwrap());
        assert_eq!(t0, t1);
        assert!(t0 > 0);
    }
}

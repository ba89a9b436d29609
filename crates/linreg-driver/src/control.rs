// SPDX-License-Identifier: AGPL-3.0-only

//! Control loop
//!
//! ```text
//! Idle ─▶ Resetting ─▶ LoadingParameters ─▶ Iterating ─┬▶ Converged
//!                                                      └▶ IterationLimitReached
//! ```
//!
//! Every run ends with a terminal `reset`, whatever the outcome. A failed
//! run (channel stall, encoding error, cancellation) lands in `Failed` after
//! the reset has been attempted.

use crate::channel::WordChannel;
use crate::config::LinregConfig;
use crate::convergence::{has_converged, max_deviation};
use crate::error::{LinregError, Result};
use crate::problem::{Model, Problem};
use crate::tick::{ElapsedEstimate, TickCounter};
use linreg_isa::{EncodeError, Instruction, Word};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Control loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// No run started
    Idle,
    /// Initial reset issued
    Resetting,
    /// Uploading X, Y, T and alpha
    LoadingParameters,
    /// Compute/retrieve cycle in progress
    Iterating {
        /// Current iteration (1-based)
        iteration: u32,
    },
    /// Converged; terminal reset issued
    Converged,
    /// Cap reached without convergence; terminal reset issued
    IterationLimitReached,
    /// Run aborted
    Failed,
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Every theta component moved by at most the threshold
    Converged,
    /// The iteration cap was reached first
    IterationLimitReached,
}

impl std::fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::IterationLimitReached => write!(f, "iteration limit reached"),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Final theta as returned by the accelerator
    pub theta: Vec<i32>,
    /// Value of the iteration counter at termination
    pub iterations: u32,
    /// Converged or capped
    pub status: ConvergenceStatus,
    /// Present when the loop ran with a tick counter
    pub elapsed: Option<ElapsedEstimate>,
}

impl RunReport {
    /// Fitted model over the final theta
    pub fn model(&self) -> Model {
        Model::new(self.theta.clone())
    }
}

/// Cooperative cancellation flag, checked before each compute
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once `cancel` was called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Parameter upload following the initial reset
///
/// `store_x` row-major, `store_y` by row, `store_t` by index, then alpha.
///
/// # Errors
///
/// Returns the first operand that does not fit its field.
pub fn upload_sequence(problem: &Problem) -> std::result::Result<Vec<Instruction>, EncodeError> {
    let (m, n) = (problem.m(), problem.n());
    let mut sequence = Vec::with_capacity(m * n + m + n + 1);

    for (i, row) in (0_u8..).zip(problem.x()) {
        for (j, &value) in (0_u8..).zip(row) {
            sequence.push(Instruction::store_x(value, i, j)?);
        }
    }
    for (i, &value) in (0_u8..).zip(problem.y()) {
        sequence.push(Instruction::store_y(value, i)?);
    }
    for (i, &value) in (0_u8..).zip(problem.theta()) {
        sequence.push(Instruction::store_t(value, i)?);
    }
    sequence.push(Instruction::store_alpha(problem.alpha())?);

    Ok(sequence)
}

/// Drives one accelerator through reset, upload and iteration
#[derive(Debug)]
pub struct ControlLoop<C: WordChannel> {
    channel: C,
    config: LinregConfig,
    timer: Option<TickCounter>,
    cancel: Option<CancelToken>,
    state: ControlState,
}

impl<C: WordChannel> ControlLoop<C> {
    /// Loop over `channel` with `config`, untimed and uncancellable
    pub fn new(channel: C, config: LinregConfig) -> Self {
        Self {
            channel,
            config,
            timer: None,
            cancel: None,
            state: ControlState::Idle,
        }
    }

    /// Measure each run with `counter` (tic before the initial reset, toc
    /// after the terminal reset)
    #[must_use]
    pub fn with_timer(mut self, counter: &TickCounter) -> Self {
        self.timer = Some(counter.clone());
        self
    }

    /// Abort the run when `token` is cancelled
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Current state
    pub const fn state(&self) -> ControlState {
        self.state
    }

    /// Configuration in use
    pub const fn config(&self) -> &LinregConfig {
        &self.config
    }

    /// Underlying channel
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Release the channel
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Run gradient descent on `problem` to convergence or the cap
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, an operand does not
    /// fit its field, the channel stalls or closes, or the run is cancelled.
    /// The terminal reset is attempted before any error is returned.
    pub fn run(&mut self, problem: &Problem) -> Result<RunReport> {
        self.config.validate()?;

        if let Some(timer) = &self.timer {
            timer.tic();
        }

        let outcome = self.drive(problem);
        let reset = self.issue(Instruction::reset());
        let elapsed = self.timer.as_ref().map(TickCounter::toc);

        let (theta, iterations, status) = match outcome.and_then(|done| reset.map(|()| done)) {
            Ok(done) => done,
            Err(e) => {
                warn!("Run aborted in {:?}: {e}", self.state);
                self.state = ControlState::Failed;
                return Err(e);
            }
        };

        self.state = match status {
            ConvergenceStatus::Converged => ControlState::Converged,
            ConvergenceStatus::IterationLimitReached => ControlState::IterationLimitReached,
        };
        info!("Run finished after {iterations} iterations: {status}");
        if let Some(elapsed) = &elapsed {
            info!("Elapsed: {elapsed}");
        }

        Ok(RunReport {
            theta,
            iterations,
            status,
            elapsed,
        })
    }

    fn drive(&mut self, problem: &Problem) -> Result<(Vec<i32>, u32, ConvergenceStatus)> {
        let upload = upload_sequence(problem)?;
        let n = problem.n();

        self.transition(ControlState::Resetting);
        self.issue(Instruction::reset())?;

        self.transition(ControlState::LoadingParameters);
        for insn in upload {
            self.issue(insn)?;
        }

        let mut old = problem.theta().to_vec();
        let mut new = vec![0; n];
        let mut iteration = 1;

        while iteration < self.config.max_iterations {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(LinregError::Cancelled { iteration });
            }

            self.state = ControlState::Iterating { iteration };
            self.issue(Instruction::compute(iteration)?)?;

            for slot in &mut new {
                let word: Word = self.channel.receive(self.config.receive_timeout)?;
                *slot = bytemuck::cast(word);
            }
            debug!(
                "Iteration {iteration}: theta {new:?} (max change {})",
                max_deviation(&new, &old, n)
            );

            if has_converged(&new, &old, n, self.config.threshold) {
                return Ok((new, iteration, ConvergenceStatus::Converged));
            }

            std::mem::swap(&mut old, &mut new);
            iteration += 1;
        }

        Ok((old, iteration, ConvergenceStatus::IterationLimitReached))
    }

    fn issue(&mut self, insn: Instruction) -> Result<()> {
        let word = insn.encode()?;
        debug!("Instruction {word:#010x}: {insn}");
        self.channel.send(word, self.config.send_timeout)
    }

    fn transition(&mut self, next: ControlState) {
        info!("{:?} -> {next:?}", self.state);
        self.state = next;
    }
}

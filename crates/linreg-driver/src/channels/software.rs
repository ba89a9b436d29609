// SPDX-License-Identifier: AGPL-3.0-only

//! Software (virtual accelerator) channel
//!
//! Implements `WordChannel` by decoding each word and executing it in-process
//! with the same fixed-point arithmetic the accelerator datapath uses. This
//! enables:
//!
//! 1. **CI without hardware**: the control loop runs end to end against a
//!    deterministic accelerator.
//! 2. **Baseline for hardware validation**: a hardware run can be compared
//!    word for word with the software result for the same upload.
//!
//! ## Datapath model
//!
//! One `COMPUTE` performs a full batch gradient-descent step:
//!
//! ```text
//! h_i   = Σ_j X[i][j]·T[j]                 (rescaled per product)
//! g_j   = Σ_i (h_i − Y[i])·X[i][j]         (rescaled per product)
//! T[j] ← T[j] − (alpha·g_j) / M
//! ```
//!
//! and queues the N updated theta components for the host to read back.

use crate::channel::{ChannelType, WordChannel};
use crate::error::{LinregError, Result};
use linreg_isa::layout::{MAX_COL, MAX_ROW};
use linreg_isa::{FixedScale, Instruction, Word};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace, warn};

const ROWS: usize = MAX_ROW as usize + 1;
const COLS: usize = MAX_COL as usize + 1;

/// Software (virtual accelerator) channel
///
/// Dimensions are fixed at construction, like the hardware's synthesis-time
/// `M` and `N`. Indices outside them are stored but never used.
#[derive(Debug)]
pub struct SoftwareAccelerator {
    /// Training examples
    m: usize,
    /// Features (theta length)
    n: usize,
    scale: FixedScale,

    x: [[i32; COLS]; ROWS],
    y: [i32; ROWS],
    t: [i32; ROWS],
    alpha: i32,

    /// Words produced by COMPUTE, not yet read by the host
    output: VecDeque<Word>,
    /// Instructions executed since construction
    executed: u64,
    /// Last iteration number seen in a COMPUTE
    last_iteration: Option<u32>,
}

impl SoftwareAccelerator {
    /// Create a virtual accelerator for an `m × n` problem.
    ///
    /// Dimensions are clamped to what the 3-bit index fields can address.
    pub fn new(m: usize, n: usize, scale: FixedScale) -> Self {
        if m > ROWS || n > COLS {
            warn!("SoftwareAccelerator: {m}×{n} exceeds addressable {ROWS}×{COLS}, clamping");
        }
        Self {
            m: m.min(ROWS),
            n: n.min(COLS),
            scale,
            x: [[0; COLS]; ROWS],
            y: [0; ROWS],
            t: [0; ROWS],
            alpha: 0,
            output: VecDeque::new(),
            executed: 0,
            last_iteration: None,
        }
    }

    /// Decode and execute one word.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if the word carries an unassigned opcode.
    pub fn execute_word(&mut self, word: Word) -> Result<()> {
        let insn = Instruction::decode(word)?;
        self.execute(insn);
        Ok(())
    }

    /// Execute one decoded instruction.
    pub fn execute(&mut self, insn: Instruction) {
        self.executed += 1;
        match insn {
            Instruction::Reset => self.reset(),
            Instruction::StoreX { row, col, value } => {
                self.x[usize::from(row)][usize::from(col)] = value;
            }
            Instruction::StoreY { row, value } => self.y[usize::from(row)] = value,
            Instruction::StoreT { row, value } => self.t[usize::from(row)] = value,
            Instruction::StoreAlpha { value } => self.alpha = value,
            Instruction::Compute { iteration } => {
                self.last_iteration = Some(iteration);
                self.step();
            }
        }
    }

    /// Take the next produced word, if any.
    pub fn pop_output(&mut self) -> Option<Word> {
        self.output.pop_front()
    }

    /// Current theta registers (first `n`).
    pub fn theta(&self) -> &[i32] {
        &self.t[..self.n]
    }

    /// Number of instructions executed.
    pub const fn executed(&self) -> u64 {
        self.executed
    }

    /// Iteration number of the last COMPUTE since reset.
    pub const fn last_iteration(&self) -> Option<u32> {
        self.last_iteration
    }

    /// Clear every register and the output FIFO.
    fn reset(&mut self) {
        self.x = [[0; COLS]; ROWS];
        self.y = [0; ROWS];
        self.t = [0; ROWS];
        self.alpha = 0;
        self.output.clear();
        self.last_iteration = None;
    }

    /// One batch gradient-descent step; queues the new theta.
    fn step(&mut self) {
        let (m, n) = (self.m, self.n);
        let s = self.scale;

        let mut gradient = [0_i64; COLS];
        for i in 0..m {
            let h = (0..n)
                .map(|j| s.mul(i64::from(self.x[i][j]), i64::from(self.t[j])))
                .fold(0_i64, i64::saturating_add);
            let err = h.saturating_sub(i64::from(self.y[i]));
            for (j, g) in gradient.iter_mut().enumerate().take(n) {
                *g = g.saturating_add(s.mul(err, i64::from(self.x[i][j])));
            }
        }

        let divisor = i64::try_from(m.max(1)).unwrap_or(i64::MAX);
        for j in 0..n {
            let delta = s.mul(i64::from(self.alpha), gradient[j]) / divisor;
            let updated = i64::from(self.t[j]).saturating_sub(delta);
            self.t[j] = saturate(updated);
            self.output.push_back(bytemuck::cast(self.t[j]));
        }

        debug!(
            "SoftwareAccelerator: iteration {:?} theta {:?}",
            self.last_iteration,
            &self.t[..n]
        );
    }
}

impl WordChannel for SoftwareAccelerator {
    fn send(&mut self, word: Word, _timeout: Duration) -> Result<()> {
        // Executes synchronously; never blocks
        self.execute_word(word)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        // Nothing else will ever fill the FIFO: an empty read is a stall
        self.pop_output().ok_or_else(|| {
            trace!("SoftwareAccelerator: receive on empty output FIFO");
            LinregError::channel_timeout("receive", timeout)
        })
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Software
    }
}

#[allow(clippy::cast_possible_truncation)]
fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Recording channel (test double)
//!
//! Records every word the host sends and answers receives from a scripted
//! response queue. An exhausted queue behaves like a stalled accelerator.

use crate::channel::{ChannelType, WordChannel};
use crate::error::{LinregError, Result};
use linreg_isa::{Instruction, Opcode, Word};
use std::collections::VecDeque;
use std::time::Duration;

/// Scripted channel that records the instruction trace
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Vec<Word>,
    responses: VecDeque<Word>,
    /// Sends at or beyond this count time out
    stall_sends_at: Option<usize>,
}

impl RecordingChannel {
    /// Empty trace, no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue fixed-point responses, in the order the host will read them.
    #[must_use]
    pub fn with_responses(mut self, responses: impl IntoIterator<Item = i32>) -> Self {
        self.push_responses(responses);
        self
    }

    /// Make every send from the `count`-th onward (0-based) time out.
    #[must_use]
    pub const fn stall_sends_at(mut self, count: usize) -> Self {
        self.stall_sends_at = Some(count);
        self
    }

    /// Queue more fixed-point responses.
    pub fn push_responses(&mut self, responses: impl IntoIterator<Item = i32>) {
        self.responses
            .extend(responses.into_iter().map(bytemuck::cast::<i32, Word>));
    }

    /// Raw words sent so far.
    pub fn sent(&self) -> &[Word] {
        &self.sent
    }

    /// Decoded instruction trace. Undecodable words are skipped.
    pub fn instructions(&self) -> Vec<Instruction> {
        self.sent
            .iter()
            .filter_map(|&w| Instruction::decode(w).ok())
            .collect()
    }

    /// Number of sent instructions carrying `opcode`.
    pub fn count(&self, opcode: Opcode) -> usize {
        self.sent
            .iter()
            .filter(|&&w| Opcode::field_of(w) == opcode.value())
            .count()
    }

    /// Responses not yet consumed.
    pub fn remaining_responses(&self) -> usize {
        self.responses.len()
    }
}

impl WordChannel for RecordingChannel {
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()> {
        if self.stall_sends_at.is_some_and(|at| self.sent.len() >= at) {
            return Err(LinregError::channel_timeout("send", timeout));
        }
        self.sent.push(word);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        self.responses
            .pop_front()
            .ok_or_else(|| LinregError::channel_timeout("receive", timeout))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_replays() {
        let mut ch = RecordingChannel::new().with_responses([-3, 7]);
        ch.send(0x8000_0000, Duration::ZERO).unwrap();
        ch.send(0x6000_0001, Duration::ZERO).unwrap();

        assert_eq!(ch.receive(Duration::ZERO).unwrap(), 0xFFFF_FFFD);
        assert_eq!(ch.receive(Duration::ZERO).unwrap(), 7);
        assert!(ch.receive(Duration::ZERO).is_err());

        assert_eq!(
            ch.instructions(),
            vec![Instruction::Reset, Instruction::Compute { iteration: 1 }]
        );
        assert_eq!(ch.count(Opcode::Compute), 1);
    }

    #[test]
    fn stalls_after_configured_sends() {
        let mut ch = RecordingChannel::new().stall_sends_at(1);
        ch.send(1, Duration::ZERO).unwrap();
        assert!(matches!(
            ch.send(2, Duration::ZERO),
            Err(LinregError::ChannelTimeout { operation: "send", .. })
        ));
        assert_eq!(ch.sent(), &[1]);
    }
}

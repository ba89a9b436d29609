// SPDX-License-Identifier: AGPL-3.0-only

//! Opcode values understood by the accelerator's instruction decoder.
//!
//! The numbering is fixed by the hardware decoder and is not in declaration
//! order: `RESET` is 4 and `STORE_ALPHA` is 5. Values 6 and 7 are unassigned.

use crate::layout::{OPCODE_BITS, OPCODE_SHIFT};

/// 3-bit instruction opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Store one element of the X matrix.
    StoreX = 0,
    /// Store one element of the Y vector.
    StoreY = 1,
    /// Store one element of the theta vector.
    StoreT = 2,
    /// Run one gradient-descent iteration.
    Compute = 3,
    /// Reset accelerator registers and state.
    Reset = 4,
    /// Store the learning rate.
    StoreAlpha = 5,
}

impl Opcode {
    /// Every assigned opcode, in wire-value order.
    pub const ALL: [Self; 6] = [
        Self::StoreX,
        Self::StoreY,
        Self::StoreT,
        Self::Compute,
        Self::Reset,
        Self::StoreAlpha,
    ];

    /// Raw 3-bit value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Opcode bits already shifted into position \[31:29\].
    #[must_use]
    pub const fn word_bits(self) -> u32 {
        (self as u32) << OPCODE_SHIFT
    }

    /// Look up the opcode for a raw 3-bit value.
    #[must_use]
    pub const fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::StoreX),
            1 => Some(Self::StoreY),
            2 => Some(Self::StoreT),
            3 => Some(Self::Compute),
            4 => Some(Self::Reset),
            5 => Some(Self::StoreAlpha),
            _ => None,
        }
    }

    /// Extract the raw opcode field of a word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn field_of(word: u32) -> u8 {
        ((word >> OPCODE_SHIFT) & ((1 << OPCODE_BITS) - 1)) as u8
    }

    /// Mnemonic used in instruction traces.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::StoreX => "STORE_X",
            Self::StoreY => "STORE_Y",
            Self::StoreT => "STORE_T",
            Self::Compute => "COMPUTE",
            Self::Reset => "RESET",
            Self::StoreAlpha => "STORE_ALPHA",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

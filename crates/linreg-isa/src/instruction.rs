// SPDX-License-Identifier: AGPL-3.0-only

//! Typed instruction set and its bit-exact word encoding.
//!
//! Every operand is range-checked against its field width before packing.
//! An out-of-range operand is an [`EncodeError::InvalidOperand`], never a
//! silently truncated word. Signed values are packed two's-complement and
//! masked to the field, exactly as the accelerator decoder expects.

use crate::layout::{
    field_mask, mask, sign_extend, signed_range, COL_BITS, COL_SHIFT, ITERATION_BITS, ROW_BITS,
    ROW_SHIFT, WIDE_VALUE_BITS, X_VALUE_BITS,
};
use crate::opcode::Opcode;
use thiserror::Error;

/// Raw 32-bit instruction word as carried by the channel.
pub type Word = u32;

/// Errors raised while building, encoding or decoding an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Operand does not fit its field.
    #[error("operand `{field}` = {value} does not fit in {bits} bits")]
    InvalidOperand {
        /// Field name (`row`, `col`, `value`, `iteration`)
        field: &'static str,
        /// Declared field width
        bits: u32,
        /// Offending operand
        value: i64,
    },

    /// Word carries an opcode the accelerator does not define.
    #[error("unknown opcode {opcode} in word {word:#010x}")]
    UnknownOpcode {
        /// Raw 3-bit opcode field
        opcode: u8,
        /// Full word
        word: Word,
    },
}

/// One accelerator instruction with typed operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Reset accelerator registers and state.
    Reset,
    /// `X[row][col] = value`.
    StoreX {
        /// Matrix row (training example), 3 bits
        row: u8,
        /// Matrix column (feature), 3 bits
        col: u8,
        /// Signed fixed-point value, 23 bits
        value: i32,
    },
    /// `Y[row] = value`.
    StoreY {
        /// Target index, 3 bits
        row: u8,
        /// Signed fixed-point value, 26 bits
        value: i32,
    },
    /// `T[row] = value`.
    StoreT {
        /// Theta index, 3 bits
        row: u8,
        /// Signed fixed-point value, 26 bits
        value: i32,
    },
    /// `alpha = value`.
    StoreAlpha {
        /// Signed fixed-point learning rate, 26 bits
        value: i32,
    },
    /// Run gradient-descent iteration `iteration`.
    Compute {
        /// Unsigned iteration number, 29 bits
        iteration: u32,
    },
}

impl Instruction {
    /// `RESET`.
    #[must_use]
    pub const fn reset() -> Self {
        Self::Reset
    }

    /// `STORE_X value, row, col`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperand`] if any operand exceeds its field.
    pub fn store_x(value: i32, row: u8, col: u8) -> Result<Self, EncodeError> {
        let insn = Self::StoreX { row, col, value };
        insn.validate()?;
        Ok(insn)
    }

    /// `STORE_Y value, row`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperand`] if any operand exceeds its field.
    pub fn store_y(value: i32, row: u8) -> Result<Self, EncodeError> {
        let insn = Self::StoreY { row, value };
        insn.validate()?;
        Ok(insn)
    }

    /// `STORE_T value, row`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperand`] if any operand exceeds its field.
    pub fn store_t(value: i32, row: u8) -> Result<Self, EncodeError> {
        let insn = Self::StoreT { row, value };
        insn.validate()?;
        Ok(insn)
    }

    /// `STORE_ALPHA value`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperand`] if the value exceeds 26 bits.
    pub fn store_alpha(value: i32) -> Result<Self, EncodeError> {
        let insn = Self::StoreAlpha { value };
        insn.validate()?;
        Ok(insn)
    }

    /// `COMPUTE iteration`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperand`] if the iteration exceeds 29 bits.
    pub fn compute(iteration: u32) -> Result<Self, EncodeError> {
        let insn = Self::Compute { iteration };
        insn.validate()?;
        Ok(insn)
    }

    /// Opcode of this instruction.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Reset => Opcode::Reset,
            Self::StoreX { .. } => Opcode::StoreX,
            Self::StoreY { .. } => Opcode::StoreY,
            Self::StoreT { .. } => Opcode::StoreT,
            Self::StoreAlpha { .. } => Opcode::StoreAlpha,
            Self::Compute { .. } => Opcode::Compute,
        }
    }

    /// Check every operand against its field width.
    ///
    /// # Errors
    ///
    /// Returns the first operand that does not fit.
    pub fn validate(&self) -> Result<(), EncodeError> {
        match *self {
            Self::Reset => Ok(()),
            Self::StoreX { row, col, value } => {
                check_unsigned("row", u32::from(row), ROW_BITS)?;
                check_unsigned("col", u32::from(col), COL_BITS)?;
                check_signed("value", value, X_VALUE_BITS)
            }
            Self::StoreY { row, value } | Self::StoreT { row, value } => {
                check_unsigned("row", u32::from(row), ROW_BITS)?;
                check_signed("value", value, WIDE_VALUE_BITS)
            }
            Self::StoreAlpha { value } => check_signed("value", value, WIDE_VALUE_BITS),
            Self::Compute { iteration } => check_unsigned("iteration", iteration, ITERATION_BITS),
        }
    }

    /// Serialize to the accelerator's 32-bit word.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperand`] if an operand exceeds its field.
    pub fn encode(&self) -> Result<Word, EncodeError> {
        self.validate()?;
        let op = self.opcode().word_bits();
        let word = match *self {
            Self::Reset => op,
            Self::StoreX { row, col, value } => {
                op | pack(u32::from(row), ROW_SHIFT, ROW_BITS)
                    | pack(u32::from(col), COL_SHIFT, COL_BITS)
                    | pack(bits_of(value), 0, X_VALUE_BITS)
            }
            Self::StoreY { row, value } | Self::StoreT { row, value } => {
                op | pack(u32::from(row), ROW_SHIFT, ROW_BITS)
                    | pack(bits_of(value), 0, WIDE_VALUE_BITS)
            }
            Self::StoreAlpha { value } => op | pack(bits_of(value), 0, WIDE_VALUE_BITS),
            Self::Compute { iteration } => op | pack(iteration, 0, ITERATION_BITS),
        };
        Ok(word)
    }

    /// Parse a 32-bit word. Don't-care bits are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownOpcode`] for opcode values 6 and 7.
    pub fn decode(word: Word) -> Result<Self, EncodeError> {
        let raw = Opcode::field_of(word);
        let opcode = Opcode::from_value(raw).ok_or(EncodeError::UnknownOpcode { opcode: raw, word })?;

        let insn = match opcode {
            Opcode::Reset => Self::Reset,
            Opcode::StoreX => Self::StoreX {
                row: unpack_index(word, ROW_SHIFT, ROW_BITS),
                col: unpack_index(word, COL_SHIFT, COL_BITS),
                value: sign_extend(word, X_VALUE_BITS),
            },
            Opcode::StoreY => Self::StoreY {
                row: unpack_index(word, ROW_SHIFT, ROW_BITS),
                value: sign_extend(word, WIDE_VALUE_BITS),
            },
            Opcode::StoreT => Self::StoreT {
                row: unpack_index(word, ROW_SHIFT, ROW_BITS),
                value: sign_extend(word, WIDE_VALUE_BITS),
            },
            Opcode::StoreAlpha => Self::StoreAlpha {
                value: sign_extend(word, WIDE_VALUE_BITS),
            },
            Opcode::Compute => Self::Compute {
                iteration: word & mask(ITERATION_BITS),
            },
        };
        Ok(insn)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Reset => write!(f, "reset coprocessor registers and state"),
            Self::StoreX { row, col, value } => {
                write!(f, "stored X[{row}][{col}] = {:#010x} = {value}", bits_of(value))
            }
            Self::StoreY { row, value } => {
                write!(f, "stored Y[{row}] = {:#010x} = {value}", bits_of(value))
            }
            Self::StoreT { row, value } => {
                write!(f, "stored T[{row}] = {:#010x} = {value}", bits_of(value))
            }
            Self::StoreAlpha { value } => {
                write!(f, "stored alpha = {:#010x} = {value}", bits_of(value))
            }
            Self::Compute { iteration } => {
                write!(f, "issued iteration {iteration} of gradient descent")
            }
        }
    }
}

fn check_unsigned(field: &'static str, value: u32, bits: u32) -> Result<(), EncodeError> {
    if value > mask(bits) {
        return Err(EncodeError::InvalidOperand {
            field,
            bits,
            value: i64::from(value),
        });
    }
    Ok(())
}

fn check_signed(field: &'static str, value: i32, bits: u32) -> Result<(), EncodeError> {
    let (min, max) = signed_range(bits);
    if value < min || value > max {
        return Err(EncodeError::InvalidOperand {
            field,
            bits,
            value: i64::from(value),
        });
    }
    Ok(())
}

#[allow(clippy::cast_sign_loss)]
const fn bits_of(value: i32) -> u32 {
    value as u32
}

const fn pack(value: u32, shift: u32, bits: u32) -> u32 {
    (value << shift) & field_mask(shift, bits)
}

#[allow(clippy::cast_possible_truncation)]
const fn unpack_index(word: u32, shift: u32, bits: u32) -> u8 {
    ((word >> shift) & mask(bits)) as u8
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Wire model for the gradient-descent linear regression accelerator.
//!
//! This crate has **no hardware access**. It is a pure model of the
//! accelerator's command contract: opcodes, operand field layout, the typed
//! instruction set, the fixed-point scalar format, and the timer constants
//! used for elapsed-time estimation.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`opcode`] | 3-bit opcode values carried in bits \[31:29\] |
//! | [`layout`] | Operand field shifts, widths and masks |
//! | [`instruction`] | Typed [`Instruction`] enum, range-checked encode / decode |
//! | [`fixed`] | Power-of-two fixed-point scale shared with the accelerator |
//! | [`timer`] | Tick period constants of the observed timer configuration |
//!
//! # Word format
//!
//! ```text
//!  31   29 28   26 25   23 22                                   0
//! ┌───────┬───────┬───────┬──────────────────────────────────────┐
//! │opcode │  row  │  col  │ value (23)                           │  STORE_X
//! ├───────┼───────┼───────┴──────────────────────────────────────┤
//! │opcode │  row  │ value (26)                                   │  STORE_Y / STORE_T
//! ├───────┼───────┼──────────────────────────────────────────────┤
//! │opcode │ 0 0 0 │ value (26)                                   │  STORE_ALPHA
//! ├───────┼───────┴──────────────────────────────────────────────┤
//! │opcode │ iteration (29)                                       │  COMPUTE
//! ├───────┼──────────────────────────────────────────────────────┤
//! │opcode │ 0 (don't care)                                       │  RESET
//! └───────┴──────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fixed;
pub mod instruction;
pub mod layout;
pub mod opcode;
pub mod timer;

pub use fixed::FixedScale;
pub use instruction::{EncodeError, Instruction, Word};
pub use opcode::Opcode;

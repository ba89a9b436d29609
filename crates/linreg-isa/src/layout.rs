// SPDX-License-Identifier: AGPL-3.0-only

//! Operand field layout of a 32-bit instruction word.
//!
//! Shifts and widths below are the accelerator decoder's, bit for bit.
//!
//! ```text
//! opcode  [31:29]   all instructions
//! row     [28:26]   STORE_X, STORE_Y, STORE_T
//! col     [25:23]   STORE_X
//! value   [22:0]    STORE_X        (signed, 23 bits)
//! value   [25:0]    STORE_Y/T/ALPHA (signed, 26 bits)
//! iter    [28:0]    COMPUTE        (unsigned, 29 bits)
//! ```

/// Width of an instruction word in bits.
pub const WORD_BITS: u32 = 32;

// ── Opcode ───────────────────────────────────────────────────────────────────

/// Opcode field position.
pub const OPCODE_SHIFT: u32 = 29;
/// Opcode field width.
pub const OPCODE_BITS: u32 = 3;

// ── Index fields ─────────────────────────────────────────────────────────────

/// Row index position (X row, Y / theta element).
pub const ROW_SHIFT: u32 = 26;
/// Row index width.
pub const ROW_BITS: u32 = 3;
/// Column index position (X only).
pub const COL_SHIFT: u32 = 23;
/// Column index width.
pub const COL_BITS: u32 = 3;

// ── Value fields ─────────────────────────────────────────────────────────────

/// STORE_X value width.
pub const X_VALUE_BITS: u32 = 23;
/// STORE_Y / STORE_T / STORE_ALPHA value width.
pub const WIDE_VALUE_BITS: u32 = 26;
/// COMPUTE iteration width.
pub const ITERATION_BITS: u32 = 29;

/// Highest addressable row (and theta element).
#[allow(clippy::cast_possible_truncation)]
pub const MAX_ROW: u8 = mask(ROW_BITS) as u8;
/// Highest addressable X column.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_COL: u8 = mask(COL_BITS) as u8;
/// Highest encodable iteration number.
pub const MAX_ITERATION: u32 = mask(ITERATION_BITS);

/// Low-bit mask of the given width.
#[must_use]
pub const fn mask(bits: u32) -> u32 {
    if bits >= WORD_BITS {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Mask already shifted into field position.
#[must_use]
pub const fn field_mask(shift: u32, bits: u32) -> u32 {
    mask(bits) << shift
}

/// Inclusive range of a two's-complement field of `bits` width.
#[must_use]
pub const fn signed_range(bits: u32) -> (i32, i32) {
    let half = 1_i32 << (bits - 1);
    (-half, half - 1)
}

/// Sign-extend the low `bits` of `raw`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend(raw: u32, bits: u32) -> i32 {
    let unused = WORD_BITS - bits;
    ((raw << unused) as i32) >> unused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_match_decoder() {
        assert_eq!(mask(X_VALUE_BITS), 0x007F_FFFF);
        assert_eq!(mask(WIDE_VALUE_BITS), 0x03FF_FFFF);
        assert_eq!(field_mask(COL_SHIFT, COL_BITS), 0x0380_0000);
        assert_eq!(field_mask(ROW_SHIFT, ROW_BITS), 0x1C00_0000);
        assert_eq!(field_mask(OPCODE_SHIFT, OPCODE_BITS), 0xE000_0000);
    }

    #[test]
    fn fields_tile_the_word() {
        let x_word = field_mask(OPCODE_SHIFT, OPCODE_BITS)
            | field_mask(ROW_SHIFT, ROW_BITS)
            | field_mask(COL_SHIFT, COL_BITS)
            | mask(X_VALUE_BITS);
        assert_eq!(x_word, u32::MAX);
        assert_eq!(field_mask(OPCODE_SHIFT, OPCODE_BITS) & mask(ITERATION_BITS), 0);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0x007F_FFFF, X_VALUE_BITS), -1);
        assert_eq!(sign_extend(0x003F_FFFF, X_VALUE_BITS), 0x003F_FFFF);
        assert_eq!(sign_extend(0x0200_0000, WIDE_VALUE_BITS), -(1 << 25));
        assert_eq!(signed_range(X_VALUE_BITS), (-(1 << 22), (1 << 22) - 1));
    }
}

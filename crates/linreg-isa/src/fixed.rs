// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-point scalar format shared by host and accelerator.
//!
//! A real value `r` travels as the integer `trunc(r × 2^shift)`. The scale is
//! a process-wide constant that both sides must agree on; the accelerator in
//! the observed configuration uses `2^11 = 2048`.

/// Scale factor of the observed configuration.
pub const DEFAULT_SCALING_FACTOR: u32 = 2048;

/// Power-of-two fixed-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedScale {
    shift: u32,
}

impl FixedScale {
    /// Scale of `2^shift`.
    ///
    /// Returns `None` when `shift` leaves no integer bits in an `i32`.
    #[must_use]
    pub const fn from_shift(shift: u32) -> Option<Self> {
        if shift >= 31 {
            None
        } else {
            Some(Self { shift })
        }
    }

    /// Scale from a factor such as `2048`. Only powers of two are accepted.
    #[must_use]
    pub const fn from_factor(factor: u32) -> Option<Self> {
        if !factor.is_power_of_two() {
            return None;
        }
        Self::from_shift(factor.trailing_zeros())
    }

    /// Binary point position.
    #[must_use]
    pub const fn shift(self) -> u32 {
        self.shift
    }

    /// Scale factor (`1.0` in fixed point).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn one(self) -> i32 {
        (1_u32 << self.shift) as i32
    }

    /// Convert a real value, truncating toward zero.
    ///
    /// Values outside the `i32` range saturate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_fixed(self, real: f64) -> i32 {
        (real * f64::from(self.one())) as i32
    }

    /// Convert back to a real value.
    #[must_use]
    pub fn to_real(self, fixed: i32) -> f64 {
        f64::from(fixed) / f64::from(self.one())
    }

    /// Fixed-point product, rescaled.
    ///
    /// The product is formed in `i128`; a rescaled result outside `i64`
    /// saturates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
    pub const fn mul(self, a: i64, b: i64) -> i64 {
        let product = (a as i128 * b as i128) >> self.shift;
        if product > i64::MAX as i128 {
            i64::MAX
        } else if product < i64::MIN as i128 {
            i64::MIN
        } else {
            product as i64
        }
    }
}

impl Default for FixedScale {
    fn default() -> Self {
        Self { shift: DEFAULT_SCALING_FACTOR.trailing_zeros() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_2048() {
        let s = FixedScale::default();
        assert_eq!(s.shift(), 11);
        assert_eq!(s.one(), 2048);
    }

    #[test]
    fn factor_must_be_power_of_two() {
        assert!(FixedScale::from_factor(1000).is_none());
        assert!(FixedScale::from_factor(0).is_none());
        assert_eq!(FixedScale::from_factor(4096).map(FixedScale::shift), Some(12));
        assert!(FixedScale::from_shift(31).is_none());
    }

    #[test]
    fn conversion_truncates_toward_zero() {
        let s = FixedScale::default();
        // 2.34 × 2048 = 4792.32
        assert_eq!(s.to_fixed(2.34), 4792);
        // 0.01 × 2048 = 20.48
        assert_eq!(s.to_fixed(0.01), 20);
        assert_eq!(s.to_fixed(-0.01), -20);
        assert!((s.to_real(3072) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn product_rescales() {
        let s = FixedScale::default();
        // 1.5 × 2.0 = 3.0
        assert_eq!(s.mul(3072, 4096), 6144);
        assert_eq!(s.mul(-3072, 4096), -6144);
    }

    #[test]
    fn product_saturates_instead_of_overflowing() {
        let s = FixedScale::default();
        // (2^40 × 2^40) >> 11 = 2^69, beyond i64
        assert_eq!(s.mul(1 << 40, 1 << 40), i64::MAX);
        assert_eq!(s.mul(-(1 << 40), 1 << 40), i64::MIN);
        assert_eq!(s.mul(i64::MAX, 2048), i64::MAX);
        // Wide intermediate, in-range result
        assert_eq!(s.mul(1 << 40, 1 << 20), 1 << 49);
    }
}

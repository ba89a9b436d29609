// SPDX-License-Identifier: AGPL-3.0-only

//! Convergence predicate
//!
//! The threshold is absolute and expressed in fixed-point units: with the
//! default scale and threshold 1, every theta component must move by at most
//! 1/2048 between two iterations.

/// True iff `|new[i] − old[i]| ≤ threshold` for every `i` in `0..length`.
///
/// A single component over the threshold vetoes the whole vector. Components
/// beyond the end of either slice are not compared.
pub fn has_converged(new: &[i32], old: &[i32], length: usize, threshold: u32) -> bool {
    new.iter()
        .zip(old)
        .take(length)
        .all(|(&a, &b)| distance(a, b) <= u64::from(threshold))
}

/// Largest component-wise distance over the first `length` components.
pub fn max_deviation(new: &[i32], old: &[i32], length: usize) -> u64 {
    new.iter()
        .zip(old)
        .take(length)
        .map(|(&a, &b)| distance(a, b))
        .max()
        .unwrap_or(0)
}

fn distance(a: i32, b: i32) -> u64 {
    (i64::from(a) - i64::from(b)).unsigned_abs()
}

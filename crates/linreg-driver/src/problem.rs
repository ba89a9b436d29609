// SPDX-License-Identifier: AGPL-3.0-only

//! Regression problem data and the fitted model
//!
//! All values are fixed-point at the scale shared with the accelerator. The
//! instruction set addresses at most 8 rows and 8 columns.

use crate::error::{LinregError, Result};
use linreg_isa::layout::{MAX_COL, MAX_ROW};
use linreg_isa::FixedScale;

/// Rows addressable by the 3-bit row field
pub const MAX_EXAMPLES: usize = MAX_ROW as usize + 1;
/// Columns addressable by the 3-bit column field
pub const MAX_FEATURES: usize = MAX_COL as usize + 1;

/// Training set, initial theta and learning rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// M × N, row-major; column 0 is the bias column
    x: Vec<Vec<i32>>,
    /// M targets
    y: Vec<i32>,
    /// N initial parameters
    theta: Vec<i32>,
    alpha: i32,
}

impl Problem {
    /// Build a problem from fixed-point data
    ///
    /// # Errors
    ///
    /// Returns error if the shapes disagree or exceed what the instruction
    /// set can address.
    pub fn new(x: Vec<Vec<i32>>, y: Vec<i32>, theta: Vec<i32>, alpha: i32) -> Result<Self> {
        let m = x.len();
        let n = theta.len();

        if m == 0 || n == 0 {
            return Err(LinregError::invalid_problem("need at least one example and one feature"));
        }
        if m > MAX_EXAMPLES {
            return Err(LinregError::invalid_problem(format!(
                "{m} examples exceed the {MAX_EXAMPLES} addressable rows"
            )));
        }
        if n > MAX_FEATURES {
            return Err(LinregError::invalid_problem(format!(
                "{n} features exceed the {MAX_FEATURES} addressable columns"
            )));
        }
        if let Some((i, row)) = x.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(LinregError::invalid_problem(format!(
                "X row {i} has {} columns, theta has {n}",
                row.len()
            )));
        }
        if y.len() != m {
            return Err(LinregError::invalid_problem(format!(
                "Y has {} entries, X has {m} rows",
                y.len()
            )));
        }

        Ok(Self { x, y, theta, alpha })
    }

    /// Build a problem from real values at `scale` (truncating toward zero)
    ///
    /// # Errors
    ///
    /// Same shape rules as [`Problem::new`].
    pub fn from_real(
        x: &[Vec<f64>],
        y: &[f64],
        theta: &[f64],
        alpha: f64,
        scale: FixedScale,
    ) -> Result<Self> {
        let fix = |v: &[f64]| v.iter().map(|&r| scale.to_fixed(r)).collect::<Vec<_>>();
        Self::new(
            x.iter().map(|row| fix(row.as_slice())).collect(),
            fix(y),
            fix(theta),
            scale.to_fixed(alpha),
        )
    }

    /// Six noisy samples of one feature plus bias, scale 2048.
    ///
    /// Initial theta `[1.01, 2.02]`, learning rate `0.01`.
    pub fn reference() -> Self {
        Self::reference_at(FixedScale::default())
    }

    /// The reference problem quantized at `s`.
    pub fn reference_at(s: FixedScale) -> Self {
        let x: [f64; 6] = [2.34, 3.77, 4.54, 5.81, 6.12, 5.01];
        let y: [f64; 6] = [4.12, 3.04, 3.19, 6.35, 4.73, 6.77];
        Self {
            x: x.iter().map(|&f| vec![s.one(), s.to_fixed(f)]).collect(),
            y: y.iter().map(|&v| s.to_fixed(v)).collect(),
            theta: vec![s.to_fixed(1.01), s.to_fixed(2.02)],
            alpha: s.to_fixed(0.01),
        }
    }

    /// Number of training examples (M)
    pub fn m(&self) -> usize {
        self.x.len()
    }

    /// Number of features (N)
    pub fn n(&self) -> usize {
        self.theta.len()
    }

    /// Design matrix rows
    pub fn x(&self) -> &[Vec<i32>] {
        &self.x
    }

    /// Targets
    pub fn y(&self) -> &[i32] {
        &self.y
    }

    /// Initial theta
    pub fn theta(&self) -> &[i32] {
        &self.theta
    }

    /// Learning rate
    pub const fn alpha(&self) -> i32 {
        self.alpha
    }

    /// Mean squared error of `theta` over the training set, in real units
    pub fn mse(&self, theta: &[i32], scale: FixedScale) -> f64 {
        let total: f64 = self
            .x
            .iter()
            .zip(&self.y)
            .map(|(row, &y)| {
                let h: f64 = row
                    .iter()
                    .zip(theta)
                    .map(|(&x, &t)| scale.to_real(x) * scale.to_real(t))
                    .sum();
                (h - scale.to_real(y)).powi(2)
            })
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let m = self.m() as f64;
        total / m
    }
}

/// Polynomial model `y = Σ t_k·x^k` over a fitted theta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    theta: Vec<i32>,
}

impl Model {
    /// Wrap a fixed-point theta
    pub fn new(theta: Vec<i32>) -> Self {
        Self { theta }
    }

    /// Fixed-point coefficients
    pub fn theta(&self) -> &[i32] {
        &self.theta
    }

    /// Coefficients in real units
    pub fn coefficients(&self, scale: FixedScale) -> Vec<f64> {
        self.theta.iter().map(|&t| scale.to_real(t)).collect()
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "y = ")?;
        for (k, t) in self.theta.iter().enumerate() {
            if k > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{t}*x^{k}")?;
        }
        Ok(())
    }
}

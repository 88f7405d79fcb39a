//! Piecewise cubic Hermite models
//!
//! Models arrive pre-fitted from the provider: knot positions `x`, values `y`
//! and tangents `m`, plus the fitted domain `[x0, x1]` (which may be given in
//! either order). Evaluation clamps into the domain and then into the knot
//! range, so out-of-domain queries return the boundary value.

use serde::{Deserialize, Serialize};

/// A pre-fitted piecewise cubic Hermite model
///
/// Malformed payloads (missing arrays, mismatched lengths) deserialize fine
/// and evaluate to NaN, which callers treat as "no value here".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseModel {
    /// Strictly increasing knot positions
    #[serde(default)]
    pub x: Vec<f64>,
    /// Values at the knots
    #[serde(default)]
    pub y: Vec<f64>,
    /// Tangents (dy/dx) at the knots
    #[serde(default)]
    pub m: Vec<f64>,
    /// Domain bound (not necessarily the lower one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x0: Option<f64>,
    /// Domain bound (not necessarily the upper one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
}

impl PiecewiseModel {
    /// Build a model whose domain is its knot range
    pub fn new(x: Vec<f64>, y: Vec<f64>, m: Vec<f64>) -> Self {
        let x0 = x.first().copied();
        let x1 = x.last().copied();
        Self { x, y, m, x0, x1 }
    }

    /// Override the fitted domain bounds
    pub fn with_domain(mut self, x0: f64, x1: f64) -> Self {
        self.x0 = Some(x0);
        self.x1 = Some(x1);
        self
    }

    /// Number of knots, or `None` if the arrays disagree
    pub fn knot_count(&self) -> Option<usize> {
        let n = self.x.len();
        (self.y.len() == n && self.m.len() == n).then_some(n)
    }

    /// True when the model has at least one knot and consistent arrays
    pub fn is_well_formed(&self) -> bool {
        matches!(self.knot_count(), Some(n) if n >= 1)
    }

    /// The declared domain `(min(x0,x1), max(x0,x1))`
    ///
    /// Returns `None` when either bound is missing or not finite.
    pub fn domain(&self) -> Option<(f64, f64)> {
        match (self.x0, self.x1) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((a.min(b), a.max(b))),
            _ => None,
        }
    }

    /// Clamp a query into the declared domain (no-op without one)
    pub fn clamp_to_domain(&self, x: f64) -> f64 {
        match self.domain() {
            Some((lo, hi)) => clamp(x, lo, hi),
            None => x,
        }
    }

    /// Evaluate the model at `x`
    ///
    /// Returns NaN for malformed or empty models and for NaN queries. A single
    /// knot model is constant.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = match self.knot_count() {
            Some(n) if n > 0 => n,
            _ => return f64::NAN,
        };
        if x.is_nan() {
            return f64::NAN;
        }
        if n == 1 {
            return self.y[0];
        }

        let xv = clamp(self.clamp_to_domain(x), self.x[0], self.x[n - 1]);
        let i = self.interval(xv);

        let (xa, xb) = (self.x[i], self.x[i + 1]);
        let width = xb - xa;
        let h = if width == 0.0 { 1.0 } else { width };
        let t = (xv - xa) / h;

        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.y[i] + h10 * self.m[i] * h + h01 * self.y[i + 1] + h11 * self.m[i + 1] * h
    }

    /// Index `i` of the knot interval with `x[i] <= xv <= x[i+1]`
    ///
    /// Requires at least two knots.
    fn interval(&self, xv: f64) -> usize {
        let n = self.x.len();
        let after = self.x.partition_point(|&k| k <= xv);
        after.saturating_sub(1).min(n - 2)
    }
}

/// `f64::clamp` without the panic on inverted or NaN bounds
#[inline]
fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Monotone three-knot curve used across the evaluator tests
    fn sample_model() -> PiecewiseModel {
        PiecewiseModel::new(
            vec![0.0, 1000.0, 2000.0],
            vec![0.0, 50.0, 80.0],
            vec![0.06, 0.04, 0.02],
        )
    }

    #[test]
    fn test_exact_at_knots() {
        let model = sample_model();
        for (x, y) in model.x.iter().zip(model.y.iter()) {
            assert_relative_eq!(model.evaluate(*x), *y, epsilon = 1e-9);
        }
        assert_relative_eq!(model.evaluate(1000.0), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_between_knots_is_bounded_for_monotone_data() {
        let model = sample_model();
        let v = model.evaluate(1500.0);
        assert!(v > 50.0 && v < 80.0, "got {}", v);
    }

    #[test]
    fn test_out_of_domain_returns_boundary_value() {
        let model = sample_model().with_domain(1800.0, 200.0);
        assert_relative_eq!(model.evaluate(-50.0), model.evaluate(200.0), epsilon = 1e-12);
        assert_relative_eq!(model.evaluate(5000.0), model.evaluate(1800.0), epsilon = 1e-12);
    }

    #[test]
    fn test_clamps_to_knot_range_without_domain() {
        let mut model = sample_model();
        model.x0 = None;
        model.x1 = None;
        assert_relative_eq!(model.evaluate(-10.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(model.evaluate(99_999.0), 80.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_models() {
        assert!(PiecewiseModel::default().evaluate(1.0).is_nan());

        let single = PiecewiseModel::new(vec![5.0], vec![42.0], vec![0.0]);
        assert_eq!(single.evaluate(-100.0), 42.0);
        assert_eq!(single.evaluate(100.0), 42.0);

        let mismatched = PiecewiseModel::new(vec![0.0, 1.0], vec![1.0], vec![0.0, 0.0]);
        assert!(!mismatched.is_well_formed());
        assert!(mismatched.evaluate(0.5).is_nan());

        assert!(sample_model().evaluate(f64::NAN).is_nan());
    }

    #[test]
    fn test_zero_width_interval_does_not_divide_by_zero() {
        let model = PiecewiseModel::new(vec![0.0, 1.0, 1.0, 2.0], vec![0.0, 1.0, 1.0, 2.0], vec![1.0; 4]);
        assert!(model.evaluate(1.0).is_finite());
    }

    #[test]
    fn test_deserialize_missing_arrays_degrades_to_nan() {
        let model: PiecewiseModel = serde_json::from_str(r#"{"x": [0, 1], "x0": 0, "x1": 1}"#).unwrap();
        assert!(model.evaluate(0.5).is_nan());
    }
}

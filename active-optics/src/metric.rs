//! Scalar figures of demerit for optical states.

/// Abstract contract: a scalar demerit of a state vector, lower is better.
/// The controller minimizes this.
pub trait Metric {
    fn evaluate(&self, state: &[f64]) -> f64;
}

/// Plain sum of squared state entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumOfSquares;

impl Metric for SumOfSquares {
    fn evaluate(&self, state: &[f64]) -> f64 {
        state.iter().map(|v| v * v).sum()
    }
}

/// Sum of squares with per-entry weights. Lets the loop penalize hexapod
/// motion and mirror bending on different scales.
#[derive(Debug, Clone)]
pub struct WeightedSumOfSquares {
    weights: Vec<f64>,
}

impl WeightedSumOfSquares {
    pub fn new(weights: Vec<f64>) -> Self {
        assert!(
            !weights.is_empty() && weights.iter().all(|w| *w >= 0.0),
            "weights must be non-negative"
        );
        Self { weights }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Metric for WeightedSumOfSquares {
    fn evaluate(&self, state: &[f64]) -> f64 {
        assert_eq!(state.len(), self.weights.len());
        state
            .iter()
            .zip(&self.weights)
            .map(|(v, w)| w * v * v)
            .sum()
    }
}

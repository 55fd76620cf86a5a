//! # Activation Functions

use crate::tensor::{Matrix, TensorData};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Element-wise activation applied to a layer's combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    /// `f(x) = x`
    #[default]
    Linear,
    /// `f(x) = 1 / (1 + exp(-x))`
    Logistic,
    /// `f(x) = tanh(x)`
    HyperbolicTangent,
    /// `f(x) = max(0, x)`
    RectifiedLinear,
}

impl Activation {
    pub fn apply(&self, x: TensorData) -> TensorData {
        match self {
            Activation::Linear => x,
            Activation::Logistic => 1.0 / (1.0 + (-x).exp()),
            Activation::HyperbolicTangent => x.tanh(),
            Activation::RectifiedLinear => x.max(0.0),
        }
    }

    /// Derivative at `combination`, given the already computed `activation`.
    pub fn derivative(&self, combination: TensorData, activation: TensorData) -> TensorData {
        match self {
            Activation::Linear => 1.0,
            Activation::Logistic => activation * (1.0 - activation),
            Activation::HyperbolicTangent => 1.0 - activation * activation,
            Activation::RectifiedLinear => {
                if combination > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn activate(&self, combinations: &Matrix) -> Matrix {
        combinations.mapv(|x| self.apply(x))
    }

    pub fn derivatives(&self, combinations: &Matrix, activations: &Matrix) -> Matrix {
        Zip::from(combinations)
            .and(activations)
            .map_collect(|&c, &a| self.derivative(c, a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn logistic_derivative_matches_finite_difference() {
        let act = Activation::Logistic;
        let x = 0.3;
        let h = 1e-6;
        let numeric = (act.apply(x + h) - act.apply(x - h)) / (2.0 * h);
        assert_abs_diff_eq!(act.derivative(x, act.apply(x)), numeric, epsilon = 1e-8);
    }

    #[test]
    fn tanh_derivative_matches_finite_difference() {
        let act = Activation::HyperbolicTangent;
        let x = -0.7;
        let h = 1e-6;
        let numeric = (act.apply(x + h) - act.apply(x - h)) / (2.0 * h);
        assert_abs_diff_eq!(act.derivative(x, act.apply(x)), numeric, epsilon = 1e-8);
    }

    #[test]
    fn relu_clips_negative_values() {
        let act = Activation::RectifiedLinear;
        assert_eq!(act.apply(-2.0), 0.0);
        assert_eq!(act.apply(1.5), 1.5);
        assert_eq!(act.derivative(-2.0, 0.0), 0.0);
    }
}

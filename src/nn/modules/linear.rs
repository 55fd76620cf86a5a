//! # Linear Layer Module

use super::activation::Activation;
use crate::tensor::{Matrix, TensorData, TensorError};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Combinations and activations of one layer for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerForward {
    pub combinations: Matrix,
    pub activations: Matrix,
}

/// Dense layer `y = f(x W + b)`.
///
/// The layer owns no parameters. It reads them from a slice of the network's
/// flat parameter vector laid out as `[biases (out), weights (in x out, row-major)]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    in_features: usize,
    out_features: usize,
    activation: Activation,
}

impl Linear {
    /// Creates a new Linear layer.
    ///
    /// # Arguments
    /// * `in_features`: Size of each input sample.
    /// * `out_features`: Number of neurons.
    /// * `activation`: Function applied to the combinations.
    pub fn new(
        in_features: usize,
        out_features: usize,
        activation: Activation,
    ) -> Result<Self, TensorError> {
        if in_features == 0 || out_features == 0 {
            return Err(TensorError::Generic(format!(
                "Linear layer needs non-zero dimensions, got {} -> {}",
                in_features, out_features
            )));
        }
        Ok(Linear {
            in_features,
            out_features,
            activation,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn parameters_count(&self) -> usize {
        self.out_features + self.in_features * self.out_features
    }

    /// Kaiming uniform initialization: every parameter drawn from `U(-k, k)`
    /// with `k = sqrt(1 / in_features)`.
    pub fn init_parameters<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<TensorData> {
        let k = (1.0 / self.in_features as TensorData).sqrt();
        let dist = Uniform::new_inclusive(-k, k);
        (0..self.parameters_count()).map(|_| dist.sample(rng)).collect()
    }

    fn split<'a>(
        &self,
        parameters: &'a [TensorData],
    ) -> Result<(ArrayView1<'a, TensorData>, ArrayView2<'a, TensorData>), TensorError> {
        if parameters.len() != self.parameters_count() {
            return Err(TensorError::length_mismatch(
                self.parameters_count(),
                parameters.len(),
            ));
        }
        let (biases, weights) = parameters.split_at(self.out_features);
        let weights = ArrayView2::from_shape((self.in_features, self.out_features), weights)?;
        Ok((ArrayView1::from(biases), weights))
    }

    /// Forward pass for a batch of `inputs` (one sample per row).
    pub fn forward(
        &self,
        inputs: &Matrix,
        parameters: &[TensorData],
    ) -> Result<LayerForward, TensorError> {
        if inputs.ncols() != self.in_features {
            return Err(TensorError::ShapeMismatch {
                expected: vec![inputs.nrows(), self.in_features],
                got: inputs.shape().to_vec(),
            });
        }
        let (biases, weights) = self.split(parameters)?;
        let combinations = inputs.dot(&weights) + &biases;
        let activations = self.activation.activate(&combinations);
        Ok(LayerForward {
            combinations,
            activations,
        })
    }

    /// Backward pass.
    ///
    /// # Arguments
    /// * `inputs`: The inputs seen in the forward pass.
    /// * `parameters`: This layer's parameter slice.
    /// * `forward`: Output of [`Linear::forward`] for the same inputs.
    /// * `output_deltas`: d(error)/d(activations), one row per sample.
    /// * `gradient`: This layer's slice of the gradient vector, overwritten.
    ///
    /// # Returns
    /// d(error)/d(inputs), which is the previous layer's `output_deltas`.
    pub fn backward(
        &self,
        inputs: &Matrix,
        parameters: &[TensorData],
        forward: &LayerForward,
        output_deltas: &Matrix,
        gradient: &mut [TensorData],
    ) -> Result<Matrix, TensorError> {
        if output_deltas.dim() != forward.activations.dim() {
            return Err(TensorError::ShapeMismatch {
                expected: forward.activations.shape().to_vec(),
                got: output_deltas.shape().to_vec(),
            });
        }
        if gradient.len() != self.parameters_count() {
            return Err(TensorError::length_mismatch(
                self.parameters_count(),
                gradient.len(),
            ));
        }
        let (_, weights) = self.split(parameters)?;

        let deltas = output_deltas
            * &self
                .activation
                .derivatives(&forward.combinations, &forward.activations);

        let (bias_gradient, weight_gradient) = gradient.split_at_mut(self.out_features);
        ArrayViewMut1::from(bias_gradient).assign(&deltas.sum_axis(Axis(0)));
        ArrayViewMut2::from_shape((self.in_features, self.out_features), weight_gradient)?
            .assign(&inputs.t().dot(&deltas));

        Ok(deltas.dot(&weights.t()))
    }
}

//! # Loss Functions
//!
//! A [`LossIndex`] turns a forward pass into an error value and its
//! derivative with respect to the outputs; an optional [`Regularization`]
//! term is added on top to form the loss.
//!
//! [`LossEvaluable`] is the narrow view line searches use: "loss at this
//! parameter vector", with everything else fixed.

use super::{ForwardPropagation, Network};
use crate::data::Batch;
use crate::tensor::{Matrix, TensorData, TensorError, Vector};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Exponent used by [`MinkowskiError`] unless told otherwise.
pub const DEFAULT_MINKOWSKI_PARAMETER: TensorData = 1.5;

// --- Regularization ---

/// Penalty on the parameter values added to the error.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Regularization {
    #[default]
    None,
    /// `weight * sum(|p_i|)`
    L1 { weight: TensorData },
    /// `weight * 0.5 * sum(p_i^2)`
    L2 { weight: TensorData },
}

impl Regularization {
    pub fn value(&self, parameters: &Vector) -> TensorData {
        match *self {
            Regularization::None => 0.0,
            Regularization::L1 { weight } => weight * parameters.iter().map(|p| p.abs()).sum::<TensorData>(),
            Regularization::L2 { weight } => weight * 0.5 * parameters.dot(parameters),
        }
    }

    /// Adds the penalty's gradient to `gradient`.
    pub fn add_gradient(&self, parameters: &Vector, gradient: &mut Vector) {
        match *self {
            Regularization::None => {}
            Regularization::L1 { weight } => {
                gradient.zip_mut_with(parameters, |g, &p| *g += weight * p.signum())
            }
            Regularization::L2 { weight } => gradient.scaled_add(weight, parameters),
        }
    }
}

// --- Back Propagation State ---

/// Error, loss and gradient of the last back-propagated batch.
#[derive(Debug, Clone, Default)]
pub struct BackPropagation {
    /// Error term alone.
    pub error: TensorData,
    /// Error plus regularization.
    pub loss: TensorData,
    pub gradient: Vector,
}

impl BackPropagation {
    pub fn new(parameters_count: usize) -> Self {
        BackPropagation {
            error: 0.0,
            loss: 0.0,
            gradient: Vector::zeros(parameters_count),
        }
    }
}

// --- Core Trait: LossIndex ---

/// Error measure between network outputs and batch targets.
pub trait LossIndex: Debug {
    fn name(&self) -> &'static str;

    /// Error of the outputs stored in `forward`.
    fn calculate_error(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<TensorData, TensorError>;

    /// d(error)/d(outputs), same shape as the outputs.
    fn calculate_output_deltas(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<Matrix, TensorError>;

    fn regularization(&self) -> Regularization {
        Regularization::None
    }

    /// Loss of `batch` at `parameters`. Runs a forward pass into `forward`.
    fn calculate_loss(
        &self,
        network: &dyn Network,
        batch: &Batch,
        parameters: &Vector,
        forward: &mut ForwardPropagation,
    ) -> Result<TensorData, TensorError> {
        network.forward_propagate(batch, parameters, forward)?;
        let error = self.calculate_error(batch, forward)?;
        Ok(error + self.regularization().value(parameters))
    }

    /// Fills `back` with error, loss and gradient for a completed forward pass.
    fn back_propagate(
        &self,
        network: &dyn Network,
        batch: &Batch,
        parameters: &Vector,
        forward: &ForwardPropagation,
        back: &mut BackPropagation,
    ) -> Result<(), TensorError> {
        let error = self.calculate_error(batch, forward)?;
        let deltas = self.calculate_output_deltas(batch, forward)?;
        let mut gradient = network.back_propagate(batch, parameters, forward, &deltas)?;

        let regularization = self.regularization();
        regularization.add_gradient(parameters, &mut gradient);

        back.error = error;
        back.loss = error + regularization.value(parameters);
        back.gradient = gradient;
        Ok(())
    }
}

fn output_errors(batch: &Batch, forward: &ForwardPropagation) -> Result<Matrix, TensorError> {
    let outputs = forward
        .outputs()
        .ok_or_else(|| TensorError::Generic("Forward propagation has no outputs".to_string()))?;
    if outputs.dim() != batch.targets.dim() {
        return Err(TensorError::ShapeMismatch {
            expected: batch.targets.shape().to_vec(),
            got: outputs.shape().to_vec(),
        });
    }
    Ok(outputs - &batch.targets)
}

fn samples_of(batch: &Batch) -> Result<TensorData, TensorError> {
    match batch.samples_number() {
        0 => Err(TensorError::Generic("Cannot average over an empty batch".to_string())),
        n => Ok(n as TensorData),
    }
}

// --- Error Terms ---

/// `sum((y - t)^2) / N`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeanSquaredError {
    pub regularization: Regularization,
}

impl MeanSquaredError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regularization(mut self, regularization: Regularization) -> Self {
        self.regularization = regularization;
        self
    }
}

impl LossIndex for MeanSquaredError {
    fn name(&self) -> &'static str {
        "MEAN_SQUARED_ERROR"
    }

    fn calculate_error(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<TensorData, TensorError> {
        let errors = output_errors(batch, forward)?;
        Ok(errors.iter().map(|e| e * e).sum::<TensorData>() / samples_of(batch)?)
    }

    fn calculate_output_deltas(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<Matrix, TensorError> {
        let errors = output_errors(batch, forward)?;
        let coefficient = 2.0 / samples_of(batch)?;
        Ok(errors * coefficient)
    }

    fn regularization(&self) -> Regularization {
        self.regularization
    }
}

/// `sum((y - t)^2)`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SumSquaredError {
    pub regularization: Regularization,
}

impl SumSquaredError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LossIndex for SumSquaredError {
    fn name(&self) -> &'static str {
        "SUM_SQUARED_ERROR"
    }

    fn calculate_error(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<TensorData, TensorError> {
        let errors = output_errors(batch, forward)?;
        Ok(errors.iter().map(|e| e * e).sum())
    }

    fn calculate_output_deltas(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<Matrix, TensorError> {
        Ok(output_errors(batch, forward)? * 2.0)
    }

    fn regularization(&self) -> Regularization {
        self.regularization
    }
}

/// `(sum(|y - t|^p))^(1/p) / N`
///
/// Less sensitive to outliers than the squared errors for `1 <= p < 2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinkowskiError {
    minkowski_parameter: TensorData,
    pub regularization: Regularization,
}

impl Default for MinkowskiError {
    fn default() -> Self {
        MinkowskiError {
            minkowski_parameter: DEFAULT_MINKOWSKI_PARAMETER,
            regularization: Regularization::None,
        }
    }
}

impl MinkowskiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `TensorError::Generic` unless `1 <= p <= 2`.
    pub fn with_minkowski_parameter(mut self, p: TensorData) -> Result<Self, TensorError> {
        if !(1.0..=2.0).contains(&p) {
            return Err(TensorError::Generic(format!(
                "Minkowski parameter must be between 1 and 2, got {}",
                p
            )));
        }
        self.minkowski_parameter = p;
        Ok(self)
    }

    pub fn minkowski_parameter(&self) -> TensorData {
        self.minkowski_parameter
    }

    fn norm(&self, errors: &Matrix) -> TensorData {
        let p = self.minkowski_parameter;
        errors
            .iter()
            .map(|e| e.abs().powf(p))
            .sum::<TensorData>()
            .powf(1.0 / p)
    }
}

impl LossIndex for MinkowskiError {
    fn name(&self) -> &'static str {
        "MINKOWSKI_ERROR"
    }

    fn calculate_error(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<TensorData, TensorError> {
        let errors = output_errors(batch, forward)?;
        Ok(self.norm(&errors) / samples_of(batch)?)
    }

    fn calculate_output_deltas(&self, batch: &Batch, forward: &ForwardPropagation) -> Result<Matrix, TensorError> {
        let errors = output_errors(batch, forward)?;
        let samples = samples_of(batch)?;
        let norm = self.norm(&errors);
        if norm == 0.0 {
            return Ok(Matrix::zeros(errors.dim()));
        }
        let p = self.minkowski_parameter;
        let coefficient = norm.powf(1.0 - p) / samples;
        Ok(errors.mapv(|e| e.signum() * e.abs().powf(p - 1.0) * coefficient))
    }

    fn regularization(&self) -> Regularization {
        self.regularization
    }
}

// --- Loss Along A Line ---

/// Scalar loss as a function of the parameter vector.
pub trait LossEvaluable {
    fn evaluate(&mut self, parameters: &Vector) -> Result<TensorData, TensorError>;
}

/// Loss of one fixed batch, reusing a forward-propagation buffer.
#[derive(Debug)]
pub struct BatchLoss<'a> {
    network: &'a dyn Network,
    loss_index: &'a dyn LossIndex,
    batch: &'a Batch,
    forward: ForwardPropagation,
}

impl<'a> BatchLoss<'a> {
    pub fn new(network: &'a dyn Network, loss_index: &'a dyn LossIndex, batch: &'a Batch) -> Self {
        BatchLoss {
            network,
            loss_index,
            batch,
            forward: ForwardPropagation::new(),
        }
    }
}

impl LossEvaluable for BatchLoss<'_> {
    fn evaluate(&mut self, parameters: &Vector) -> Result<TensorData, TensorError> {
        self.loss_index
            .calculate_loss(self.network, self.batch, parameters, &mut self.forward)
    }
}

/// Adapts a closure to [`LossEvaluable`].
pub struct FnLoss<F>(pub F);

impl<F> LossEvaluable for FnLoss<F>
where
    F: FnMut(&Vector) -> TensorData,
{
    fn evaluate(&mut self, parameters: &Vector) -> Result<TensorData, TensorError> {
        Ok((self.0)(parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, Linear, NeuralNetwork};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn forward_with_outputs(outputs: Matrix) -> ForwardPropagation {
        ForwardPropagation {
            layers: vec![crate::nn::LayerForward {
                combinations: outputs.clone(),
                activations: outputs,
            }],
        }
    }

    #[test]
    fn mean_squared_error_averages_over_samples() {
        let batch = Batch::new(array![[0.0], [0.0]], array![[1.0], [0.0]]).unwrap();
        let forward = forward_with_outputs(array![[3.0], [1.0]]);
        // (4 + 1) / 2
        assert_abs_diff_eq!(MeanSquaredError::new().calculate_error(&batch, &forward).unwrap(), 2.5);
        assert_abs_diff_eq!(SumSquaredError::new().calculate_error(&batch, &forward).unwrap(), 5.0);
    }

    #[test]
    fn minkowski_default_parameter_is_one_and_a_half() {
        assert_eq!(MinkowskiError::new().minkowski_parameter(), 1.5);
        assert!(MinkowskiError::new().with_minkowski_parameter(0.5).is_err());
    }

    #[test]
    fn minkowski_deltas_match_finite_differences() {
        let loss = MinkowskiError::new();
        let targets = array![[0.5, -1.0], [2.0, 0.0]];
        let batch = Batch::new(Matrix::zeros((2, 1)), targets).unwrap();
        let outputs = array![[1.0, 0.5], [1.0, -0.3]];

        let deltas = loss
            .calculate_output_deltas(&batch, &forward_with_outputs(outputs.clone()))
            .unwrap();
        let h = 1e-6;
        for ((i, j), delta) in deltas.indexed_iter() {
            let mut plus = outputs.clone();
            let mut minus = outputs.clone();
            plus[[i, j]] += h;
            minus[[i, j]] -= h;
            let numeric = (loss.calculate_error(&batch, &forward_with_outputs(plus)).unwrap()
                - loss.calculate_error(&batch, &forward_with_outputs(minus)).unwrap())
                / (2.0 * h);
            assert_abs_diff_eq!(*delta, numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn regularization_adds_to_loss_and_gradient() {
        let layers = vec![Linear::new(1, 1, Activation::Linear).unwrap()];
        let network = NeuralNetwork::from_parts(layers, array![1.0, 2.0]).unwrap();
        let batch = Batch::new(array![[1.0]], array![[3.0]]).unwrap();
        let parameters = network.parameters();

        let plain = MeanSquaredError::new();
        let penalized = MeanSquaredError::new().with_regularization(Regularization::L2 { weight: 0.1 });

        let mut forward = ForwardPropagation::new();
        network.forward_propagate(&batch, &parameters, &mut forward).unwrap();

        let mut back_plain = BackPropagation::new(2);
        plain.back_propagate(&network, &batch, &parameters, &forward, &mut back_plain).unwrap();
        let mut back_penalized = BackPropagation::new(2);
        penalized.back_propagate(&network, &batch, &parameters, &forward, &mut back_penalized).unwrap();

        // output 3 equals target: zero error
        assert_abs_diff_eq!(back_plain.loss, 0.0);
        assert_abs_diff_eq!(back_penalized.error, 0.0);
        assert_abs_diff_eq!(back_penalized.loss, 0.1 * 0.5 * 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(back_penalized.gradient[1], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn batch_loss_evaluates_at_candidate_parameters() {
        let layers = vec![Linear::new(1, 1, Activation::Linear).unwrap()];
        let network = NeuralNetwork::from_parts(layers, array![0.0, 0.0]).unwrap();
        let batch = Batch::new(array![[1.0], [2.0]], array![[1.0], [2.0]]).unwrap();
        let mse = MeanSquaredError::new();

        let mut line = BatchLoss::new(&network, &mse, &batch);
        assert_abs_diff_eq!(line.evaluate(&array![0.0, 1.0]).unwrap(), 0.0);
        assert_abs_diff_eq!(line.evaluate(&array![0.0, 0.0]).unwrap(), 2.5);
    }
}

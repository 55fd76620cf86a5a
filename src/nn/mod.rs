//! # Neural Network Module (`nn`)
//!
//! The trainable model seen by the optimizers. A [`Network`] exposes its
//! parameters as one flat vector and can evaluate (and differentiate) itself at
//! any candidate parameter vector, which is what line searches need.

use crate::data::Batch;
use crate::tensor::{Matrix, TensorData, TensorError, Vector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

// --- Submodules ---
pub mod loss;
pub mod modules;

pub use loss::*;
pub use modules::*;

// --- Core Trait: Network ---

/// Per-layer intermediate values of one forward pass.
#[derive(Debug, Clone, Default)]
pub struct ForwardPropagation {
    pub layers: Vec<LayerForward>,
}

impl ForwardPropagation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activations of the last layer.
    pub fn outputs(&self) -> Option<&Matrix> {
        self.layers.last().map(|layer| &layer.activations)
    }
}

/// A differentiable model with a flat parameter vector.
pub trait Network: Debug {
    fn parameters_count(&self) -> usize;

    /// Copy of the current parameters.
    fn parameters(&self) -> Vector;

    /// Replaces the parameters.
    ///
    /// # Errors
    /// `TensorError::ShapeMismatch` if `parameters` has the wrong length.
    fn set_parameters(&mut self, parameters: &Vector) -> Result<(), TensorError>;

    fn inputs_number(&self) -> usize;

    fn outputs_number(&self) -> usize;

    /// Forward pass of `batch` at `parameters` (not necessarily the stored
    /// ones). Overwrites `forward`.
    fn forward_propagate(
        &self,
        batch: &Batch,
        parameters: &Vector,
        forward: &mut ForwardPropagation,
    ) -> Result<(), TensorError>;

    /// Gradient of the error with respect to the parameters, given the
    /// derivative of the error with respect to the outputs.
    fn back_propagate(
        &self,
        batch: &Batch,
        parameters: &Vector,
        forward: &ForwardPropagation,
        output_deltas: &Matrix,
    ) -> Result<Vector, TensorError>;
}

// --- Container: NeuralNetwork ---

/// Stack of dense layers sharing one parameter vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    layers: Vec<Linear>,
    parameters: Vector,
}

impl NeuralNetwork {
    /// Builds a multilayer perceptron.
    ///
    /// # Arguments
    /// * `architecture`: Neurons per layer, inputs first, e.g. `[2, 4, 1]`.
    /// * `hidden`: Activation of every hidden layer.
    /// * `output`: Activation of the output layer.
    /// * `seed`: Seed for the parameter initialization; `None` draws from entropy.
    pub fn new(
        architecture: &[usize],
        hidden: Activation,
        output: Activation,
        seed: Option<u64>,
    ) -> Result<Self, TensorError> {
        if architecture.len() < 2 {
            return Err(TensorError::Generic(
                "Architecture needs at least an input and an output size".to_string(),
            ));
        }
        let last = architecture.len() - 2;
        let layers = architecture
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i == last { output } else { hidden };
                Linear::new(pair[0], pair[1], activation)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let parameters = layers
            .iter()
            .flat_map(|layer| layer.init_parameters(&mut rng))
            .collect::<Vector>();

        Ok(NeuralNetwork { layers, parameters })
    }

    /// Network with explicit layers and parameters.
    pub fn from_parts(layers: Vec<Linear>, parameters: Vector) -> Result<Self, TensorError> {
        let expected: usize = layers.iter().map(Linear::parameters_count).sum();
        if parameters.len() != expected {
            return Err(TensorError::length_mismatch(expected, parameters.len()));
        }
        for pair in layers.windows(2) {
            if pair[0].out_features() != pair[1].in_features() {
                return Err(TensorError::Generic(format!(
                    "Layer with {} outputs cannot feed a layer with {} inputs",
                    pair[0].out_features(),
                    pair[1].in_features()
                )));
            }
        }
        Ok(NeuralNetwork { layers, parameters })
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    /// Outputs for `inputs` at the stored parameters.
    pub fn calculate_outputs(&self, inputs: &Matrix) -> Result<Matrix, TensorError> {
        let mut current = inputs.clone();
        let parameters = slice_of(&self.parameters)?;
        let mut offset = 0;
        for layer in &self.layers {
            let count = layer.parameters_count();
            current = layer
                .forward(&current, &parameters[offset..offset + count])?
                .activations;
            offset += count;
        }
        Ok(current)
    }
}

fn slice_of(vector: &Vector) -> Result<&[TensorData], TensorError> {
    vector
        .as_slice()
        .ok_or_else(|| TensorError::Generic("Parameter vector is not contiguous".to_string()))
}

impl Network for NeuralNetwork {
    fn parameters_count(&self) -> usize {
        self.parameters.len()
    }

    fn parameters(&self) -> Vector {
        self.parameters.clone()
    }

    fn set_parameters(&mut self, parameters: &Vector) -> Result<(), TensorError> {
        if parameters.len() != self.parameters.len() {
            return Err(TensorError::length_mismatch(
                self.parameters.len(),
                parameters.len(),
            ));
        }
        self.parameters.assign(parameters);
        Ok(())
    }

    fn inputs_number(&self) -> usize {
        self.layers.first().map_or(0, Linear::in_features)
    }

    fn outputs_number(&self) -> usize {
        self.layers.last().map_or(0, Linear::out_features)
    }

    fn forward_propagate(
        &self,
        batch: &Batch,
        parameters: &Vector,
        forward: &mut ForwardPropagation,
    ) -> Result<(), TensorError> {
        if parameters.len() != self.parameters.len() {
            return Err(TensorError::length_mismatch(
                self.parameters.len(),
                parameters.len(),
            ));
        }
        let parameters = slice_of(parameters)?;
        forward.layers.clear();
        let mut offset = 0;
        for (i, layer) in self.layers.iter().enumerate() {
            let count = layer.parameters_count();
            let inputs = match i {
                0 => &batch.inputs,
                _ => &forward.layers[i - 1].activations,
            };
            let output = layer.forward(inputs, &parameters[offset..offset + count])?;
            forward.layers.push(output);
            offset += count;
        }
        Ok(())
    }

    fn back_propagate(
        &self,
        batch: &Batch,
        parameters: &Vector,
        forward: &ForwardPropagation,
        output_deltas: &Matrix,
    ) -> Result<Vector, TensorError> {
        if forward.layers.len() != self.layers.len() {
            return Err(TensorError::Generic(
                "Forward propagation does not match the network's layers".to_string(),
            ));
        }
        if parameters.len() != self.parameters.len() {
            return Err(TensorError::length_mismatch(
                self.parameters.len(),
                parameters.len(),
            ));
        }
        let parameters = slice_of(parameters)?;
        let mut gradient = vec![0.0; parameters.len()];

        let mut end = parameters.len();
        let mut deltas = output_deltas.clone();
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let start = end - layer.parameters_count();
            let inputs = match i {
                0 => &batch.inputs,
                _ => &forward.layers[i - 1].activations,
            };
            deltas = layer.backward(
                inputs,
                &parameters[start..end],
                &forward.layers[i],
                &deltas,
                &mut gradient[start..end],
            )?;
            end = start;
        }
        Ok(Vector::from(gradient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn parameter_count_covers_all_layers() {
        let network = NeuralNetwork::new(&[2, 3, 1], Activation::Logistic, Activation::Linear, Some(0)).unwrap();
        // (3 + 2*3) + (1 + 3*1)
        assert_eq!(network.parameters_count(), 13);
        assert_eq!(network.inputs_number(), 2);
        assert_eq!(network.outputs_number(), 1);
    }

    #[test]
    fn same_seed_same_parameters() {
        let a = NeuralNetwork::new(&[4, 2], Activation::Linear, Activation::Linear, Some(3)).unwrap();
        let b = NeuralNetwork::new(&[4, 2], Activation::Linear, Activation::Linear, Some(3)).unwrap();
        assert_eq!(a.parameters(), b.parameters());
    }

    #[test]
    fn forward_at_explicit_parameters_ignores_stored_ones() {
        let layers = vec![Linear::new(1, 1, Activation::Linear).unwrap()];
        let network = NeuralNetwork::from_parts(layers, array![0.0, 0.0]).unwrap();
        let batch = Batch::new(array![[2.0]], array![[0.0]]).unwrap();

        let mut forward = ForwardPropagation::new();
        network
            .forward_propagate(&batch, &array![1.0, 3.0], &mut forward)
            .unwrap();
        assert_eq!(forward.outputs().unwrap(), &array![[7.0]]);
        assert_eq!(network.calculate_outputs(&batch.inputs).unwrap(), array![[0.0]]);
    }

    #[test]
    fn set_parameters_rejects_wrong_length() {
        let mut network = NeuralNetwork::new(&[2, 1], Activation::Linear, Activation::Linear, Some(0)).unwrap();
        assert!(network.set_parameters(&Vector::zeros(5)).is_err());
    }
}

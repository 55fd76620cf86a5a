//! # Python Bindings for RTrain (`rtrain_lib`)
//!
//! This module uses PyO3 to expose a one-call training entry point to Python.
//! Data crosses the boundary as nested lists; the network is a dense
//! perceptron with `tanh` hidden layers and a linear output layer.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::data::{DataSet, InMemoryDataSet};
use crate::error::TrainingError;
use crate::nn::{Activation, MeanSquaredError, Network, NeuralNetwork};
use crate::optim::{TrainingMethod, TrainingStrategy};
use crate::tensor::{Matrix, TensorData};

// --- Helper to Convert Rust Errors to Python Exceptions ---

impl std::convert::From<TrainingError> for PyErr {
    fn from(err: TrainingError) -> PyErr {
        match err {
            TrainingError::Configuration(_) | TrainingError::Tensor(_) => {
                PyValueError::new_err(err.to_string())
            }
            TrainingError::Divergence { .. } | TrainingError::Serialization(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
        }
    }
}

fn to_matrix(name: &str, rows: Vec<Vec<TensorData>>) -> PyResult<Matrix> {
    let samples = rows.len();
    let columns = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != columns) {
        return Err(PyValueError::new_err(format!("{} rows must all have the same length", name)));
    }
    let flat: Vec<TensorData> = rows.into_iter().flatten().collect();
    Matrix::from_shape_vec((samples, columns), flat)
        .map_err(|e| PyValueError::new_err(format!("{}: {}", name, e)))
}

/// Trains a dense network on `inputs`/`targets` and returns
/// `(parameters, training_error_history, stopping_condition)`.
///
/// `strategy_json`, if given, is a full training strategy document and
/// overrides `training_method` and `maximum_epochs`.
#[pyfunction]
#[pyo3(signature = (
    inputs,
    targets,
    hidden_layers = Vec::new(),
    training_method = "QUASI_NEWTON_METHOD",
    maximum_epochs = 1000,
    strategy_json = None,
    seed = None
))]
fn train_dense(
    inputs: Vec<Vec<TensorData>>,
    targets: Vec<Vec<TensorData>>,
    hidden_layers: Vec<usize>,
    training_method: &str,
    maximum_epochs: usize,
    strategy_json: Option<&str>,
    seed: Option<u64>,
) -> PyResult<(Vec<TensorData>, Vec<TensorData>, String)> {
    let inputs = to_matrix("inputs", inputs)?;
    let targets = to_matrix("targets", targets)?;
    let data_set = InMemoryDataSet::new(inputs, targets).map_err(TrainingError::from)?;

    let mut architecture = vec![data_set.input_variables_number()];
    architecture.extend_from_slice(&hidden_layers);
    architecture.push(data_set.target_variables_number());
    let mut network = NeuralNetwork::new(
        &architecture,
        Activation::HyperbolicTangent,
        Activation::Linear,
        seed,
    )
    .map_err(TrainingError::from)?;

    let strategy = match strategy_json {
        Some(text) => TrainingStrategy::from_json(text)?,
        None => {
            let mut strategy = TrainingStrategy::new(TrainingMethod::from_name(training_method)?);
            strategy.set_display(false);
            strategy.algorithm_mut().set_maximum_epochs_number(maximum_epochs);
            if let Some(seed) = seed {
                strategy.stochastic_gradient_descent.seed = Some(seed);
            }
            strategy
        }
    };

    let results = strategy.perform_training(&mut network, &MeanSquaredError::new(), &data_set)?;
    Ok((
        network.parameters().to_vec(),
        results.training_error_history.clone(),
        results.write_stopping_condition(),
    ))
}

// --- Main Python Module Definition (`rtrain_lib`) ---
#[pymodule]
fn rtrain_lib(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(train_dense, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

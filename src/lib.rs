//! # RTrain Core Library
//!
//! Gradient-based training engine for small neural networks: conjugate
//! gradient, quasi-Newton (DFP/BFGS) and stochastic gradient descent, sharing
//! one line search, one set of stopping criteria and one results record.
//! It's designed to be used both directly in Rust and via Python bindings.
//!
//! ```no_run
//! use rtrain_lib::nn::{Activation, MeanSquaredError, NeuralNetwork};
//! use rtrain_lib::data::InMemoryDataSet;
//! use rtrain_lib::optim::{QuasiNewtonMethod, InverseHessianMethod, TrainingAlgorithm};
//! use ndarray::array;
//!
//! let data = InMemoryDataSet::new(array![[0.0], [1.0]], array![[1.0], [3.0]])?;
//! let mut network = NeuralNetwork::new(&[1, 1], Activation::Linear, Activation::Linear, Some(0))?;
//! let optimizer = QuasiNewtonMethod::new(InverseHessianMethod::Bfgs);
//! let results = optimizer.perform_training(&mut network, &MeanSquaredError::new(), &data)?;
//! println!("{}", results.write_stopping_condition());
//! # Ok::<(), rtrain_lib::TrainingError>(())
//! ```

pub mod data;
pub mod error;
pub mod nn;
pub mod optim;
pub mod tensor;
pub mod utils;

#[cfg(feature = "python")]
pub mod bindings; // PyO3 module setup

// Re-export key components for easier use
pub use error::{Result, TrainingError};
pub use optim::{
    ConjugateGradient, QuasiNewtonMethod, StochasticGradientDescent, StoppingCondition,
    TrainingAlgorithm, TrainingResults, TrainingStrategy,
};

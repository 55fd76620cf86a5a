//! # Tensor Module
//!
//! Defines the numeric types shared by the whole crate (scalars, flat parameter
//! vectors and dense matrices) together with the kernels in [`ops`] that every
//! optimizer is built from.

use ndarray::{Array1, Array2};

// --- Submodules ---
pub mod ops;

// --- Re-exports ---
pub use ops::{axpy, dot, identity, l2_norm, matrix_vector, normalized, rank_one_update};

// --- Element Types ---

/// Scalar type used for parameters, gradients and losses.
///
/// Double precision: the quasi-Newton updates and the conjugate gradient
/// β formulas divide by small dot products.
pub type TensorData = f64;

/// Flat, dense vector (parameters, gradients, training directions).
pub type Vector = Array1<TensorData>;

/// Dense row-major matrix (batches, activations, inverse Hessian approximation).
pub type Matrix = Array2<TensorData>;

// --- Error Handling ---

#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Index out of bounds: index {index} for length {len}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error("Generic error: {0}")]
    Generic(String),
}

impl TensorError {
    /// Convenience constructor for one-dimensional length mismatches.
    pub fn length_mismatch(expected: usize, got: usize) -> Self {
        TensorError::ShapeMismatch {
            expected: vec![expected],
            got: vec![got],
        }
    }
}

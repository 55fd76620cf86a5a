//! # Data Module (`data`)
//!
//! Samples seen by the training algorithms. A [`DataSet`] assigns every sample
//! a [`SampleUse`] and materializes [`Batch`]es from lists of sample indices.

use crate::tensor::{Matrix, TensorError};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod in_memory;
pub use in_memory::InMemoryDataSet;

/// Role of a sample during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleUse {
    #[default]
    Training,
    Selection,
    Testing,
    Unused,
}

/// Inputs and targets of a group of samples, one sample per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub inputs: Matrix,
    pub targets: Matrix,
}

impl Batch {
    /// # Errors
    /// `TensorError::ShapeMismatch` if inputs and targets have different row counts.
    pub fn new(inputs: Matrix, targets: Matrix) -> Result<Self, TensorError> {
        if inputs.nrows() != targets.nrows() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![inputs.nrows(), targets.ncols()],
                got: targets.shape().to_vec(),
            });
        }
        Ok(Batch { inputs, targets })
    }

    pub fn samples_number(&self) -> usize {
        self.inputs.nrows()
    }
}

/// Source of training samples.
pub trait DataSet: Debug {
    fn input_variables_number(&self) -> usize;

    fn target_variables_number(&self) -> usize;

    /// Indices of the samples with the given use, in ascending order.
    fn sample_indices(&self, usage: SampleUse) -> Vec<usize>;

    /// Gathers the given samples into a batch.
    fn batch(&self, indices: &[usize]) -> Result<Batch, TensorError>;

    fn training_indices(&self) -> Vec<usize> {
        self.sample_indices(SampleUse::Training)
    }

    fn selection_indices(&self) -> Vec<usize> {
        self.sample_indices(SampleUse::Selection)
    }

    fn has_selection(&self) -> bool {
        !self.selection_indices().is_empty()
    }
}

/// Splits `indices` into consecutive batches of `batch_size`.
///
/// A batch size larger than the number of indices is clamped to it. Indices
/// left over after the last full batch are dropped.
pub fn split_batches(indices: &[usize], batch_size: usize) -> Vec<Vec<usize>> {
    let size = batch_size.min(indices.len());
    if size == 0 {
        return Vec::new();
    }
    indices
        .chunks_exact(size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

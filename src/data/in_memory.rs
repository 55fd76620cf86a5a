//! # In-Memory Data Set

use super::{Batch, DataSet, SampleUse};
use crate::tensor::{Matrix, TensorError};
use ndarray::Axis;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Samples held in two dense matrices with a use flag per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryDataSet {
    inputs: Matrix,
    targets: Matrix,
    uses: Vec<SampleUse>,
}

impl InMemoryDataSet {
    /// Creates a data set where every sample is used for training.
    ///
    /// # Errors
    /// `TensorError::ShapeMismatch` if inputs and targets have different row counts.
    pub fn new(inputs: Matrix, targets: Matrix) -> Result<Self, TensorError> {
        if inputs.nrows() != targets.nrows() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![inputs.nrows(), targets.ncols()],
                got: targets.shape().to_vec(),
            });
        }
        let uses = vec![SampleUse::Training; inputs.nrows()];
        Ok(InMemoryDataSet {
            inputs,
            targets,
            uses,
        })
    }

    pub fn samples_number(&self) -> usize {
        self.uses.len()
    }

    pub fn sample_use(&self, index: usize) -> Option<SampleUse> {
        self.uses.get(index).copied()
    }

    pub fn set_sample_use(&mut self, index: usize, usage: SampleUse) -> Result<(), TensorError> {
        let len = self.uses.len();
        let slot = self
            .uses
            .get_mut(index)
            .ok_or(TensorError::IndexOutOfBounds { index, len })?;
        *slot = usage;
        Ok(())
    }

    /// Shuffles the samples and assigns uses in the given proportions.
    ///
    /// Ratios are normalized by their sum. Rounding leftovers go to training.
    pub fn split_random<R: Rng + ?Sized>(
        &mut self,
        training_ratio: f64,
        selection_ratio: f64,
        testing_ratio: f64,
        rng: &mut R,
    ) -> Result<(), TensorError> {
        let ratios = [training_ratio, selection_ratio, testing_ratio];
        if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(TensorError::Generic(format!(
                "Split ratios must be finite and non-negative, got {:?}",
                ratios
            )));
        }
        let total: f64 = ratios.iter().sum();
        if total <= 0.0 {
            return Err(TensorError::Generic("Split ratios sum to zero".to_string()));
        }

        let n = self.samples_number();
        let selection = ((selection_ratio / total) * n as f64).floor() as usize;
        let testing = ((testing_ratio / total) * n as f64).floor() as usize;

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        for (position, &index) in order.iter().enumerate() {
            self.uses[index] = if position < selection {
                SampleUse::Selection
            } else if position < selection + testing {
                SampleUse::Testing
            } else {
                SampleUse::Training
            };
        }
        Ok(())
    }
}

impl DataSet for InMemoryDataSet {
    fn input_variables_number(&self) -> usize {
        self.inputs.ncols()
    }

    fn target_variables_number(&self) -> usize {
        self.targets.ncols()
    }

    fn sample_indices(&self, usage: SampleUse) -> Vec<usize> {
        self.uses
            .iter()
            .enumerate()
            .filter(|(_, u)| **u == usage)
            .map(|(i, _)| i)
            .collect()
    }

    fn batch(&self, indices: &[usize]) -> Result<Batch, TensorError> {
        let len = self.samples_number();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(TensorError::IndexOutOfBounds { index, len });
        }
        Batch::new(
            self.inputs.select(Axis(0), indices),
            self.targets.select(Axis(0), indices),
        )
    }
}

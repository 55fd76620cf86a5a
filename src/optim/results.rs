//! # Training Results

use super::stopping::StoppingCondition;
use crate::error::Result;
use crate::tensor::{TensorData, Vector};
use crate::utils::serialization;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of one `perform_training` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResults {
    /// Name of the algorithm that produced these results.
    pub algorithm: String,
    pub stopping_condition: Option<StoppingCondition>,
    /// One entry per epoch when the training history is reserved.
    pub training_error_history: Vec<TensorData>,
    /// One entry per epoch when the selection history is reserved and a
    /// selection split exists.
    pub selection_error_history: Vec<TensorData>,
    pub final_parameters: Vector,
    pub final_parameters_norm: TensorData,
    pub final_training_error: TensorData,
    pub final_selection_error: Option<TensorData>,
    pub final_gradient_norm: TensorData,
    /// Parameters at the epoch with the lowest selection error.
    pub optimal_parameters: Option<Vector>,
    pub optimum_selection_error: Option<TensorData>,
    /// Seconds.
    pub elapsed_time: TensorData,
    pub epochs_number: usize,
}

impl TrainingResults {
    pub fn new(algorithm: impl Into<String>) -> Self {
        TrainingResults {
            algorithm: algorithm.into(),
            stopping_condition: None,
            training_error_history: Vec::new(),
            selection_error_history: Vec::new(),
            final_parameters: Vector::zeros(0),
            final_parameters_norm: 0.0,
            final_training_error: 0.0,
            final_selection_error: None,
            final_gradient_norm: 0.0,
            optimal_parameters: None,
            optimum_selection_error: None,
            elapsed_time: 0.0,
            epochs_number: 0,
        }
    }

    pub fn write_stopping_condition(&self) -> String {
        self.stopping_condition
            .map_or_else(|| "Training not finished".to_string(), |c| c.to_string())
    }

    /// Elapsed time as `HH:MM:SS`.
    pub fn write_elapsed_time(&self) -> String {
        let total = self.elapsed_time.max(0.0).round() as u64;
        format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    }

    /// Name/value rows summarizing the run.
    pub fn write_final_results(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("Training algorithm".to_string(), self.algorithm.clone()),
            ("Epochs number".to_string(), self.epochs_number.to_string()),
            ("Elapsed time".to_string(), self.write_elapsed_time()),
            ("Stopping criterion".to_string(), self.write_stopping_condition()),
            ("Final parameters norm".to_string(), format!("{:e}", self.final_parameters_norm)),
            ("Final training error".to_string(), format!("{:e}", self.final_training_error)),
            ("Final gradient norm".to_string(), format!("{:e}", self.final_gradient_norm)),
        ];
        if let Some(error) = self.final_selection_error {
            rows.push(("Final selection error".to_string(), format!("{:e}", error)));
        }
        rows
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialization::save_json(self, path)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serialization::load_json(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_time_is_formatted_as_clock() {
        let mut results = TrainingResults::new("SGD");
        results.elapsed_time = 3725.4;
        assert_eq!(results.write_elapsed_time(), "01:02:05");
    }

    #[test]
    fn final_results_include_selection_only_when_present() {
        let mut results = TrainingResults::new("CG");
        results.stopping_condition = Some(StoppingCondition::LossGoal);
        assert_eq!(results.write_final_results().len(), 7);
        assert_eq!(results.write_final_results()[3].1, "Loss goal");

        results.final_selection_error = Some(0.25);
        assert_eq!(results.write_final_results().len(), 8);
    }

    #[test]
    fn results_survive_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let mut results = TrainingResults::new("QUASI_NEWTON_METHOD");
        results.training_error_history = vec![1.0, 0.5, 0.25];
        results.final_parameters = Vector::from(vec![0.1, -0.2]);
        results.stopping_condition = Some(StoppingCondition::MaximumEpochsNumber);
        results.save(&path).unwrap();
        assert_eq!(TrainingResults::load(&path).unwrap(), results);
    }
}

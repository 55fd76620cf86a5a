//! # Optimization Algorithms (`optim`)
//!
//! Training algorithms that fit a [`Network`]'s parameters to a [`DataSet`]
//! under a [`LossIndex`]: conjugate gradient, quasi-Newton and stochastic
//! gradient descent, plus the line search and stopping criteria they share.

use crate::data::DataSet;
use crate::error::{Result, TrainingError};
use crate::nn::{LossIndex, Network};
use crate::tensor::TensorData;
use crate::utils::serialization::save_checkpoint;
use std::fmt::Debug;
use std::path::PathBuf;
use tracing::{debug, warn};

// --- Submodules ---
pub mod conjugate_gradient;
pub mod direction;
pub mod full_batch;
pub mod line_search;
pub mod quasi_newton;
pub mod results;
pub mod settings;
pub mod sgd;
pub mod stopping;
pub mod strategy;

// Re-export optimizers
pub use conjugate_gradient::{ConjugateGradient, ConjugateGradientMethod};
pub use line_search::{LineSearch, LineSearchMethod};
pub use quasi_newton::{InverseHessianMethod, QuasiNewtonMethod};
pub use results::TrainingResults;
pub use settings::{NormLimits, TrainingSettings};
pub use sgd::StochasticGradientDescent;
pub use stopping::StoppingCondition;
pub use strategy::{TrainingMethod, TrainingStrategy};

use settings::{non_negative, positive_period};

// --- TrainingAlgorithm Trait ---

/// Base trait for all training algorithms.
///
/// Setters validate their argument and leave the setting untouched on error.
pub trait TrainingAlgorithm: Debug {
    /// Name used in configuration documents and results.
    fn algorithm_type(&self) -> &'static str;

    fn settings(&self) -> &TrainingSettings;

    fn settings_mut(&mut self) -> &mut TrainingSettings;

    /// Checks the whole configuration.
    fn validate(&self) -> Result<()> {
        self.settings().validate()
    }

    /// Trains `network` and leaves it holding the final (or, with
    /// `choose_best_selection`, the best) parameters.
    ///
    /// # Errors
    /// * `TrainingError::Configuration` for invalid settings or collaborators.
    /// * `TrainingError::Divergence` if a norm crosses its error limit.
    fn perform_training(
        &self,
        network: &mut dyn Network,
        loss_index: &dyn LossIndex,
        data_set: &dyn DataSet,
    ) -> Result<TrainingResults>;

    fn set_minimum_parameters_increment_norm(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().minimum_parameters_increment_norm =
            non_negative("minimum_parameters_increment_norm", value)?;
        Ok(())
    }

    fn set_minimum_loss_decrease(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().minimum_loss_decrease = non_negative("minimum_loss_decrease", value)?;
        Ok(())
    }

    fn set_loss_goal(&mut self, value: TensorData) -> Result<()> {
        if value.is_nan() {
            return Err(TrainingError::configuration("loss_goal must be a number"));
        }
        self.settings_mut().loss_goal = value;
        Ok(())
    }

    fn set_gradient_norm_goal(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().gradient_norm_goal = non_negative("gradient_norm_goal", value)?;
        Ok(())
    }

    fn set_maximum_selection_error_increases(&mut self, value: usize) {
        self.settings_mut().maximum_selection_error_increases = value;
    }

    fn set_maximum_epochs_number(&mut self, value: usize) {
        self.settings_mut().maximum_epochs_number = value;
    }

    fn set_maximum_time(&mut self, seconds: TensorData) -> Result<()> {
        self.settings_mut().maximum_time = non_negative("maximum_time", seconds)?;
        Ok(())
    }

    fn set_choose_best_selection(&mut self, value: bool) {
        self.settings_mut().choose_best_selection = value;
    }

    fn set_apply_early_stopping(&mut self, value: bool) {
        self.settings_mut().apply_early_stopping = value;
    }

    fn set_reserve_training_error_history(&mut self, value: bool) {
        self.settings_mut().reserve_training_error_history = value;
    }

    fn set_reserve_selection_error_history(&mut self, value: bool) {
        self.settings_mut().reserve_selection_error_history = value;
    }

    fn set_display(&mut self, value: bool) {
        self.settings_mut().display = value;
    }

    fn set_display_period(&mut self, value: usize) -> Result<()> {
        self.settings_mut().display_period = positive_period("display_period", value)?;
        Ok(())
    }

    fn set_save_period(&mut self, value: usize) -> Result<()> {
        self.settings_mut().save_period = positive_period("save_period", value)?;
        Ok(())
    }

    fn set_neural_network_file_name(&mut self, path: Option<PathBuf>) {
        self.settings_mut().neural_network_file_name = path;
    }

    fn set_warning_parameters_norm(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().norm_limits.warning_parameters_norm =
            non_negative("warning_parameters_norm", value)?;
        Ok(())
    }

    fn set_error_parameters_norm(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().norm_limits.error_parameters_norm =
            non_negative("error_parameters_norm", value)?;
        Ok(())
    }

    fn set_warning_gradient_norm(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().norm_limits.warning_gradient_norm =
            non_negative("warning_gradient_norm", value)?;
        Ok(())
    }

    fn set_error_gradient_norm(&mut self, value: TensorData) -> Result<()> {
        self.settings_mut().norm_limits.error_gradient_norm =
            non_negative("error_gradient_norm", value)?;
        Ok(())
    }
}

// --- Shared Helpers ---

/// Rejects collaborators that cannot be trained together.
pub(crate) fn check_collaborators(network: &dyn Network, data_set: &dyn DataSet) -> Result<()> {
    if network.parameters_count() == 0 {
        return Err(TrainingError::configuration("Network has no parameters"));
    }
    if data_set.training_indices().is_empty() {
        return Err(TrainingError::configuration("Data set has no training samples"));
    }
    if network.inputs_number() != data_set.input_variables_number() {
        return Err(TrainingError::configuration(format!(
            "Network takes {} inputs, data set has {}",
            network.inputs_number(),
            data_set.input_variables_number()
        )));
    }
    if network.outputs_number() != data_set.target_variables_number() {
        return Err(TrainingError::configuration(format!(
            "Network has {} outputs, data set has {} targets",
            network.outputs_number(),
            data_set.target_variables_number()
        )));
    }
    Ok(())
}

/// Writes a checkpoint if a file name is configured. Failures are logged only.
pub(crate) fn write_checkpoint(network: &dyn Network, epoch: usize, settings: &TrainingSettings) {
    let Some(path) = &settings.neural_network_file_name else {
        return;
    };
    match save_checkpoint(network, epoch, path) {
        Ok(()) => debug!(epoch, path = %path.display(), "checkpoint written"),
        Err(e) => warn!(epoch, path = %path.display(), error = %e, "checkpoint write failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataSet;
    use crate::nn::{Activation, NeuralNetwork};
    use crate::tensor::Matrix;

    #[test]
    fn setters_reject_negative_values_and_keep_old_ones() {
        let mut cg = ConjugateGradient::default();
        assert!(cg.set_maximum_time(-5.0).is_err());
        assert_eq!(cg.settings().maximum_time, 1000.0);
        assert!(cg.set_minimum_parameters_increment_norm(-1e-3).is_err());
        assert!(cg.set_error_gradient_norm(-1.0).is_err());
        assert!(cg.set_save_period(0).is_err());

        cg.set_gradient_norm_goal(1e-4).unwrap();
        assert_eq!(cg.settings().gradient_norm_goal, 1e-4);
    }

    #[test]
    fn loss_goal_accepts_negative_values() {
        let mut sgd = StochasticGradientDescent::default();
        sgd.set_loss_goal(-1.0).unwrap();
        assert_eq!(sgd.settings().loss_goal, -1.0);
        assert!(sgd.set_loss_goal(f64::NAN).is_err());
    }

    #[test]
    fn mismatched_collaborators_are_rejected() {
        let network = NeuralNetwork::new(&[3, 1], Activation::Linear, Activation::Linear, Some(0)).unwrap();
        let data = InMemoryDataSet::new(Matrix::zeros((4, 2)), Matrix::zeros((4, 1))).unwrap();
        assert!(matches!(
            check_collaborators(&network, &data),
            Err(TrainingError::Configuration(_))
        ));
    }

    #[test]
    fn data_set_without_training_samples_is_rejected() {
        let network = NeuralNetwork::new(&[2, 1], Activation::Linear, Activation::Linear, Some(0)).unwrap();
        let mut data = InMemoryDataSet::new(Matrix::zeros((2, 2)), Matrix::zeros((2, 1))).unwrap();
        data.set_sample_use(0, crate::data::SampleUse::Testing).unwrap();
        data.set_sample_use(1, crate::data::SampleUse::Unused).unwrap();
        assert!(check_collaborators(&network, &data).is_err());
    }
}

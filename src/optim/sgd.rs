//! # Stochastic Gradient Descent (SGD) Optimizer
//!
//! Mini-batch training without line search. Every batch applies
//!
//! ```text
//! rate      = initial_learning_rate / (1 + iteration * initial_decay)
//! increment = -rate * g + momentum * previous_increment
//! ```
//!
//! or, with Nesterov momentum, `momentum * increment - rate * g`.
//! The iteration counter advances once per batch and is kept across epochs.

use super::results::TrainingResults;
use super::settings::{non_negative, positive, positive_period, TrainingSettings};
use super::stopping::{EpochStatus, SelectionErrorTracker, StoppingCondition, StoppingCriteria};
use super::{check_collaborators, write_checkpoint, TrainingAlgorithm};
use crate::data::{split_batches, DataSet};
use crate::error::Result;
use crate::nn::{BackPropagation, ForwardPropagation, LossIndex, Network};
use crate::tensor::{ops, TensorData, Vector};
use crate::utils::parallel::ExecutionContext;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Per-run state of the update rule.
#[derive(Debug, Clone)]
pub struct SgdData {
    /// Increment of the previous batch (before the Nesterov correction).
    pub last_parameters_increment: Vector,
    /// Batches processed so far.
    pub iteration: usize,
}

impl SgdData {
    pub fn new(parameters_count: usize) -> Self {
        SgdData {
            last_parameters_increment: Vector::zeros(parameters_count),
            iteration: 0,
        }
    }
}

/// Implements the Stochastic Gradient Descent training algorithm.
/// Supports learning-rate decay, momentum and Nesterov momentum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StochasticGradientDescent {
    pub initial_learning_rate: TensorData,
    pub initial_decay: TensorData,
    pub momentum: TensorData,
    pub nesterov: bool,
    /// Samples per mini-batch, clamped to the training split size.
    pub batch_samples_number: usize,
    /// Reorder the training samples every epoch.
    pub shuffle: bool,
    /// Seed for the shuffling; `None` draws from entropy.
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub settings: TrainingSettings,
    #[serde(skip)]
    ctx: ExecutionContext,
}

impl Default for StochasticGradientDescent {
    fn default() -> Self {
        StochasticGradientDescent {
            initial_learning_rate: 0.01,
            initial_decay: 0.0,
            momentum: 0.0,
            nesterov: false,
            batch_samples_number: 1000,
            shuffle: true,
            seed: None,
            settings: TrainingSettings::stochastic(),
            ctx: ExecutionContext::default(),
        }
    }
}

impl StochasticGradientDescent {
    /// Creates a new SGD optimizer.
    ///
    /// # Arguments
    /// * `learning_rate`: Initial learning rate, must be positive.
    pub fn new(learning_rate: TensorData) -> Result<Self> {
        let mut sgd = Self::default();
        sgd.set_initial_learning_rate(learning_rate)?;
        Ok(sgd)
    }

    pub fn with_execution_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn set_initial_learning_rate(&mut self, value: TensorData) -> Result<()> {
        self.initial_learning_rate = positive("initial_learning_rate", value)?;
        Ok(())
    }

    pub fn set_initial_decay(&mut self, value: TensorData) -> Result<()> {
        self.initial_decay = non_negative("initial_decay", value)?;
        Ok(())
    }

    pub fn set_momentum(&mut self, value: TensorData) -> Result<()> {
        self.momentum = non_negative("momentum", value)?;
        Ok(())
    }

    pub fn set_nesterov(&mut self, value: bool) {
        self.nesterov = value;
    }

    pub fn set_batch_samples_number(&mut self, value: usize) -> Result<()> {
        self.batch_samples_number = positive_period("batch_samples_number", value)?;
        Ok(())
    }

    pub fn set_shuffle(&mut self, value: bool) {
        self.shuffle = value;
    }

    /// Applies one mini-batch update to `parameters`.
    ///
    /// # Returns
    /// The learning rate used.
    pub fn update_parameters(
        &self,
        gradient: &Vector,
        parameters: &mut Vector,
        data: &mut SgdData,
    ) -> Result<TensorData> {
        let ctx = &self.ctx;
        let learning_rate =
            self.initial_learning_rate / (1.0 + data.iteration as TensorData * self.initial_decay);

        let mut increment = gradient * (-learning_rate);
        if self.momentum > 0.0 {
            ops::axpy(ctx, self.momentum, &data.last_parameters_increment, &mut increment)?;
        }

        if self.momentum > 0.0 && self.nesterov {
            let mut nesterov_increment = &increment * self.momentum;
            ops::axpy(ctx, -learning_rate, gradient, &mut nesterov_increment)?;
            ops::axpy(ctx, 1.0, &nesterov_increment, parameters)?;
        } else {
            ops::axpy(ctx, 1.0, &increment, parameters)?;
        }

        data.last_parameters_increment = increment;
        data.iteration += 1;
        Ok(learning_rate)
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Mean error over `batches`, evaluated at `parameters`.
fn mean_error(
    network: &dyn Network,
    loss_index: &dyn LossIndex,
    data_set: &dyn DataSet,
    batches: &[Vec<usize>],
    parameters: &Vector,
    forward: &mut ForwardPropagation,
) -> Result<TensorData> {
    let mut total = 0.0;
    for indices in batches {
        let batch = data_set.batch(indices)?;
        network.forward_propagate(&batch, parameters, forward)?;
        total += loss_index.calculate_error(&batch, forward)?;
    }
    Ok(total / batches.len().max(1) as TensorData)
}

impl TrainingAlgorithm for StochasticGradientDescent {
    fn algorithm_type(&self) -> &'static str {
        "STOCHASTIC_GRADIENT_DESCENT"
    }

    fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut TrainingSettings {
        &mut self.settings
    }

    fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        positive("initial_learning_rate", self.initial_learning_rate)?;
        non_negative("initial_decay", self.initial_decay)?;
        non_negative("momentum", self.momentum)?;
        positive_period("batch_samples_number", self.batch_samples_number)?;
        Ok(())
    }

    fn perform_training(
        &self,
        network: &mut dyn Network,
        loss_index: &dyn LossIndex,
        data_set: &dyn DataSet,
    ) -> Result<TrainingResults> {
        self.validate()?;
        check_collaborators(&*network, data_set)?;
        let settings = &self.settings;
        let ctx = &self.ctx;

        let training_indices = data_set.training_indices();
        let selection_batches = split_batches(&data_set.selection_indices(), self.batch_samples_number);
        let has_selection = !selection_batches.is_empty();

        let parameters_count = network.parameters_count();
        let mut parameters = network.parameters();
        let mut sgd_data = SgdData::new(parameters_count);
        let mut rng = self.rng();
        let mut forward = ForwardPropagation::new();
        let mut back = BackPropagation::new(parameters_count);
        let mut tracker = SelectionErrorTracker::new();
        let criteria = StoppingCriteria::new(settings, has_selection);
        let mut results = TrainingResults::new(self.algorithm_type());

        if settings.display {
            info!(
                algorithm = self.algorithm_type(),
                parameters = parameters_count,
                training_samples = training_indices.len(),
                batch_samples = self.batch_samples_number.min(training_indices.len()),
                "training started"
            );
        }

        // Errors before the first update.
        let initial_batches = split_batches(&training_indices, self.batch_samples_number);
        let initial_error = mean_error(
            &*network,
            loss_index,
            data_set,
            &initial_batches[..1],
            &parameters,
            &mut forward,
        )?;
        if settings.reserve_training_error_history {
            results.training_error_history.push(initial_error);
        }
        if has_selection && settings.reserve_selection_error_history {
            let initial_selection = mean_error(
                &*network,
                loss_index,
                data_set,
                &selection_batches,
                &parameters,
                &mut forward,
            )?;
            results.selection_error_history.push(initial_selection);
        }

        let start = Instant::now();
        let mut order = training_indices;
        let mut old_loss: Option<TensorData> = None;

        for epoch in 1..=settings.maximum_epochs_number {
            if self.shuffle {
                order.shuffle(&mut rng);
            }
            let batches = split_batches(&order, self.batch_samples_number);

            let mut training_error = 0.0;
            let mut training_loss = 0.0;
            let mut learning_rate = self.initial_learning_rate;
            for indices in &batches {
                let batch = data_set.batch(indices)?;
                network.forward_propagate(&batch, &parameters, &mut forward)?;
                loss_index.back_propagate(&*network, &batch, &parameters, &forward, &mut back)?;
                training_error += back.error;
                training_loss += back.loss;
                learning_rate = self.update_parameters(&back.gradient, &mut parameters, &mut sgd_data)?;
            }
            let batches_number = batches.len() as TensorData;
            training_error /= batches_number;
            training_loss /= batches_number;
            network.set_parameters(&parameters)?;

            let parameters_norm = ops::l2_norm(ctx, &parameters);
            settings
                .norm_limits
                .check_parameters_norm(parameters_norm, epoch, settings.display)?;
            let gradient_norm = ops::l2_norm(ctx, &back.gradient);
            settings
                .norm_limits
                .check_gradient_norm(gradient_norm, epoch, settings.display)?;

            let selection_error = if has_selection {
                let error = mean_error(
                    &*network,
                    loss_index,
                    data_set,
                    &selection_batches,
                    &parameters,
                    &mut forward,
                )?;
                if tracker.record(error) {
                    results.optimal_parameters = Some(parameters.clone());
                    results.optimum_selection_error = Some(error);
                }
                Some(error)
            } else {
                None
            };

            if settings.reserve_training_error_history {
                results.training_error_history.push(training_error);
            }
            if let (true, Some(error)) = (settings.reserve_selection_error_history, selection_error) {
                results.selection_error_history.push(error);
            }

            let status = EpochStatus {
                epoch,
                parameters_increment_norm: None,
                loss_decrease: old_loss.map(|old| old - training_loss),
                training_loss,
                gradient_norm,
                selection_error_increases: tracker.increases(),
                elapsed_seconds: start.elapsed().as_secs_f64(),
            };
            old_loss = Some(training_loss);
            let stop = criteria.evaluate(&status);

            if settings.is_save_epoch(epoch) {
                write_checkpoint(&*network, epoch, settings);
            }

            if let Some(condition) = stop {
                if settings.display {
                    info!(
                        epoch,
                        reason = %condition,
                        training_error,
                        gradient_norm,
                        learning_rate,
                        selection_error = ?selection_error,
                        "training stopped"
                    );
                }
                results.stopping_condition = Some(condition);
                results.final_parameters = parameters.clone();
                results.final_parameters_norm = parameters_norm;
                results.final_training_error = training_error;
                results.final_selection_error = selection_error;
                results.final_gradient_norm = gradient_norm;
                results.elapsed_time = status.elapsed_seconds;
                results.epochs_number = epoch;
                break;
            }

            if settings.is_display_epoch(epoch) {
                info!(
                    epoch,
                    training_error,
                    gradient_norm,
                    learning_rate,
                    selection_error = ?selection_error,
                    "epoch summary"
                );
            }
        }

        if results.stopping_condition.is_none() {
            // Zero epochs requested: nothing was updated.
            results.stopping_condition = Some(StoppingCondition::MaximumEpochsNumber);
            results.final_parameters = parameters.clone();
            results.final_parameters_norm = ops::l2_norm(ctx, &parameters);
            results.final_training_error = initial_error;
        }

        if settings.choose_best_selection {
            if let Some(optimal) = &results.optimal_parameters {
                network.set_parameters(optimal)?;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn sgd(learning_rate: f64) -> StochasticGradientDescent {
        StochasticGradientDescent::new(learning_rate)
            .unwrap()
            .with_execution_context(ExecutionContext::sequential())
    }

    #[test]
    fn without_momentum_update_is_plain_gradient_descent() {
        let optimizer = sgd(0.01);
        let old = array![0.3, -1.2, 2.5];
        let gradient = array![1.0, -0.5, 0.25];
        let mut parameters = old.clone();
        let mut data = SgdData::new(3);

        optimizer.update_parameters(&gradient, &mut parameters, &mut data).unwrap();
        assert_eq!(parameters, &old - &(&gradient * 0.01));
        assert_eq!(data.iteration, 1);
    }

    #[test]
    fn decay_shrinks_learning_rate_per_iteration() {
        let mut optimizer = sgd(0.1);
        optimizer.set_initial_decay(1.0).unwrap();
        let mut parameters = array![0.0];
        let mut data = SgdData::new(1);

        let first = optimizer.update_parameters(&array![1.0], &mut parameters, &mut data).unwrap();
        let second = optimizer.update_parameters(&array![1.0], &mut parameters, &mut data).unwrap();
        assert_abs_diff_eq!(first, 0.1);
        assert_abs_diff_eq!(second, 0.05);
    }

    #[test]
    fn momentum_accumulates_previous_increment() {
        let mut optimizer = sgd(0.1);
        optimizer.set_momentum(0.5).unwrap();
        let mut parameters = array![0.0];
        let mut data = SgdData::new(1);

        optimizer.update_parameters(&array![1.0], &mut parameters, &mut data).unwrap();
        assert_abs_diff_eq!(parameters[0], -0.1, epsilon = 1e-15);
        optimizer.update_parameters(&array![1.0], &mut parameters, &mut data).unwrap();
        // -0.1 + (-0.1 + 0.5 * -0.1)
        assert_abs_diff_eq!(parameters[0], -0.25, epsilon = 1e-15);
        assert_abs_diff_eq!(data.last_parameters_increment[0], -0.15, epsilon = 1e-15);
    }

    #[test]
    fn nesterov_applies_look_ahead_increment() {
        let mut optimizer = sgd(0.1);
        optimizer.set_momentum(0.5).unwrap();
        optimizer.set_nesterov(true);
        let mut parameters = array![0.0];
        let mut data = SgdData::new(1);

        optimizer.update_parameters(&array![1.0], &mut parameters, &mut data).unwrap();
        // increment -0.1, applied 0.5 * -0.1 - 0.1
        assert_abs_diff_eq!(parameters[0], -0.15, epsilon = 1e-15);
        assert_abs_diff_eq!(data.last_parameters_increment[0], -0.1, epsilon = 1e-15);
    }

    #[test]
    fn invalid_hyperparameters_are_rejected() {
        assert!(StochasticGradientDescent::new(0.0).is_err());
        let mut optimizer = StochasticGradientDescent::default();
        assert!(optimizer.set_momentum(-0.1).is_err());
        assert!(optimizer.set_initial_decay(-1.0).is_err());
        assert!(optimizer.set_batch_samples_number(0).is_err());
        assert_eq!(optimizer.momentum, 0.0);
    }
}

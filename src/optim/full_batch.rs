//! # Full-Batch Training Loop
//!
//! Epoch loop shared by the line-search optimizers. Each epoch:
//!
//! 1. forward and back propagation over the whole training split
//! 2. selection error, if a selection split exists
//! 3. direction, descent check and line search ([`DescentStep::advance`])
//! 4. history, stopping criteria and periodic checkpoint

use super::direction::{ensure_descent, steepest_descent, DirectionStrategy, OptimizationData};
use super::line_search::LineSearch;
use super::results::TrainingResults;
use super::settings::TrainingSettings;
use super::stopping::{EpochStatus, SelectionErrorTracker, StoppingCriteria};
use super::{check_collaborators, write_checkpoint};
use crate::data::DataSet;
use crate::error::Result;
use crate::nn::{BackPropagation, BatchLoss, ForwardPropagation, LossEvaluable, LossIndex, Network};
use crate::tensor::{ops, TensorData, Vector};
use crate::utils::parallel::ExecutionContext;
use std::time::Instant;
use tracing::{debug, info};

/// Configuration of one full-batch run.
#[derive(Debug, Clone, Copy)]
pub struct FullBatchRun<'a> {
    pub algorithm: &'static str,
    pub settings: &'a TrainingSettings,
    pub line_search: &'a LineSearch,
    pub first_learning_rate: TensorData,
    pub ctx: &'a ExecutionContext,
}

/// What one call to [`DescentStep::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub learning_rate: TensorData,
    /// Norm of the applied increment; `None` when the update was skipped.
    pub increment_norm: Option<TensorData>,
}

/// Direction, line search and parameter update of one epoch.
pub struct DescentStep<'a> {
    pub strategy: &'a mut dyn DirectionStrategy,
    pub line_search: &'a LineSearch,
    pub first_learning_rate: TensorData,
    pub ctx: &'a ExecutionContext,
}

impl DescentStep<'_> {
    /// Moves `data.parameters` along this epoch's direction.
    ///
    /// # Arguments
    /// * `data`: Working state; read for the gradient history, written with
    ///   the new parameters, direction and learning rate.
    /// * `gradient`: Gradient at `data.parameters`.
    /// * `loss`: Loss at `data.parameters`.
    /// * `model`: Loss along the search line.
    pub fn advance(
        &mut self,
        data: &mut OptimizationData,
        gradient: &Vector,
        loss: TensorData,
        model: &mut dyn LossEvaluable,
    ) -> Result<StepOutcome> {
        let ctx = self.ctx;
        let raw = self.strategy.compute_direction(ctx, data, gradient)?;
        let mut direction = ensure_descent(ctx, gradient, raw)?;

        let initial_step = if data.epoch == 0 || data.old_learning_rate <= 0.0 {
            self.first_learning_rate
        } else {
            data.old_learning_rate
        };

        let mut point = self
            .line_search
            .find_step(ctx, model, &data.parameters, loss, &direction, initial_step)?;

        if point.step == 0.0 {
            debug!(epoch = data.epoch, "zero step, retrying along steepest descent");
            direction = steepest_descent(ctx, gradient);
            point = self.line_search.find_step(
                ctx,
                model,
                &data.parameters,
                loss,
                &direction,
                self.first_learning_rate,
            )?;
        }

        data.old_parameters.assign(&data.parameters);
        let increment_norm = if point.step > 0.0 {
            data.parameters_increment = &direction * point.step;
            ops::axpy(ctx, 1.0, &data.parameters_increment, &mut data.parameters)?;
            Some(ops::l2_norm(ctx, &data.parameters_increment))
        } else {
            debug!(epoch = data.epoch, "no decrease along steepest descent, update skipped");
            data.parameters_increment.fill(0.0);
            None
        };

        data.old_gradient.assign(gradient);
        data.training_direction = direction;
        data.old_training_direction.assign(&data.training_direction);
        data.learning_rate = point.step;
        data.old_learning_rate = point.step;

        Ok(StepOutcome {
            learning_rate: point.step,
            increment_norm,
        })
    }
}

/// Runs the full-batch epoch loop with the given direction rule.
pub fn train_full_batch(
    run: &FullBatchRun<'_>,
    strategy: &mut dyn DirectionStrategy,
    network: &mut dyn Network,
    loss_index: &dyn LossIndex,
    data_set: &dyn DataSet,
) -> Result<TrainingResults> {
    let settings = run.settings;
    let ctx = run.ctx;
    check_collaborators(&*network, data_set)?;

    let training_batch = data_set.batch(&data_set.training_indices())?;
    let selection_indices = data_set.selection_indices();
    let selection_batch = if selection_indices.is_empty() {
        None
    } else {
        Some(data_set.batch(&selection_indices)?)
    };
    let has_selection = selection_batch.is_some();

    let parameters_count = network.parameters_count();
    let mut data = OptimizationData::new(network.parameters());
    let mut training_forward = ForwardPropagation::new();
    let mut selection_forward = ForwardPropagation::new();
    let mut back = BackPropagation::new(parameters_count);
    let mut tracker = SelectionErrorTracker::new();
    let criteria = StoppingCriteria::new(settings, has_selection);

    let mut results = TrainingResults::new(run.algorithm);
    let mut old_loss: Option<TensorData> = None;
    let start = Instant::now();

    if settings.display {
        info!(
            algorithm = run.algorithm,
            direction = strategy.name(),
            parameters = parameters_count,
            training_samples = training_batch.samples_number(),
            selection_samples = selection_indices.len(),
            "training started"
        );
    }

    for epoch in 0..=settings.maximum_epochs_number {
        data.epoch = epoch;

        let parameters_norm = ops::l2_norm(ctx, &data.parameters);
        settings
            .norm_limits
            .check_parameters_norm(parameters_norm, epoch, settings.display)?;

        network.forward_propagate(&training_batch, &data.parameters, &mut training_forward)?;
        loss_index.back_propagate(&*network, &training_batch, &data.parameters, &training_forward, &mut back)?;

        let gradient_norm = ops::l2_norm(ctx, &back.gradient);
        settings
            .norm_limits
            .check_gradient_norm(gradient_norm, epoch, settings.display)?;

        let selection_error = match &selection_batch {
            Some(batch) => {
                network.forward_propagate(batch, &data.parameters, &mut selection_forward)?;
                let error = loss_index.calculate_error(batch, &selection_forward)?;
                if tracker.record(error) {
                    results.optimal_parameters = Some(data.parameters.clone());
                    results.optimum_selection_error = Some(error);
                }
                Some(error)
            }
            None => None,
        };

        let step = {
            let mut model = BatchLoss::new(&*network, loss_index, &training_batch);
            let mut descent = DescentStep {
                strategy: &mut *strategy,
                line_search: run.line_search,
                first_learning_rate: run.first_learning_rate,
                ctx,
            };
            descent.advance(&mut data, &back.gradient, back.loss, &mut model)?
        };
        network.set_parameters(&data.parameters)?;

        if settings.reserve_training_error_history {
            results.training_error_history.push(back.loss);
        }
        if let (true, Some(error)) = (settings.reserve_selection_error_history, selection_error) {
            results.selection_error_history.push(error);
        }

        let status = EpochStatus {
            epoch,
            parameters_increment_norm: step.increment_norm,
            loss_decrease: old_loss.map(|old| old - back.loss),
            training_loss: back.loss,
            gradient_norm,
            selection_error_increases: tracker.increases(),
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };
        old_loss = Some(back.loss);
        let stop = criteria.evaluate(&status);

        if settings.is_save_epoch(epoch) {
            write_checkpoint(&*network, epoch, settings);
        }

        if let Some(condition) = stop {
            if settings.display {
                info!(
                    epoch,
                    reason = %condition,
                    training_loss = back.loss,
                    gradient_norm,
                    learning_rate = step.learning_rate,
                    selection_error = ?selection_error,
                    "training stopped"
                );
            }
            results.stopping_condition = Some(condition);
            results.final_parameters = data.parameters.clone();
            results.final_parameters_norm = ops::l2_norm(ctx, &data.parameters);
            results.final_training_error = back.loss;
            results.final_selection_error = selection_error;
            results.final_gradient_norm = gradient_norm;
            results.elapsed_time = status.elapsed_seconds;
            results.epochs_number = epoch;
            break;
        }

        if settings.is_display_epoch(epoch) {
            info!(
                epoch,
                training_loss = back.loss,
                gradient_norm,
                learning_rate = step.learning_rate,
                selection_error = ?selection_error,
                "epoch summary"
            );
        }
    }

    if settings.choose_best_selection {
        if let Some(optimal) = &results.optimal_parameters {
            network.set_parameters(optimal)?;
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::FnLoss;
    use crate::optim::conjugate_gradient::ConjugateGradientMethod;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn line_search() -> LineSearch {
        LineSearch {
            display: false,
            ..LineSearch::default()
        }
    }

    #[test]
    fn advance_moves_downhill_on_a_bowl() {
        let ctx = ExecutionContext::sequential();
        let bowl = |p: &Vector| p[0] * p[0] + 4.0 * p[1] * p[1];
        let mut data = OptimizationData::new(array![2.0, 1.0]);
        let gradient = array![4.0, 8.0];
        let loss = bowl(&data.parameters);

        let mut strategy = ConjugateGradientMethod::PolakRibiere;
        let line_search = line_search();
        let mut step = DescentStep {
            strategy: &mut strategy,
            line_search: &line_search,
            first_learning_rate: 0.01,
            ctx: &ctx,
        };
        let outcome = step
            .advance(&mut data, &gradient, loss, &mut FnLoss(bowl))
            .unwrap();

        assert!(bowl(&data.parameters) < loss);
        assert_eq!(data.old_parameters, array![2.0, 1.0]);
        assert_eq!(data.old_gradient, gradient);
        assert_abs_diff_eq!(ops::l2_norm(&ctx, &data.training_direction), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(outcome.increment_norm.unwrap(), outcome.learning_rate, epsilon = 1e-12);
        assert_eq!(data.old_learning_rate, outcome.learning_rate);
    }

    /// Always proposes the same direction.
    #[derive(Debug)]
    struct FixedDirection(Vector);

    impl DirectionStrategy for FixedDirection {
        fn name(&self) -> &'static str {
            "FIXED"
        }

        fn compute_direction(
            &mut self,
            _ctx: &ExecutionContext,
            _data: &OptimizationData,
            _gradient: &Vector,
        ) -> Result<Vector> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn advance_retries_along_steepest_descent_after_zero_step() {
        let ctx = ExecutionContext::sequential();
        // Any move off the first axis raises the loss.
        let ridge = |p: &Vector| if p[1] != 0.0 { 2.0 } else { p[0] * p[0] };
        let mut data = OptimizationData::new(array![1.0, 0.0]);
        let gradient = array![2.0, 0.0];

        // Downhill by the descent check, but uphill in practice.
        let diagonal = 1.0 / 2.0_f64.sqrt();
        let mut strategy = FixedDirection(array![-diagonal, diagonal]);
        let line_search = line_search();
        let mut step = DescentStep {
            strategy: &mut strategy,
            line_search: &line_search,
            first_learning_rate: 0.01,
            ctx: &ctx,
        };
        let outcome = step
            .advance(&mut data, &gradient, 1.0, &mut FnLoss(ridge))
            .unwrap();

        assert!(outcome.increment_norm.is_some());
        assert!(outcome.learning_rate > 0.0);
        assert_eq!(data.training_direction, steepest_descent(&ctx, &gradient));
        assert!(data.parameters[0] < 1.0);
        assert_eq!(data.parameters[1], 0.0);
    }

    #[test]
    fn advance_skips_update_when_no_step_lowers_the_loss() {
        let ctx = ExecutionContext::sequential();
        // Gradient claims a slope but the loss is flat: no step can lower it.
        let flat = |_: &Vector| 1.0;
        let mut data = OptimizationData::new(array![0.5, -0.5]);
        let mut strategy = ConjugateGradientMethod::FletcherReeves;
        let line_search = line_search();
        let mut step = DescentStep {
            strategy: &mut strategy,
            line_search: &line_search,
            first_learning_rate: 0.01,
            ctx: &ctx,
        };
        let outcome = step
            .advance(&mut data, &array![1.0, 0.0], 1.0, &mut FnLoss(flat))
            .unwrap();

        assert_eq!(outcome.increment_norm, None);
        assert_eq!(outcome.learning_rate, 0.0);
        assert_eq!(data.parameters, array![0.5, -0.5]);
    }
}

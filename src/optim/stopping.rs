//! # Stopping Criteria
//!
//! Decides, once per epoch, whether training ends and why. Criteria are tried
//! in a fixed order and the first one that holds is reported:
//!
//! 1. parameters increment norm at or below its minimum
//! 2. loss decrease at or below its minimum (only when that minimum is positive)
//! 3. training loss at or below the goal
//! 4. gradient norm at or below the goal
//! 5. too many consecutive selection error increases
//! 6. maximum number of epochs
//! 7. maximum time

use super::settings::TrainingSettings;
use crate::tensor::TensorData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoppingCondition {
    MinimumParametersIncrementNorm,
    MinimumLossDecrease,
    LossGoal,
    GradientNormGoal,
    MaximumSelectionErrorIncreases,
    MaximumEpochsNumber,
    MaximumTime,
}

impl StoppingCondition {
    pub fn description(&self) -> &'static str {
        match self {
            StoppingCondition::MinimumParametersIncrementNorm => "Minimum parameters increment norm",
            StoppingCondition::MinimumLossDecrease => "Minimum loss decrease",
            StoppingCondition::LossGoal => "Loss goal",
            StoppingCondition::GradientNormGoal => "Gradient norm goal",
            StoppingCondition::MaximumSelectionErrorIncreases => "Maximum selection error increases",
            StoppingCondition::MaximumEpochsNumber => "Maximum number of epochs",
            StoppingCondition::MaximumTime => "Maximum training time",
        }
    }
}

impl fmt::Display for StoppingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Quantities measured during one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochStatus {
    pub epoch: usize,
    /// Norm of the step applied this epoch. `None` for algorithms without one.
    pub parameters_increment_norm: Option<TensorData>,
    /// `previous_loss - loss`. `None` on the first epoch.
    pub loss_decrease: Option<TensorData>,
    pub training_loss: TensorData,
    pub gradient_norm: TensorData,
    pub selection_error_increases: usize,
    pub elapsed_seconds: TensorData,
}

/// Evaluates the criteria of one run.
#[derive(Debug, Clone, Copy)]
pub struct StoppingCriteria<'a> {
    settings: &'a TrainingSettings,
    has_selection: bool,
}

impl<'a> StoppingCriteria<'a> {
    pub fn new(settings: &'a TrainingSettings, has_selection: bool) -> Self {
        StoppingCriteria {
            settings,
            has_selection,
        }
    }

    /// Returns the highest-priority condition met by `status`, if any.
    pub fn evaluate(&self, status: &EpochStatus) -> Option<StoppingCondition> {
        let s = self.settings;

        if let Some(norm) = status.parameters_increment_norm {
            if norm <= s.minimum_parameters_increment_norm {
                return Some(StoppingCondition::MinimumParametersIncrementNorm);
            }
        }
        if s.minimum_loss_decrease > 0.0 {
            if let Some(decrease) = status.loss_decrease {
                if decrease <= s.minimum_loss_decrease {
                    return Some(StoppingCondition::MinimumLossDecrease);
                }
            }
        }
        if status.training_loss <= s.loss_goal {
            return Some(StoppingCondition::LossGoal);
        }
        if status.gradient_norm <= s.gradient_norm_goal {
            return Some(StoppingCondition::GradientNormGoal);
        }
        if s.apply_early_stopping
            && self.has_selection
            && status.selection_error_increases >= s.maximum_selection_error_increases
        {
            return Some(StoppingCondition::MaximumSelectionErrorIncreases);
        }
        if status.epoch >= s.maximum_epochs_number {
            return Some(StoppingCondition::MaximumEpochsNumber);
        }
        if status.elapsed_seconds >= s.maximum_time {
            return Some(StoppingCondition::MaximumTime);
        }
        None
    }
}

/// Counts consecutive epochs whose selection error grew, and remembers the
/// lowest selection error seen.
#[derive(Debug, Clone, Default)]
pub struct SelectionErrorTracker {
    previous: Option<TensorData>,
    increases: usize,
    optimum: Option<TensorData>,
}

impl SelectionErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records this epoch's selection error.
    ///
    /// Returns `true` when it is the lowest seen so far (ties included).
    pub fn record(&mut self, error: TensorData) -> bool {
        match self.previous {
            Some(previous) if error > previous => self.increases += 1,
            _ => self.increases = 0,
        }
        self.previous = Some(error);

        let is_optimum = self.optimum.map_or(true, |best| error <= best);
        if is_optimum {
            self.optimum = Some(error);
        }
        is_optimum
    }

    pub fn increases(&self) -> usize {
        self.increases
    }

    pub fn optimum(&self) -> Option<TensorData> {
        self.optimum
    }
}

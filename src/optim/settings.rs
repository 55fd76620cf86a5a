//! # Training Settings
//!
//! Thresholds and switches shared by every training algorithm. Each field is
//! serialized under its own name so JSON configurations round-trip exactly.

use crate::error::{Result, TrainingError};
use crate::tensor::TensorData;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Warning and error limits on the parameter and gradient norms.
///
/// Crossing a warning limit logs; crossing an error limit aborts training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormLimits {
    pub warning_parameters_norm: TensorData,
    pub error_parameters_norm: TensorData,
    pub warning_gradient_norm: TensorData,
    pub error_gradient_norm: TensorData,
}

impl Default for NormLimits {
    fn default() -> Self {
        NormLimits {
            warning_parameters_norm: 1.0e6,
            error_parameters_norm: 1.0e9,
            warning_gradient_norm: 1.0e6,
            error_gradient_norm: 1.0e9,
        }
    }
}

impl NormLimits {
    pub fn check_parameters_norm(&self, norm: TensorData, epoch: usize, display: bool) -> Result<()> {
        check_norm(
            "parameters norm",
            norm,
            self.warning_parameters_norm,
            self.error_parameters_norm,
            epoch,
            display,
        )
    }

    pub fn check_gradient_norm(&self, norm: TensorData, epoch: usize, display: bool) -> Result<()> {
        check_norm(
            "gradient norm",
            norm,
            self.warning_gradient_norm,
            self.error_gradient_norm,
            epoch,
            display,
        )
    }
}

fn check_norm(
    quantity: &'static str,
    value: TensorData,
    warning: TensorData,
    error: TensorData,
    epoch: usize,
    display: bool,
) -> Result<()> {
    if value >= error || value.is_nan() {
        return Err(TrainingError::Divergence {
            quantity,
            value,
            limit: error,
        });
    }
    if display && value >= warning {
        warn!(epoch, quantity, value, limit = warning, "norm above warning limit");
    }
    Ok(())
}

/// Rejects negative or NaN values for thresholds that must be non-negative.
pub(crate) fn non_negative(name: &str, value: TensorData) -> Result<TensorData> {
    if value.is_nan() || value < 0.0 {
        return Err(TrainingError::configuration(format!(
            "{} must be non-negative, got {}",
            name, value
        )));
    }
    Ok(value)
}

/// Rejects zero, negative or NaN values.
pub(crate) fn positive(name: &str, value: TensorData) -> Result<TensorData> {
    if non_negative(name, value)? == 0.0 {
        return Err(TrainingError::configuration(format!("{} must be positive", name)));
    }
    Ok(value)
}

pub(crate) fn positive_period(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(TrainingError::configuration(format!(
            "{} must be greater than zero",
            name
        )));
    }
    Ok(value)
}

/// Stopping criteria, history switches and checkpoint policy of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Stop once an epoch moves the parameters by no more than this.
    pub minimum_parameters_increment_norm: TensorData,
    /// Stop once an epoch improves the loss by no more than this. Zero disables it.
    pub minimum_loss_decrease: TensorData,
    pub loss_goal: TensorData,
    pub gradient_norm_goal: TensorData,
    /// Consecutive epochs with a growing selection error tolerated before stopping.
    pub maximum_selection_error_increases: usize,
    pub maximum_epochs_number: usize,
    /// Wall-clock budget in seconds.
    pub maximum_time: TensorData,
    /// Hand the network the parameters with the lowest selection error at the end.
    pub choose_best_selection: bool,
    pub apply_early_stopping: bool,
    pub reserve_training_error_history: bool,
    pub reserve_selection_error_history: bool,
    pub display: bool,
    pub display_period: usize,
    pub save_period: usize,
    /// Checkpoint target. `None` disables checkpoints.
    pub neural_network_file_name: Option<PathBuf>,
    #[serde(flatten)]
    pub norm_limits: NormLimits,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        TrainingSettings::full_batch()
    }
}

impl TrainingSettings {
    /// Defaults of the line-search optimizers (conjugate gradient, quasi-Newton).
    pub fn full_batch() -> Self {
        TrainingSettings {
            minimum_parameters_increment_norm: 0.0,
            minimum_loss_decrease: 0.0,
            loss_goal: TensorData::MIN,
            gradient_norm_goal: 0.0,
            maximum_selection_error_increases: 1_000_000,
            maximum_epochs_number: 1000,
            maximum_time: 1000.0,
            choose_best_selection: false,
            apply_early_stopping: true,
            reserve_training_error_history: true,
            reserve_selection_error_history: false,
            display: true,
            display_period: 5,
            save_period: 100,
            neural_network_file_name: None,
            norm_limits: NormLimits::default(),
        }
    }

    /// Defaults of stochastic gradient descent.
    pub fn stochastic() -> Self {
        TrainingSettings {
            loss_goal: 0.0,
            maximum_time: 3600.0,
            reserve_selection_error_history: true,
            ..TrainingSettings::full_batch()
        }
    }

    /// Checks every threshold. Run on load and at the start of training.
    pub fn validate(&self) -> Result<()> {
        non_negative(
            "minimum_parameters_increment_norm",
            self.minimum_parameters_increment_norm,
        )?;
        non_negative("minimum_loss_decrease", self.minimum_loss_decrease)?;
        if self.loss_goal.is_nan() {
            return Err(TrainingError::configuration("loss_goal must be a number"));
        }
        non_negative("gradient_norm_goal", self.gradient_norm_goal)?;
        non_negative("maximum_time", self.maximum_time)?;
        positive_period("display_period", self.display_period)?;
        positive_period("save_period", self.save_period)?;

        let limits = &self.norm_limits;
        non_negative("warning_parameters_norm", limits.warning_parameters_norm)?;
        non_negative("error_parameters_norm", limits.error_parameters_norm)?;
        non_negative("warning_gradient_norm", limits.warning_gradient_norm)?;
        non_negative("error_gradient_norm", limits.error_gradient_norm)?;
        Ok(())
    }

    /// True when an epoch summary should be logged.
    pub fn is_display_epoch(&self, epoch: usize) -> bool {
        self.display && epoch % self.display_period == 0
    }

    /// True when a checkpoint should be written after `epoch`.
    pub fn is_save_epoch(&self, epoch: usize) -> bool {
        self.neural_network_file_name.is_some() && epoch != 0 && epoch % self.save_period == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrainingSettings::full_batch().validate().is_ok());
        assert!(TrainingSettings::stochastic().validate().is_ok());
    }

    #[test]
    fn stochastic_defaults_differ_where_expected() {
        let s = TrainingSettings::stochastic();
        assert_eq!(s.loss_goal, 0.0);
        assert_eq!(s.maximum_time, 3600.0);
        assert!(s.reserve_selection_error_history);
        assert_eq!(s.maximum_epochs_number, 1000);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut s = TrainingSettings::full_batch();
        s.maximum_time = -1.0;
        assert!(matches!(s.validate(), Err(TrainingError::Configuration(_))));
    }

    #[test]
    fn zero_save_period_is_rejected() {
        let mut s = TrainingSettings::full_batch();
        s.save_period = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn error_limit_is_fatal_warning_limit_is_not() {
        let limits = NormLimits::default();
        assert!(limits.check_parameters_norm(2.0e6, 0, true).is_ok());
        assert!(matches!(
            limits.check_gradient_norm(1.0e9, 3, false),
            Err(TrainingError::Divergence { quantity: "gradient norm", .. })
        ));
    }

    #[test]
    fn checkpoints_need_a_file_name() {
        let mut s = TrainingSettings::full_batch();
        assert!(!s.is_save_epoch(100));
        s.neural_network_file_name = Some(PathBuf::from("network.bin"));
        assert!(s.is_save_epoch(100));
        assert!(!s.is_save_epoch(0));
        assert!(!s.is_save_epoch(150));
    }
}

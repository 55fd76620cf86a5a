//! # Conjugate Gradient
//!
//! Line-search optimizer whose direction mixes the negative gradient with the
//! previous direction, `d = normalize(-g + beta * d_old)`. The direction
//! restarts from steepest descent every `parameters_count` epochs.

use super::direction::{steepest_descent, DirectionStrategy, OptimizationData};
use super::full_batch::{train_full_batch, FullBatchRun};
use super::line_search::LineSearch;
use super::results::TrainingResults;
use super::settings::{positive, TrainingSettings};
use super::TrainingAlgorithm;
use crate::data::DataSet;
use crate::error::{Result, TrainingError};
use crate::nn::{LossIndex, Network};
use crate::tensor::{ops, TensorData, Vector};
use crate::utils::parallel::ExecutionContext;
use serde::{Deserialize, Serialize};

/// Formula for the conjugate parameter beta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConjugateGradientMethod {
    /// Fletcher-Reeves: `g.g / g_old.g_old`
    #[serde(rename = "FR")]
    FletcherReeves,
    /// Polak-Ribiere: `(g - g_old).g / g_old.g_old`
    #[default]
    #[serde(rename = "PR")]
    PolakRibiere,
}

impl ConjugateGradientMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ConjugateGradientMethod::FletcherReeves => "FR",
            ConjugateGradientMethod::PolakRibiere => "PR",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "FR" => Ok(ConjugateGradientMethod::FletcherReeves),
            "PR" => Ok(ConjugateGradientMethod::PolakRibiere),
            other => Err(TrainingError::configuration(format!(
                "Unknown training direction method: {}",
                other
            ))),
        }
    }

    /// Beta for the given gradient pair, clamped to `[0, 1]`.
    ///
    /// A denominator below machine epsilon gives zero.
    pub fn beta(&self, ctx: &ExecutionContext, old_gradient: &Vector, gradient: &Vector) -> Result<TensorData> {
        let denominator = ops::dot(ctx, old_gradient, old_gradient)?;
        if denominator.abs() < TensorData::EPSILON {
            return Ok(0.0);
        }
        let numerator = match self {
            ConjugateGradientMethod::FletcherReeves => ops::dot(ctx, gradient, gradient)?,
            ConjugateGradientMethod::PolakRibiere => {
                ops::dot(ctx, &(gradient - old_gradient), gradient)?
            }
        };
        Ok((numerator / denominator).clamp(0.0, 1.0))
    }
}

impl DirectionStrategy for ConjugateGradientMethod {
    fn name(&self) -> &'static str {
        ConjugateGradientMethod::name(self)
    }

    fn compute_direction(
        &mut self,
        ctx: &ExecutionContext,
        data: &OptimizationData,
        gradient: &Vector,
    ) -> Result<Vector> {
        let n = data.parameters_count();
        if data.epoch == 0 || n == 0 || data.epoch % n == 0 {
            return Ok(steepest_descent(ctx, gradient));
        }
        let beta = self.beta(ctx, &data.old_gradient, gradient)?;
        let mut direction = -gradient;
        ops::axpy(ctx, beta, &data.old_training_direction, &mut direction)?;
        Ok(ops::normalized(ctx, &direction))
    }
}

/// Conjugate gradient training algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjugateGradient {
    pub training_direction_method: ConjugateGradientMethod,
    pub line_search: LineSearch,
    /// Initial trial step of the first line search.
    pub first_learning_rate: TensorData,
    #[serde(flatten)]
    pub settings: TrainingSettings,
    #[serde(skip)]
    ctx: ExecutionContext,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        ConjugateGradient {
            training_direction_method: ConjugateGradientMethod::default(),
            line_search: LineSearch::default(),
            first_learning_rate: 0.01,
            settings: TrainingSettings::full_batch(),
            ctx: ExecutionContext::default(),
        }
    }
}

impl ConjugateGradient {
    pub fn new(method: ConjugateGradientMethod) -> Self {
        ConjugateGradient {
            training_direction_method: method,
            ..Self::default()
        }
    }

    pub fn with_execution_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn set_training_direction_method(&mut self, name: &str) -> Result<()> {
        self.training_direction_method = ConjugateGradientMethod::from_name(name)?;
        Ok(())
    }

    pub fn set_first_learning_rate(&mut self, value: TensorData) -> Result<()> {
        self.first_learning_rate = positive("first_learning_rate", value)?;
        Ok(())
    }
}

impl TrainingAlgorithm for ConjugateGradient {
    fn algorithm_type(&self) -> &'static str {
        "CONJUGATE_GRADIENT"
    }

    fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut TrainingSettings {
        &mut self.settings
    }

    fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        self.line_search.validate()?;
        positive("first_learning_rate", self.first_learning_rate)?;
        Ok(())
    }

    fn perform_training(
        &self,
        network: &mut dyn Network,
        loss_index: &dyn LossIndex,
        data_set: &dyn DataSet,
    ) -> Result<TrainingResults> {
        self.validate()?;
        let mut strategy = self.training_direction_method;
        let run = FullBatchRun {
            algorithm: self.algorithm_type(),
            settings: &self.settings,
            line_search: &self.line_search,
            first_learning_rate: self.first_learning_rate,
            ctx: &self.ctx,
        };
        train_full_batch(&run, &mut strategy, network, loss_index, data_set)
    }
}

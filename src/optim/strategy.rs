//! # Training Strategy
//!
//! Selects one of the training algorithms and carries the configuration of
//! all three, so a single JSON document can describe a training setup and
//! switch algorithms without losing the others' settings.

use super::conjugate_gradient::ConjugateGradient;
use super::quasi_newton::QuasiNewtonMethod;
use super::results::TrainingResults;
use super::sgd::StochasticGradientDescent;
use super::TrainingAlgorithm;
use crate::data::DataSet;
use crate::error::{Result, TrainingError};
use crate::nn::{LossIndex, Network};
use crate::utils::parallel::ExecutionContext;
use crate::utils::serialization;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Algorithm run by a [`TrainingStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrainingMethod {
    #[serde(rename = "CONJUGATE_GRADIENT")]
    ConjugateGradient,
    #[default]
    #[serde(rename = "QUASI_NEWTON_METHOD")]
    QuasiNewtonMethod,
    #[serde(rename = "STOCHASTIC_GRADIENT_DESCENT")]
    StochasticGradientDescent,
}

impl TrainingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            TrainingMethod::ConjugateGradient => "CONJUGATE_GRADIENT",
            TrainingMethod::QuasiNewtonMethod => "QUASI_NEWTON_METHOD",
            TrainingMethod::StochasticGradientDescent => "STOCHASTIC_GRADIENT_DESCENT",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "CONJUGATE_GRADIENT" => Ok(TrainingMethod::ConjugateGradient),
            "QUASI_NEWTON_METHOD" => Ok(TrainingMethod::QuasiNewtonMethod),
            "STOCHASTIC_GRADIENT_DESCENT" => Ok(TrainingMethod::StochasticGradientDescent),
            other => Err(TrainingError::configuration(format!(
                "Unknown training method: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingStrategy {
    pub training_method: TrainingMethod,
    pub conjugate_gradient: ConjugateGradient,
    pub quasi_newton_method: QuasiNewtonMethod,
    pub stochastic_gradient_descent: StochasticGradientDescent,
}

impl TrainingStrategy {
    pub fn new(training_method: TrainingMethod) -> Self {
        TrainingStrategy {
            training_method,
            ..Self::default()
        }
    }

    /// Runs every algorithm on `ctx`.
    pub fn with_execution_context(self, ctx: ExecutionContext) -> Self {
        TrainingStrategy {
            training_method: self.training_method,
            conjugate_gradient: self.conjugate_gradient.with_execution_context(ctx.clone()),
            quasi_newton_method: self.quasi_newton_method.with_execution_context(ctx.clone()),
            stochastic_gradient_descent: self.stochastic_gradient_descent.with_execution_context(ctx),
        }
    }

    pub fn set_training_method(&mut self, name: &str) -> Result<()> {
        self.training_method = TrainingMethod::from_name(name)?;
        Ok(())
    }

    /// The selected algorithm.
    pub fn algorithm(&self) -> &dyn TrainingAlgorithm {
        match self.training_method {
            TrainingMethod::ConjugateGradient => &self.conjugate_gradient,
            TrainingMethod::QuasiNewtonMethod => &self.quasi_newton_method,
            TrainingMethod::StochasticGradientDescent => &self.stochastic_gradient_descent,
        }
    }

    pub fn algorithm_mut(&mut self) -> &mut dyn TrainingAlgorithm {
        match self.training_method {
            TrainingMethod::ConjugateGradient => &mut self.conjugate_gradient,
            TrainingMethod::QuasiNewtonMethod => &mut self.quasi_newton_method,
            TrainingMethod::StochasticGradientDescent => &mut self.stochastic_gradient_descent,
        }
    }

    /// Switches progress logging on or off for every algorithm.
    pub fn set_display(&mut self, display: bool) {
        self.conjugate_gradient.set_display(display);
        self.conjugate_gradient.line_search.display = display;
        self.quasi_newton_method.set_display(display);
        self.quasi_newton_method.line_search.display = display;
        self.stochastic_gradient_descent.set_display(display);
    }

    /// Validates all three configurations, not only the selected one.
    pub fn validate(&self) -> Result<()> {
        self.conjugate_gradient.validate()?;
        self.quasi_newton_method.validate()?;
        self.stochastic_gradient_descent.validate()?;
        Ok(())
    }

    /// Trains with the selected algorithm.
    pub fn perform_training(
        &self,
        network: &mut dyn Network,
        loss_index: &dyn LossIndex,
        data_set: &dyn DataSet,
    ) -> Result<TrainingResults> {
        debug!(method = self.training_method.name(), loss = loss_index.name(), "dispatching training");
        self.algorithm().perform_training(network, loss_index, data_set)
    }

    // --- JSON Documents ---

    pub fn to_json(&self) -> Result<String> {
        Ok(serialization::to_json(self)?)
    }

    /// Parses and validates a strategy document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let strategy: TrainingStrategy = serialization::from_json(text)?;
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialization::save_json(self, path)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let strategy: TrainingStrategy = serialization::load_json(path)?;
        strategy.validate()?;
        Ok(strategy)
    }
}

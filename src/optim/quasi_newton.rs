//! # Quasi-Newton Method
//!
//! Line-search optimizer that keeps a dense approximation `H` of the inverse
//! Hessian and searches along `normalize(H * (-g))`. `H` is rebuilt from the
//! identity at epoch 0 and whenever the last step or gradient change is
//! degenerate, and otherwise updated with a DFP or BFGS rank-two correction.
//!
//! Memory and time per epoch grow with the square of the parameter count.

use super::direction::{DirectionStrategy, OptimizationData};
use super::full_batch::{train_full_batch, FullBatchRun};
use super::line_search::LineSearch;
use super::results::TrainingResults;
use super::settings::{positive, TrainingSettings};
use super::TrainingAlgorithm;
use crate::data::DataSet;
use crate::error::{Result, TrainingError};
use crate::nn::{LossIndex, Network};
use crate::tensor::{ops, Matrix, TensorData, Vector};
use crate::utils::parallel::ExecutionContext;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rank-two update rule for the inverse Hessian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InverseHessianMethod {
    /// Davidon-Fletcher-Powell.
    #[serde(rename = "DFP")]
    Dfp,
    /// Broyden-Fletcher-Goldfarb-Shanno.
    #[default]
    #[serde(rename = "BFGS")]
    Bfgs,
}

impl InverseHessianMethod {
    pub fn name(&self) -> &'static str {
        match self {
            InverseHessianMethod::Dfp => "DFP",
            InverseHessianMethod::Bfgs => "BFGS",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "DFP" => Ok(InverseHessianMethod::Dfp),
            "BFGS" => Ok(InverseHessianMethod::Bfgs),
            other => Err(TrainingError::configuration(format!(
                "Unknown inverse Hessian approximation method: {}",
                other
            ))),
        }
    }

    /// Applies the update for step `s` and gradient change `y` to `h` in place.
    ///
    /// Returns `false` (leaving `h` untouched) when `s.y` or `y.Hy` is too
    /// small to divide by.
    pub fn update(
        &self,
        ctx: &ExecutionContext,
        h: &mut Matrix,
        s: &Vector,
        y: &Vector,
    ) -> Result<bool> {
        let hy = ops::matrix_vector(ctx, h, y)?;
        let sy = ops::dot(ctx, s, y)?;
        let yhy = ops::dot(ctx, y, &hy)?;
        if sy.abs() < TensorData::EPSILON || yhy.abs() < TensorData::EPSILON {
            return Ok(false);
        }

        // DFP: H + ss'/(s.y) - (Hy)(Hy)'/(y.Hy)
        ops::rank_one_update(ctx, h, 1.0 / sy, s, s)?;
        ops::rank_one_update(ctx, h, -1.0 / yhy, &hy, &hy)?;

        if let InverseHessianMethod::Bfgs = self {
            // + (y.Hy) uu', u = s/(s.y) - Hy/(y.Hy)
            let mut u = s / sy;
            ops::axpy(ctx, -1.0 / yhy, &hy, &mut u)?;
            ops::rank_one_update(ctx, h, yhy, &u, &u)?;
        }
        Ok(true)
    }
}

/// Direction rule holding the inverse-Hessian approximation across epochs.
#[derive(Debug, Clone)]
pub struct QuasiNewtonDirection {
    method: InverseHessianMethod,
    inverse_hessian: Matrix,
}

impl QuasiNewtonDirection {
    pub fn new(method: InverseHessianMethod, parameters_count: usize) -> Self {
        QuasiNewtonDirection {
            method,
            inverse_hessian: ops::identity(parameters_count),
        }
    }

    pub fn inverse_hessian(&self) -> &Matrix {
        &self.inverse_hessian
    }

    fn reset(&mut self, n: usize) {
        self.inverse_hessian = ops::identity(n);
    }
}

impl DirectionStrategy for QuasiNewtonDirection {
    fn name(&self) -> &'static str {
        self.method.name()
    }

    fn compute_direction(
        &mut self,
        ctx: &ExecutionContext,
        data: &OptimizationData,
        gradient: &Vector,
    ) -> Result<Vector> {
        let n = data.parameters_count();
        if data.epoch == 0 || self.inverse_hessian.nrows() != n {
            self.reset(n);
        } else {
            let s = &data.parameters - &data.old_parameters;
            let y = gradient - &data.old_gradient;
            let degenerate = ops::l2_norm(ctx, &s) < TensorData::EPSILON
                || ops::l2_norm(ctx, &y) < TensorData::EPSILON;
            if degenerate || !self.method.update(ctx, &mut self.inverse_hessian, &s, &y)? {
                debug!(epoch = data.epoch, "inverse Hessian reset to identity");
                self.reset(n);
            }
        }
        let direction = ops::matrix_vector(ctx, &self.inverse_hessian, &(-gradient))?;
        Ok(ops::normalized(ctx, &direction))
    }
}

/// Quasi-Newton training algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuasiNewtonMethod {
    pub inverse_hessian_approximation_method: InverseHessianMethod,
    pub line_search: LineSearch,
    pub first_learning_rate: TensorData,
    #[serde(flatten)]
    pub settings: TrainingSettings,
    #[serde(skip)]
    ctx: ExecutionContext,
}

impl Default for QuasiNewtonMethod {
    fn default() -> Self {
        QuasiNewtonMethod {
            inverse_hessian_approximation_method: InverseHessianMethod::default(),
            line_search: LineSearch::default(),
            first_learning_rate: 0.01,
            settings: TrainingSettings::full_batch(),
            ctx: ExecutionContext::default(),
        }
    }
}

impl QuasiNewtonMethod {
    pub fn new(method: InverseHessianMethod) -> Self {
        QuasiNewtonMethod {
            inverse_hessian_approximation_method: method,
            ..Self::default()
        }
    }

    pub fn with_execution_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn set_inverse_hessian_approximation_method(&mut self, name: &str) -> Result<()> {
        self.inverse_hessian_approximation_method = InverseHessianMethod::from_name(name)?;
        Ok(())
    }

    pub fn set_first_learning_rate(&mut self, value: TensorData) -> Result<()> {
        self.first_learning_rate = positive("first_learning_rate", value)?;
        Ok(())
    }
}

impl TrainingAlgorithm for QuasiNewtonMethod {
    fn algorithm_type(&self) -> &'static str {
        "QUASI_NEWTON_METHOD"
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
        let mut strategy = QuasiNewtonDirection::new(
            self.inverse_hessian_approximation_method,
            network.parameters_count(),
        );
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

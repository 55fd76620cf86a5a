//! # Training Directions
//!
//! Working state shared by the line-search optimizers and the trait their
//! direction rules implement. The rule is picked once when the optimizer is
//! configured and called every epoch.

use crate::error::Result;
use crate::tensor::{ops, TensorData, Vector};
use crate::utils::parallel::ExecutionContext;
use std::fmt::Debug;
use tracing::debug;

/// Working state of a full-batch optimizer, owned by one training run.
#[derive(Debug, Clone)]
pub struct OptimizationData {
    pub epoch: usize,
    pub parameters: Vector,
    /// Parameters before the last applied step.
    pub old_parameters: Vector,
    pub old_gradient: Vector,
    pub training_direction: Vector,
    pub old_training_direction: Vector,
    pub parameters_increment: Vector,
    pub learning_rate: TensorData,
    pub old_learning_rate: TensorData,
}

impl OptimizationData {
    pub fn new(parameters: Vector) -> Self {
        let n = parameters.len();
        OptimizationData {
            epoch: 0,
            old_parameters: parameters.clone(),
            parameters,
            old_gradient: Vector::zeros(n),
            training_direction: Vector::zeros(n),
            old_training_direction: Vector::zeros(n),
            parameters_increment: Vector::zeros(n),
            learning_rate: 0.0,
            old_learning_rate: 0.0,
        }
    }

    pub fn parameters_count(&self) -> usize {
        self.parameters.len()
    }
}

/// Rule producing this epoch's search direction from the gradient history.
pub trait DirectionStrategy: Debug {
    fn name(&self) -> &'static str;

    /// Unit direction for the current epoch, before the descent check.
    ///
    /// `data` still holds the previous epoch's old gradient and direction.
    fn compute_direction(
        &mut self,
        ctx: &ExecutionContext,
        data: &OptimizationData,
        gradient: &Vector,
    ) -> Result<Vector>;
}

/// `normalize(-gradient)`.
pub fn steepest_descent(ctx: &ExecutionContext, gradient: &Vector) -> Vector {
    ops::normalized(ctx, &(-gradient))
}

/// Keeps `direction` if it points downhill, otherwise falls back to steepest descent.
pub fn ensure_descent(ctx: &ExecutionContext, gradient: &Vector, direction: Vector) -> Result<Vector> {
    let slope = ops::dot(ctx, gradient, &direction)?;
    if slope < 0.0 {
        return Ok(direction);
    }
    debug!(slope, "direction is not a descent direction, using steepest descent");
    Ok(steepest_descent(ctx, gradient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn uphill_direction_is_replaced() {
        let ctx = ExecutionContext::sequential();
        let gradient = array![3.0, 4.0];
        let direction = ensure_descent(&ctx, &gradient, array![0.6, 0.8]).unwrap();
        assert_eq!(direction, array![-0.6, -0.8]);
    }

    #[test]
    fn downhill_direction_is_kept() {
        let ctx = ExecutionContext::sequential();
        let gradient = array![1.0, 0.0];
        let direction = ensure_descent(&ctx, &gradient, array![-0.5, 0.5]).unwrap();
        assert_eq!(direction, array![-0.5, 0.5]);
    }

    #[test]
    fn new_state_starts_from_given_parameters() {
        let data = OptimizationData::new(array![1.0, 2.0, 3.0]);
        assert_eq!(data.parameters_count(), 3);
        assert_eq!(data.old_parameters, data.parameters);
        assert!(data.old_gradient.iter().all(|g| *g == 0.0));
    }
}

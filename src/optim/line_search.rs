//! # Line Search
//!
//! One-dimensional minimization of the loss along a fixed direction.
//! A step that lowers the loss is first bracketed by golden-ratio expansion
//! (or contraction), then the bracket is refined by golden section or by
//! Brent's parabolic interpolation.

use crate::error::{Result, TrainingError};
use crate::nn::LossEvaluable;
use crate::optim::settings::{non_negative, positive};
use crate::tensor::{ops, TensorData, Vector};
use crate::utils::parallel::ExecutionContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GOLDEN_RATIO: TensorData = 1.618_033_988_749_895;
/// `2 - golden ratio`, the fraction of an interval golden section steps into.
const GOLDEN_SECTION: TensorData = 0.381_966_011_250_105_1;

/// Refinement strategy inside a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineSearchMethod {
    GoldenSection,
    #[default]
    BrentMethod,
}

/// A step length and the loss there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPoint {
    pub step: TensorData,
    pub loss: TensorData,
}

/// Three steps `a < u < b` with `loss(u)` below both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub a: StepPoint,
    pub u: StepPoint,
    pub b: StepPoint,
}

impl Triplet {
    fn length(&self) -> TensorData {
        self.b.step - self.a.step
    }

    fn loss_spread(&self) -> TensorData {
        self.a.loss.max(self.b.loss) - self.u.loss
    }

    /// Replaces one end with `v`, keeping the lowest point in the middle.
    fn shrink(&mut self, v: StepPoint) {
        if v.loss < self.u.loss {
            if v.step < self.u.step {
                self.b = self.u;
            } else {
                self.a = self.u;
            }
            self.u = v;
        } else if v.step < self.u.step {
            self.a = v;
        } else {
            self.b = v;
        }
    }
}

enum Bracket {
    Found(Triplet),
    /// No decrease found above the minimum learning rate.
    Failed,
    /// Still decreasing past the error learning rate.
    Unbounded(StepPoint),
}

/// Step-length selection along a descent direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearch {
    pub method: LineSearchMethod,
    /// Refinement stops once the bracket is narrower than this.
    pub learning_rate_tolerance: TensorData,
    /// Refinement stops once the loss spread in the bracket is below this.
    pub loss_tolerance: TensorData,
    /// Contraction below this step is a failure.
    pub minimum_learning_rate: TensorData,
    pub warning_learning_rate: TensorData,
    pub error_learning_rate: TensorData,
    pub maximum_iterations: usize,
    pub display: bool,
}

impl Default for LineSearch {
    fn default() -> Self {
        LineSearch {
            method: LineSearchMethod::default(),
            learning_rate_tolerance: 1.0e-3,
            loss_tolerance: 1.0e-6,
            minimum_learning_rate: 1.0e-12,
            warning_learning_rate: 1.0e6,
            error_learning_rate: 1.0e9,
            maximum_iterations: 1000,
            display: true,
        }
    }
}

impl LineSearch {
    pub fn new(method: LineSearchMethod) -> Self {
        LineSearch {
            method,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        non_negative("learning_rate_tolerance", self.learning_rate_tolerance)?;
        non_negative("loss_tolerance", self.loss_tolerance)?;
        positive("minimum_learning_rate", self.minimum_learning_rate)?;
        non_negative("warning_learning_rate", self.warning_learning_rate)?;
        non_negative("error_learning_rate", self.error_learning_rate)?;
        if self.maximum_iterations == 0 {
            return Err(TrainingError::configuration(
                "maximum_iterations must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Finds a step along `direction` that lowers the loss below `current_loss`.
    ///
    /// # Arguments
    /// * `ctx`: Execution context for the vector updates.
    /// * `model`: Loss as a function of the parameters.
    /// * `parameters`: Starting point.
    /// * `current_loss`: Loss at `parameters`.
    /// * `direction`: Unit search direction.
    /// * `initial_step`: First trial step, must be positive.
    ///
    /// # Returns
    /// The chosen step and its loss. A zero step (with `current_loss`) means no
    /// decrease was found.
    pub fn find_step(
        &self,
        ctx: &ExecutionContext,
        model: &mut dyn LossEvaluable,
        parameters: &Vector,
        current_loss: TensorData,
        direction: &Vector,
        initial_step: TensorData,
    ) -> Result<StepPoint> {
        if !(initial_step > 0.0) || !initial_step.is_finite() {
            return Err(TrainingError::configuration(format!(
                "Initial step must be positive, got {}",
                initial_step
            )));
        }
        let mut buffer = parameters.clone();
        let mut loss_at = |step: TensorData| -> Result<StepPoint> {
            buffer.assign(parameters);
            ops::axpy(ctx, step, direction, &mut buffer)?;
            Ok(StepPoint {
                step,
                loss: model.evaluate(&buffer)?,
            })
        };

        let origin = StepPoint {
            step: 0.0,
            loss: current_loss,
        };

        let best = match self.bracket(origin, initial_step, &mut loss_at)? {
            Bracket::Failed => {
                debug!(initial_step, "line search found no decrease");
                return Ok(origin);
            }
            Bracket::Unbounded(point) => {
                if self.display {
                    warn!(step = point.step, limit = self.error_learning_rate, "loss still decreasing past error learning rate");
                }
                point
            }
            Bracket::Found(triplet) => self.refine(triplet, &mut loss_at)?,
        };

        if self.display && best.step >= self.warning_learning_rate {
            warn!(step = best.step, limit = self.warning_learning_rate, "learning rate above warning limit");
        }
        Ok(best)
    }

    fn bracket<F>(&self, origin: StepPoint, initial_step: TensorData, loss_at: &mut F) -> Result<Bracket>
    where
        F: FnMut(TensorData) -> Result<StepPoint>,
    {
        let mut u = loss_at(initial_step)?;

        if !(u.loss < origin.loss) {
            // Contract toward zero until the loss drops.
            let mut b = u;
            for _ in 0..self.maximum_iterations {
                let step = b.step / GOLDEN_RATIO;
                if step < self.minimum_learning_rate {
                    return Ok(Bracket::Failed);
                }
                u = loss_at(step)?;
                if u.loss < origin.loss {
                    return Ok(Bracket::Found(Triplet { a: origin, u, b }));
                }
                b = u;
            }
            return Ok(Bracket::Failed);
        }

        // Expand while the loss keeps falling.
        let mut a = origin;
        for _ in 0..self.maximum_iterations {
            let b = loss_at(u.step * GOLDEN_RATIO)?;
            if !(b.loss < u.loss) {
                return Ok(Bracket::Found(Triplet { a, u, b }));
            }
            if b.step > self.error_learning_rate {
                return Ok(Bracket::Unbounded(b));
            }
            a = u;
            u = b;
        }
        Ok(Bracket::Unbounded(u))
    }

    fn refine<F>(&self, mut triplet: Triplet, loss_at: &mut F) -> Result<StepPoint>
    where
        F: FnMut(TensorData) -> Result<StepPoint>,
    {
        for _ in 0..self.maximum_iterations {
            if triplet.length() < self.learning_rate_tolerance
                || triplet.loss_spread() < self.loss_tolerance
            {
                break;
            }
            let step = match self.method {
                LineSearchMethod::GoldenSection => golden_section_step(&triplet),
                LineSearchMethod::BrentMethod => parabolic_step(&triplet, self.learning_rate_tolerance)
                    .unwrap_or_else(|| golden_section_step(&triplet)),
            };
            let v = loss_at(step)?;
            triplet.shrink(v);
        }
        Ok(triplet.u)
    }
}

/// Probe in the larger of the two sub-intervals.
fn golden_section_step(t: &Triplet) -> TensorData {
    if t.u.step - t.a.step > t.b.step - t.u.step {
        t.u.step - GOLDEN_SECTION * (t.u.step - t.a.step)
    } else {
        t.u.step + GOLDEN_SECTION * (t.b.step - t.u.step)
    }
}

/// Minimum of the parabola through the three points, if it lies strictly
/// inside the bracket and not on top of `u`.
fn parabolic_step(t: &Triplet, tolerance: TensorData) -> Option<TensorData> {
    let (a, u, b) = (t.a, t.u, t.b);
    let p = (u.step - a.step) * (u.loss - b.loss);
    let q = (u.step - b.step) * (u.loss - a.loss);
    let denominator = 2.0 * (p - q);
    if denominator.abs() < TensorData::EPSILON {
        return None;
    }
    let numerator = (u.step - a.step) * p - (u.step - b.step) * q;
    let v = u.step - numerator / denominator;

    let margin = 0.1 * tolerance;
    let inside = v > a.step + margin && v < b.step - margin;
    if inside && (v - u.step).abs() > margin && v.is_finite() {
        Some(v)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::FnLoss;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn search(method: LineSearchMethod) -> LineSearch {
        LineSearch {
            display: false,
            ..LineSearch::new(method)
        }
    }

    fn quadratic(p: &Vector) -> TensorData {
        (p[0] - 3.0).powi(2) + 1.0
    }

    #[test]
    fn golden_section_finds_quadratic_minimum() {
        let ctx = ExecutionContext::sequential();
        let mut model = FnLoss(quadratic);
        let point = search(LineSearchMethod::GoldenSection)
            .find_step(&ctx, &mut model, &array![0.0], 10.0, &array![1.0], 0.01)
            .unwrap();
        assert_abs_diff_eq!(point.step, 3.0, epsilon = 1e-2);
        assert!(point.loss <= 10.0);
    }

    #[test]
    fn brent_finds_quadratic_minimum() {
        let ctx = ExecutionContext::sequential();
        let mut model = FnLoss(quadratic);
        let point = search(LineSearchMethod::BrentMethod)
            .find_step(&ctx, &mut model, &array![0.0], 10.0, &array![1.0], 0.01)
            .unwrap();
        assert_abs_diff_eq!(point.step, 3.0, epsilon = 1e-2);
        assert_abs_diff_eq!(point.loss, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn large_initial_step_contracts_into_bracket() {
        let ctx = ExecutionContext::sequential();
        let mut model = FnLoss(quadratic);
        let point = search(LineSearchMethod::BrentMethod)
            .find_step(&ctx, &mut model, &array![0.0], 10.0, &array![1.0], 100.0)
            .unwrap();
        assert_abs_diff_eq!(point.step, 3.0, epsilon = 1e-2);
    }

    #[test]
    fn ascent_direction_returns_zero_step() {
        let ctx = ExecutionContext::sequential();
        let mut model = FnLoss(|p: &Vector| p[0] * p[0]);
        let point = search(LineSearchMethod::GoldenSection)
            .find_step(&ctx, &mut model, &array![0.0], 0.0, &array![1.0], 0.01)
            .unwrap();
        assert_eq!(point, StepPoint { step: 0.0, loss: 0.0 });
    }

    #[test]
    fn unbounded_decrease_stops_past_error_learning_rate() {
        let ctx = ExecutionContext::sequential();
        let mut model = FnLoss(|p: &Vector| -p[0]);
        let line_search = LineSearch {
            error_learning_rate: 1.0e3,
            ..search(LineSearchMethod::BrentMethod)
        };
        let point = line_search
            .find_step(&ctx, &mut model, &array![0.0], 0.0, &array![1.0], 0.01)
            .unwrap();
        assert!(point.step > 1.0e3);
        assert!(point.loss < 0.0);
    }

    #[test]
    fn flat_loss_contraction_gives_up_after_maximum_iterations() {
        let ctx = ExecutionContext::sequential();
        let mut evaluations = 0;
        let mut model = FnLoss(|_: &Vector| {
            evaluations += 1;
            1.0
        });
        let line_search = LineSearch {
            minimum_learning_rate: 0.0,
            maximum_iterations: 50,
            ..search(LineSearchMethod::BrentMethod)
        };
        let point = line_search
            .find_step(&ctx, &mut model, &array![0.0], 1.0, &array![1.0], 0.01)
            .unwrap();
        assert_eq!(point, StepPoint { step: 0.0, loss: 1.0 });
        assert_eq!(evaluations, 51);
    }

    #[test]
    fn zero_minimum_learning_rate_is_rejected() {
        let line_search = LineSearch {
            minimum_learning_rate: 0.0,
            ..LineSearch::default()
        };
        assert!(matches!(line_search.validate(), Err(TrainingError::Configuration(_))));
    }

    #[test]
    fn non_positive_initial_step_is_rejected() {
        let ctx = ExecutionContext::sequential();
        let mut model = FnLoss(quadratic);
        assert!(search(LineSearchMethod::BrentMethod)
            .find_step(&ctx, &mut model, &array![0.0], 10.0, &array![1.0], 0.0)
            .is_err());
    }
}

//! The bounded iteration contract shared by every inverse without a closed form.

use crate::coord::Geographic;
use crate::error::{Conversion, Error, Outcome, Warning};
use tracing::trace;

/// Iteration budget and acceptance thresholds.
///
/// `epsilon` and `error_threshold` are in the units of the iterated quantity
/// (radians for the geocentric latitude refinement, degrees for fixed-point inverses).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationPolicy {
    pub max_iterations: usize,
    pub epsilon: f64,
    pub error_threshold: f64,
}

impl IterationPolicy {
    pub const GEOCENTRIC: IterationPolicy = IterationPolicy {
        max_iterations: 9,
        epsilon: 1e-9,
        error_threshold: 1e-6,
    };

    pub const FIXED_POINT: IterationPolicy = IterationPolicy {
        max_iterations: 12,
        epsilon: 1e-12,
        error_threshold: 1e-5,
    };

    /// Build from dictionary values, substituting defaults for unset (zero) fields.
    pub fn or_default(max_iterations: i16, epsilon: f64, error_threshold: f64) -> Self {
        let d = Self::FIXED_POINT;
        IterationPolicy {
            max_iterations: if max_iterations > 0 {
                max_iterations as usize
            } else {
                d.max_iterations
            },
            epsilon: if epsilon > 0.0 { epsilon } else { d.epsilon },
            error_threshold: if error_threshold > 0.0 {
                error_threshold
            } else {
                d.error_threshold
            },
        }
    }

    /// Classify the final state of an iteration.
    ///
    /// Below `epsilon` the value is clean; below `error_threshold` it is returned with
    /// a [`Warning::NotConverged`]; anything else (including NaN) is fatal.
    pub fn settle<T>(&self, value: T, residual: f64, iterations: usize) -> Conversion<T> {
        if residual < self.epsilon {
            Ok(Outcome::ok(value))
        } else if residual <= self.error_threshold {
            trace!(residual, iterations, "iteration stopped short of epsilon");
            Ok(Outcome::warn(
                value,
                Warning::NotConverged {
                    residual,
                    iterations,
                },
            ))
        } else {
            Err(Error::ConvergenceFatal {
                residual,
                threshold: self.error_threshold,
                iterations,
            })
        }
    }

    /// Invert `forward` by fixed-point iteration.
    ///
    /// Starting from a guess, the forward function is applied, its discrepancy from
    /// `target` is measured and the guess is moved by that discrepancy, until both
    /// horizontal axes agree within `epsilon` degrees.
    pub fn invert<F>(&self, target: Geographic, forward: F) -> Conversion<Geographic>
    where
        F: Fn(&Geographic) -> Result<Geographic, Error>,
    {
        let first = forward(&target)?;
        let mut guess = Geographic::with_height(
            2.0 * target.lng - first.lng,
            2.0 * target.lat - first.lat,
            2.0 * target.hgt - first.hgt,
        );
        let mut residual = f64::INFINITY;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let image = forward(&guess)?;
            residual = target.max_delta(&image);
            if !residual.is_finite() {
                break;
            }
            guess.lng += target.lng - image.lng;
            guess.lat += target.lat - image.lat;
            guess.hgt += target.hgt - image.hgt;
            if residual < self.epsilon {
                break;
            }
        }
        self.settle(guess, residual, iterations)
    }
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self::FIXED_POINT
    }
}

//! Utilization throttle
//!
//! Maps vault utilization (share of circulating essence locked in the
//! vault) to an effectiveness ratio. Rewards pulled from the flow ledger
//! are multiplied by the effectiveness; the remainder accumulates as an
//! undistributed pool. The curve is a step function: lookup takes the
//! entry with the greatest utilization threshold not above the input.

use ember_core::error::{EmberError, Result};
use serde::{Deserialize, Serialize};

use crate::constants::ONE;

/// Step curve from utilization to effectiveness, both in 1e18 fixed point
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationCurve {
    /// (utilization threshold, effectiveness) pairs, strictly increasing
    /// in threshold
    steps: Vec<(u128, u128)>,
}

impl Default for UtilizationCurve {
    fn default() -> Self {
        Self {
            steps: vec![
                (0, 0),
                (ONE / 10, 0),
                (ONE * 3 / 10, ONE / 2),
                (ONE * 4 / 10, ONE * 6 / 10),
                (ONE / 2, ONE * 8 / 10),
                (ONE * 6 / 10, ONE),
            ],
        }
    }
}

impl UtilizationCurve {
    /// Build a curve from explicit steps
    ///
    /// Thresholds must be strictly increasing, start at zero, and
    /// effectiveness may not exceed 1.0.
    pub fn new(steps: Vec<(u128, u128)>) -> Result<Self> {
        if steps.is_empty() || steps[0].0 != 0 {
            return Err(EmberError::InvalidCurve);
        }
        for window in steps.windows(2) {
            if window[1].0 <= window[0].0 {
                return Err(EmberError::InvalidCurve);
            }
        }
        if steps.iter().any(|&(_, eff)| eff > ONE) {
            return Err(EmberError::InvalidCurve);
        }
        Ok(Self { steps })
    }

    /// Effectiveness for a utilization value (floor lookup)
    pub fn effectiveness(&self, utilization: u128) -> u128 {
        let mut current = 0;
        for &(threshold, effectiveness) in &self.steps {
            if utilization >= threshold {
                current = effectiveness;
            } else {
                break;
            }
        }
        current
    }

    /// Curve steps
    pub fn steps(&self) -> &[(u128, u128)] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_curve_floor_lookup() {
        let curve = UtilizationCurve::default();
        assert_eq!(curve.effectiveness(0), 0);
        assert_eq!(curve.effectiveness(ONE / 20), 0);
        assert_eq!(curve.effectiveness(ONE / 10), 0);
        assert_eq!(curve.effectiveness(ONE * 3 / 10), ONE / 2);
        assert_eq!(curve.effectiveness(ONE * 35 / 100), ONE / 2);
        assert_eq!(curve.effectiveness(ONE * 4 / 10), ONE * 6 / 10);
        assert_eq!(curve.effectiveness(ONE / 2), ONE * 8 / 10);
        assert_eq!(curve.effectiveness(ONE * 6 / 10), ONE);
        // saturates past the last step
        assert_eq!(curve.effectiveness(ONE * 2), ONE);
    }

    #[test]
    fn test_rejects_malformed_curves() {
        assert!(UtilizationCurve::new(vec![]).is_err());
        // must start at zero
        assert!(UtilizationCurve::new(vec![(ONE / 10, 0)]).is_err());
        // thresholds must strictly increase
        assert!(UtilizationCurve::new(vec![(0, 0), (ONE / 10, 0), (ONE / 10, ONE)]).is_err());
        // effectiveness capped at 1.0
        assert!(UtilizationCurve::new(vec![(0, 0), (ONE / 2, 2 * ONE)]).is_err());

        let curve = UtilizationCurve::new(vec![(0, 0), (ONE / 2, ONE)]).unwrap();
        assert_eq!(curve.effectiveness(ONE / 4), 0);
        assert_eq!(curve.effectiveness(ONE / 2), ONE);
    }
}

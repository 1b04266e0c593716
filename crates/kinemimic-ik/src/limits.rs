//! Joint position limits and angle harmonization.
//!
//! Limits are closed intervals. Angular joint values are compared against
//! them only after [`harmonize`] has brought each angle into `[-2π, 2π]`.

use std::f64::consts::TAU;

use crate::chain::KinematicChain;
use crate::error::LimitsError;

/// Per-joint `[lower, upper]` position limits over one vector space
/// (either the full chain or its reduced, active-only form).
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimits {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl JointLimits {
    /// Build limits from parallel lower/upper vectors.
    ///
    /// Bounds may be infinite, but every interval must be non-empty.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, LimitsError> {
        if lower.len() != upper.len() {
            return Err(LimitsError::LengthMismatch {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        for (joint, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            // `!(lo <= hi)` also rejects NaN bounds.
            if !(lo <= hi) {
                return Err(LimitsError::Inverted {
                    joint,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// The limits carried by each joint of `chain`, in chain order.
    pub fn from_chain(chain: &KinematicChain) -> Self {
        let (lower, upper) = chain
            .joints()
            .iter()
            .map(|j| (j.lower_limit, j.upper_limit))
            .unzip();
        Self { lower, upper }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Whether `value` lies in the closed interval of joint `index`.
    pub fn contains(&self, index: usize, value: f64) -> bool {
        self.lower[index] <= value && value <= self.upper[index]
    }

    /// `true` iff every entry of `q` lies within its closed interval.
    ///
    /// A length mismatch never obeys.
    pub fn obeys(&self, q: &[f64]) -> bool {
        q.len() == self.len() && q.iter().enumerate().all(|(i, &v)| self.contains(i, v))
    }

    /// Clamp every out-of-range entry of `q` to its nearest bound, skipping
    /// entries flagged in `frozen`. Returns how many entries moved.
    ///
    /// # Panics
    ///
    /// Panics if `q` is longer than the limits.
    pub fn clamp_violations(&self, q: &mut [f64], frozen: &[bool]) -> usize {
        let mut clamped = 0;
        for (i, value) in q.iter_mut().enumerate() {
            if frozen.get(i).copied().unwrap_or(false) || self.contains(i, *value) {
                continue;
            }
            *value = value.clamp(self.lower[i], self.upper[i]);
            clamped += 1;
        }
        clamped
    }

    /// Mutable access for narrowing intervals while deriving reduced limits.
    pub(crate) fn bounds_mut(&mut self, index: usize) -> (&mut f64, &mut f64) {
        (&mut self.lower[index], &mut self.upper[index])
    }
}

/// Bring a single angle into `[-2π, 2π]` by removing whole turns.
///
/// Values already in range, and non-finite values, are returned unchanged.
pub fn harmonize_angle(angle: f64) -> f64 {
    if angle.abs() > TAU {
        angle % TAU
    } else {
        angle
    }
}

/// Harmonize every angular joint of a full vector in place.
///
/// Prismatic joints are left untouched.
pub fn harmonize(chain: &KinematicChain, q: &mut [f64]) {
    for (joint, value) in chain.joints().iter().zip(q.iter_mut()) {
        if joint.kind.is_angular() {
            *value = harmonize_angle(*value);
        }
    }
}

/// `true` iff every joint value in `q` lies in its closed limit interval.
pub fn obeys_limits(limits: &JointLimits, q: &[f64]) -> bool {
    limits.obeys(q)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

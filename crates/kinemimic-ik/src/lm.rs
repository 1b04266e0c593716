//! Levenberg-Marquardt position solver.
//!
//! Minimizes the weighted pose residual between the end-effector and a
//! target frame over whatever joint vector the [`ForwardKinematics`] model
//! takes. The IK core hands it the reduced (active-only) model, so the
//! engine itself knows nothing about mimic joints or retries.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λI) Δq = Jᵀe
//! ```
//!
//! accepting the step when it lowers the residual (λ shrinks) and retrying
//! with a larger λ otherwise.

use nalgebra::{DMatrix, DVector, Isometry3};
use tracing::trace;

use crate::config::{IkConfig, LmConfig};
use crate::error::KinematicsError;
use crate::kinematics::ForwardKinematics;
use crate::limits::JointLimits;

/// Which part of the pose error the solver minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostMode {
    /// Position and orientation (6 residual rows).
    #[default]
    Pose,
    /// Position only (3 residual rows).
    Position,
}

impl CostMode {
    const fn rows(self) -> usize {
        match self {
            Self::Pose => 6,
            Self::Position => 3,
        }
    }
}

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStatus {
    /// Residual norm fell below `eps`.
    Converged,
    /// Iteration budget spent, or no step could lower the residual.
    MaxIterations,
    /// The Jacobian gives no descent direction at a non-converged iterate.
    Singular,
}

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions<'a> {
    /// Convergence threshold on the weighted residual norm.
    pub eps: f64,
    pub cost: CostMode,
    /// If set, every step is projected back into these limits.
    pub limits: Option<&'a JointLimits>,
    /// Joints flagged `true` never move. Shorter than the joint vector means
    /// the remaining joints are free.
    pub locked: &'a [bool],
}

impl Default for LmOptions<'_> {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            cost: CostMode::Pose,
            limits: None,
            locked: &[],
        }
    }
}

/// Result of one LM solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LmOutcome {
    /// Final joint vector.
    pub joint_positions: Vec<f64>,
    pub status: LmStatus,
    /// Outer iterations used.
    pub iterations: u32,
    /// Weighted residual norm at `joint_positions`.
    pub error_norm: f64,
}

/// An unconstrained (or limit-projected) IK position solver.
pub trait PositionSolver {
    /// Refine `q_init` towards `target`.
    ///
    /// Errors only on malformed input; numerical failure is reported through
    /// [`LmOutcome::status`].
    fn solve(
        &self,
        model: &dyn ForwardKinematics,
        q_init: &[f64],
        target: &Isometry3<f64>,
        options: &LmOptions<'_>,
    ) -> Result<LmOutcome, KinematicsError>;
}

/// Built-in Levenberg-Marquardt engine.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new solver with the given configuration.
    pub const fn new(config: LmConfig) -> Self {
        Self { config }
    }

    /// Create a solver with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(LmConfig::default())
    }

    /// Create a solver from the `[lm]` table of an IK configuration.
    pub fn from_ik_config(config: &IkConfig) -> Self {
        Self::new(config.lm.clone())
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Residual `W · (target ⊖ pose)`, position rows first.
    fn residual(&self, pose: &Isometry3<f64>, target: &Isometry3<f64>, cost: CostMode) -> DVector<f64> {
        let pos_err = target.translation.vector - pose.translation.vector;
        match cost {
            CostMode::Position => DVector::from_column_slice(pos_err.as_slice()),
            CostMode::Pose => {
                let ori_err = (target.rotation * pose.rotation.inverse()).scaled_axis()
                    * self.config.orientation_weight;
                DVector::from_iterator(6, pos_err.iter().chain(ori_err.iter()).copied())
            }
        }
    }

    /// Jacobian rows matching [`Self::residual`], with locked columns zeroed.
    fn weighted_jacobian(&self, full: DMatrix<f64>, cost: CostMode, free: &[bool]) -> DMatrix<f64> {
        let mut jacobian = full.rows(0, cost.rows()).into_owned();
        if cost == CostMode::Pose {
            jacobian
                .rows_mut(3, 3)
                .scale_mut(self.config.orientation_weight);
        }
        for (i, &is_free) in free.iter().enumerate() {
            if !is_free {
                jacobian.column_mut(i).fill(0.0);
            }
        }
        jacobian
    }
}

impl PositionSolver for LevenbergMarquardt {
    fn solve(
        &self,
        model: &dyn ForwardKinematics,
        q_init: &[f64],
        target: &Isometry3<f64>,
        options: &LmOptions<'_>,
    ) -> Result<LmOutcome, KinematicsError> {
        let n = model.num_joints();
        if q_init.len() != n {
            return Err(KinematicsError::DimensionMismatch {
                expected: n,
                got: q_init.len(),
            });
        }
        if let Some(limits) = options.limits.filter(|l| l.len() != n) {
            return Err(KinematicsError::DimensionMismatch {
                expected: n,
                got: limits.len(),
            });
        }
        let free: Vec<bool> = (0..n)
            .map(|i| !options.locked.get(i).copied().unwrap_or(false))
            .collect();
        let frozen: Vec<bool> = free.iter().map(|f| !f).collect();

        let mut q = q_init.to_vec();
        let mut residual = self.residual(&model.joint_to_cart(&q)?, target, options.cost);
        let mut error = residual.norm();
        let mut lambda = self.config.initial_damping;

        let outcome = |q: Vec<f64>, status, iterations, error_norm| LmOutcome {
            joint_positions: q,
            status,
            iterations,
            error_norm,
        };

        for iteration in 0..self.config.max_iterations {
            if error < options.eps {
                return Ok(outcome(q, LmStatus::Converged, iteration, error));
            }

            let jacobian = self.weighted_jacobian(model.jacobian(&q)?, options.cost, &free);
            let jt = jacobian.transpose();
            let gradient = &jt * &residual;
            if gradient.norm() <= self.config.gradient_tolerance {
                trace!(iteration, error, "vanishing gradient");
                return Ok(outcome(q, LmStatus::Singular, iteration, error));
            }
            let jtj = &jt * &jacobian;

            // Inner loop: raise lambda until a step lowers the residual.
            let mut improved = false;
            while lambda <= self.config.max_damping {
                let damped = &jtj + DMatrix::identity(n, n) * lambda;
                let Some(cholesky) = damped.cholesky() else {
                    return Ok(outcome(q, LmStatus::Singular, iteration, error));
                };
                let step = cholesky.solve(&gradient);

                let mut candidate = q.clone();
                for (i, value) in candidate.iter_mut().enumerate() {
                    if free[i] {
                        *value += step[i];
                    }
                }
                if let Some(limits) = options.limits {
                    limits.clamp_violations(&mut candidate, &frozen);
                }

                let candidate_residual =
                    self.residual(&model.joint_to_cart(&candidate)?, target, options.cost);
                let candidate_error = candidate_residual.norm();

                if candidate_error < error {
                    q = candidate;
                    residual = candidate_residual;
                    error = candidate_error;
                    lambda *= self.config.damping_decrease;
                    improved = true;
                    break;
                }
                lambda *= self.config.damping_increase;
            }

            trace!(iteration, error, lambda, improved, "lm iteration");
            if !improved {
                // No damping level lowers the residual: a local minimum, or a
                // limit projection pinning the iterate.
                let status = if error < options.eps {
                    LmStatus::Converged
                } else {
                    LmStatus::MaxIterations
                };
                return Ok(outcome(q, status, iteration + 1, error));
            }
        }

        let status = if error < options.eps {
            LmStatus::Converged
        } else {
            LmStatus::MaxIterations
        };
        Ok(outcome(q, status, self.config.max_iterations, error))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

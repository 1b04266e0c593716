//! Joint-limit and mimic-aware IK solver.
//!
//! Wraps a [`PositionSolver`] so that it searches only over active joints,
//! then checks the expanded, harmonized answer against the full-chain limits
//! and retries from a clamped start when it falls outside them.
//!
//! ```text
//! q_init ─► reduce ─► LM solve ─► expand ─► harmonize ─► limits ok? ─► Ok
//!              ▲                                             │ no
//!              └──── clamp into reduced limits ◄─────────────┘
//! ```

use nalgebra::Isometry3;
use tracing::{debug, warn};

use crate::chain::KinematicChain;
use crate::config::IkConfig;
use crate::error::{IkError, MimicError};
use crate::kinematics::{ForwardKinematics, MimicKinematics};
use crate::limits::{harmonize, JointLimits};
use crate::lm::{CostMode, LmOptions, LmStatus, PositionSolver};
use crate::mimic::{JointMimic, MimicMap};

/// How good an accepted solution is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The LM engine converged below `eps`.
    Success,
    /// The LM engine ran out of iterations, but the result obeys the limits.
    SuccessApproximate,
}

/// An accepted IK answer.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Full joint vector, harmonized and within limits.
    pub joint_positions: Vec<f64>,
    pub status: SolveStatus,
    /// LM solves performed, including the successful one.
    pub attempts: u32,
    /// LM iterations summed over all attempts.
    pub lm_iterations: u32,
    /// Residual norm reported by the final LM solve.
    pub error_norm: f64,
}

impl IkSolution {
    pub fn is_exact(&self) -> bool {
        self.status == SolveStatus::Success
    }
}

/// Limit-and-mimic-aware IK over a borrowed chain and LM engine.
///
/// One instance serves any number of sequential requests. The solve methods
/// take `&mut self` because they reuse internal buffers.
pub struct JlMimicSolver<'a, F: ?Sized, S: ?Sized> {
    chain: &'a KinematicChain,
    limits: &'a JointLimits,
    fk: &'a F,
    lm: &'a S,
    config: IkConfig,

    mimic: Option<MimicMap>,
    reduced_limits: Option<JointLimits>,
    redundant: Vec<usize>,

    // Scratch
    q_reduced: Vec<f64>,
    q_full: Vec<f64>,
    locked: Vec<bool>,
}

impl<'a, F, S> JlMimicSolver<'a, F, S>
where
    F: ForwardKinematics + ?Sized,
    S: PositionSolver + ?Sized,
{
    /// Create a solver for `chain`.
    ///
    /// `limits` and `fk` must both cover every chain joint. Mimic joints have
    /// to be configured with [`set_mimic_joints`](Self::set_mimic_joints)
    /// before the first solve.
    pub fn new(
        chain: &'a KinematicChain,
        limits: &'a JointLimits,
        fk: &'a F,
        lm: &'a S,
        config: IkConfig,
    ) -> Result<Self, IkError> {
        config.validate()?;
        let dof = chain.dof();
        if limits.len() != dof {
            return Err(IkError::DimensionMismatch {
                expected: dof,
                got: limits.len(),
            });
        }
        if fk.num_joints() != dof {
            return Err(IkError::DimensionMismatch {
                expected: dof,
                got: fk.num_joints(),
            });
        }

        Ok(Self {
            chain,
            limits,
            fk,
            lm,
            config,
            mimic: None,
            reduced_limits: None,
            redundant: Vec::new(),
            q_reduced: Vec::with_capacity(dof),
            q_full: Vec::with_capacity(dof),
            locked: Vec::with_capacity(dof),
        })
    }

    pub fn chain(&self) -> &KinematicChain {
        self.chain
    }

    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    /// The configured mimic map, if any.
    pub fn mimic_map(&self) -> Option<&MimicMap> {
        self.mimic.as_ref()
    }

    /// Limits over the reduced space, derived when the mimic map was set.
    pub fn reduced_limits(&self) -> Option<&JointLimits> {
        self.reduced_limits.as_ref()
    }

    /// Reduced indices that `cart_to_jnt_advanced(.., true)` holds fixed.
    pub fn redundant_joints(&self) -> &[usize] {
        &self.redundant
    }

    /// Install one mimic descriptor per chain joint.
    ///
    /// Replaces any previous map and clears the redundant-joint selection,
    /// whose indices referred to the old reduced space. On error the solver
    /// is left unchanged.
    pub fn set_mimic_joints(&mut self, joints: Vec<JointMimic>) -> Result<(), IkError> {
        let map = MimicMap::for_chain(self.chain, joints)?;
        self.set_mimic_map(map)
    }

    /// Like [`set_mimic_joints`](Self::set_mimic_joints) for an already
    /// validated map, e.g. one built by [`MimicMap::from_model`].
    pub fn set_mimic_map(&mut self, map: MimicMap) -> Result<(), IkError> {
        if map.len() != self.chain.dof() {
            return Err(MimicError::CountMismatch {
                expected: self.chain.dof(),
                got: map.len(),
            }
            .into());
        }
        let reduced_limits = map.reduced_limits(self.limits)?;
        debug!(
            dof = map.len(),
            reduced_dof = map.reduced_dof(),
            "mimic joints configured"
        );
        self.mimic = Some(map);
        self.reduced_limits = Some(reduced_limits);
        self.redundant.clear();
        Ok(())
    }

    /// Select the reduced indices that a locked solve keeps at their
    /// initial value. Replaces the previous selection.
    pub fn set_redundant_joints(&mut self, indices: &[usize]) -> Result<(), IkError> {
        let reduced_dof = self
            .mimic
            .as_ref()
            .ok_or(IkError::MimicNotConfigured)?
            .reduced_dof();
        if let Some(&index) = indices.iter().find(|&&i| i >= reduced_dof) {
            return Err(IkError::InvalidRedundantJoint { index, reduced_dof });
        }
        self.redundant.clear();
        self.redundant.extend_from_slice(indices);
        self.redundant.sort_unstable();
        self.redundant.dedup();
        Ok(())
    }

    /// Solve for a full joint vector reaching `target`, starting at `q_init`.
    pub fn cart_to_jnt(
        &mut self,
        q_init: &[f64],
        target: &Isometry3<f64>,
    ) -> Result<IkSolution, IkError> {
        self.cart_to_jnt_advanced(q_init, target, false)
    }

    /// [`cart_to_jnt`](Self::cart_to_jnt), optionally holding the selected
    /// redundant joints at their `q_init` values for the whole solve.
    ///
    /// Locked joints keep their exact `q_init` value, whole turns included,
    /// and are never clamped. A locked joint that starts out of limits makes
    /// the request fail with [`IkError::LimitViolation`] on the first attempt.
    pub fn cart_to_jnt_advanced(
        &mut self,
        q_init: &[f64],
        target: &Isometry3<f64>,
        lock_redundant_joints: bool,
    ) -> Result<IkSolution, IkError> {
        let (Some(mimic), Some(reduced_limits)) = (&self.mimic, &self.reduced_limits) else {
            return Err(IkError::MimicNotConfigured);
        };
        validate_request(self.chain.dof(), q_init, target)?;

        mimic.reduce_into(q_init, &mut self.q_reduced)?;
        self.locked.clear();
        self.locked.resize(mimic.reduced_dof(), false);
        if lock_redundant_joints {
            for &i in &self.redundant {
                self.locked[i] = true;
            }
        }

        let model = MimicKinematics::new(self.fk, mimic);
        let options = LmOptions {
            eps: self.config.eps,
            cost: if self.config.position_ik {
                CostMode::Position
            } else {
                CostMode::Pose
            },
            limits: self.config.project_limits.then_some(reduced_limits),
            locked: &self.locked,
        };

        let mut lm_iterations = 0u32;
        for attempt in 1..=self.config.max_attempts {
            let outcome = self.lm.solve(&model, &self.q_reduced, target, &options)?;
            lm_iterations = lm_iterations.saturating_add(outcome.iterations);

            if outcome.status == LmStatus::Singular {
                warn!(attempt, error = outcome.error_norm, "IK hit a singular configuration");
                return Err(IkError::Singular { attempt });
            }

            mimic.expand_into(&outcome.joint_positions, &mut self.q_full)?;
            harmonize(self.chain, &mut self.q_full);
            restore_locked(mimic, &self.locked, q_init, &mut self.q_full);

            if self.limits.obeys(&self.q_full) {
                let status = match outcome.status {
                    LmStatus::Converged => SolveStatus::Success,
                    _ => SolveStatus::SuccessApproximate,
                };
                debug!(attempt, lm_iterations, ?status, "IK solved");
                return Ok(IkSolution {
                    joint_positions: self.q_full.clone(),
                    status,
                    attempts: attempt,
                    lm_iterations,
                    error_norm: outcome.error_norm,
                });
            }

            // Restart from the harmonized answer, pulled back into range.
            mimic.reduce_into(&self.q_full, &mut self.q_reduced)?;
            let clamped = reduced_limits.clamp_violations(&mut self.q_reduced, &self.locked);
            if clamped == 0 {
                // Nothing moved, so another attempt would repeat this one.
                warn!(attempt, "IK gave up: joint limits violated and nothing to clamp");
                return Err(IkError::LimitViolation {
                    attempts: attempt,
                    joint_positions: self.q_full.clone(),
                });
            }
            debug!(attempt, clamped, "IK result outside joint limits, retrying");
        }

        warn!(
            attempts = self.config.max_attempts,
            "IK gave up: joint limits still violated"
        );
        Err(IkError::LimitViolation {
            attempts: self.config.max_attempts,
            joint_positions: self.q_full.clone(),
        })
    }
}

/// Put locked active joints back to their `q_init` value after harmonization.
fn restore_locked(mimic: &MimicMap, locked: &[bool], q_init: &[f64], q_full: &mut [f64]) {
    for (j, joint) in mimic.joints().iter().enumerate() {
        if let JointMimic::Active { reduced_index } = *joint {
            if locked[reduced_index] {
                q_full[j] = q_init[j];
            }
        }
    }
}

fn validate_request(dof: usize, q_init: &[f64], target: &Isometry3<f64>) -> Result<(), IkError> {
    if q_init.len() != dof {
        return Err(IkError::DimensionMismatch {
            expected: dof,
            got: q_init.len(),
        });
    }
    if let Some(joint) = q_init.iter().position(|v| !v.is_finite()) {
        return Err(IkError::NonFiniteInput { joint });
    }
    let finite = target.translation.vector.iter().all(|v| v.is_finite())
        && target.rotation.coords.iter().all(|v| v.is_finite());
    if !finite {
        return Err(IkError::NonFiniteTarget);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Forward-kinematics seam between the IK core and whatever computes poses.
//!
//! [`KinematicChain`] is the stock implementation over full joint vectors.
//! [`MimicKinematics`] wraps any full-space implementation and presents it
//! over the reduced (active-only) vector, which is the space the LM engine
//! actually searches.

use nalgebra::{DMatrix, Isometry3};

use crate::chain::KinematicChain;
use crate::error::KinematicsError;
use crate::mimic::MimicMap;

/// Joint vector → end-effector frame, plus its geometric Jacobian.
pub trait ForwardKinematics {
    /// Expected joint-vector length.
    fn num_joints(&self) -> usize;

    /// End-effector pose in the base frame.
    fn joint_to_cart(&self, q: &[f64]) -> Result<Isometry3<f64>, KinematicsError>;

    /// 6×n geometric Jacobian in the base frame (linear rows first).
    fn jacobian(&self, q: &[f64]) -> Result<DMatrix<f64>, KinematicsError>;
}

fn check_len(expected: usize, q: &[f64]) -> Result<(), KinematicsError> {
    if q.len() == expected {
        Ok(())
    } else {
        Err(KinematicsError::DimensionMismatch {
            expected,
            got: q.len(),
        })
    }
}

impl ForwardKinematics for KinematicChain {
    fn num_joints(&self) -> usize {
        self.dof()
    }

    fn joint_to_cart(&self, q: &[f64]) -> Result<Isometry3<f64>, KinematicsError> {
        check_len(self.dof(), q)?;
        Ok(self.forward_kinematics(q))
    }

    fn jacobian(&self, q: &[f64]) -> Result<DMatrix<f64>, KinematicsError> {
        check_len(self.dof(), q)?;
        Ok(self.geometric_jacobian(q))
    }
}

/// Reduced-space view of a full-space [`ForwardKinematics`].
///
/// `pose(r) = fk(expand(r))` and `J_r = J_full · E`, where column `a` of the
/// expansion matrix `E` holds each joint's multiplier on rows that follow
/// reduced slot `a`.
pub struct MimicKinematics<'a, F: ?Sized> {
    fk: &'a F,
    mimic: &'a MimicMap,
}

impl<'a, F: ForwardKinematics + ?Sized> MimicKinematics<'a, F> {
    pub fn new(fk: &'a F, mimic: &'a MimicMap) -> Self {
        Self { fk, mimic }
    }

    pub fn mimic(&self) -> &MimicMap {
        self.mimic
    }
}

impl<F: ForwardKinematics + ?Sized> ForwardKinematics for MimicKinematics<'_, F> {
    fn num_joints(&self) -> usize {
        self.mimic.reduced_dof()
    }

    fn joint_to_cart(&self, q: &[f64]) -> Result<Isometry3<f64>, KinematicsError> {
        let full = self.mimic.expand(q)?;
        self.fk.joint_to_cart(&full)
    }

    fn jacobian(&self, q: &[f64]) -> Result<DMatrix<f64>, KinematicsError> {
        let full = self.mimic.expand(q)?;
        let full_jacobian = self.fk.jacobian(&full)?;

        let mut reduced = DMatrix::zeros(full_jacobian.nrows(), self.mimic.reduced_dof());
        for (j, mimic) in self.mimic.joints().iter().enumerate() {
            let (multiplier, _) = mimic.coefficients();
            let mut column = reduced.column_mut(mimic.reduced_index());
            column.axpy(multiplier, &full_jacobian.column(j), 1.0);
        }
        Ok(reduced)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

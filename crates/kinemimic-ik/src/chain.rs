//! Serial kinematic chain.
//!
//! A [`KinematicChain`] is an ordered list of movable joints from the base
//! link to the end-effector link. It stores the static transforms (origins),
//! joint axes and position limits needed for forward kinematics and
//! Jacobian computation. Fixed joints never appear as entries: their
//! transforms are folded into the next movable joint's origin, or into the
//! trailing end-effector offset.

use std::f64::consts::TAU;

use nalgebra::{DMatrix, Isometry3, Matrix3, Translation3, UnitQuaternion, UnitVector3, Vector3};

use kinemimic_urdf::{JointType, Origin, RobotModel};

use crate::error::ChainError;

/// Motion type of a movable joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    /// Rotation about the axis, bounded by limits.
    Revolute,
    /// Rotation about the axis with no physical stop.
    Continuous,
    /// Translation along the axis.
    Prismatic,
}

impl JointKind {
    /// Whether the joint value is an angle that wraps every full turn.
    pub const fn is_angular(self) -> bool {
        matches!(self, Self::Revolute | Self::Continuous)
    }
}

/// A single movable joint in the chain.
#[derive(Debug, Clone)]
pub struct ChainJoint {
    /// Joint name (from URDF, or caller-chosen).
    pub name: String,
    /// Motion type.
    pub kind: JointKind,
    /// Static transform from parent link frame to this joint frame.
    pub origin: Isometry3<f64>,
    /// Joint axis in the joint's local frame.
    pub axis: UnitVector3<f64>,
    /// Lower position limit (rad or m).
    pub lower_limit: f64,
    /// Upper position limit (rad or m).
    pub upper_limit: f64,
}

impl ChainJoint {
    pub fn revolute(
        name: impl Into<String>,
        origin: Isometry3<f64>,
        axis: Vector3<f64>,
        lower_limit: f64,
        upper_limit: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: JointKind::Revolute,
            origin,
            axis: UnitVector3::new_normalize(axis),
            lower_limit,
            upper_limit,
        }
    }

    /// A continuous joint; its limits span the harmonized range `[-2π, 2π]`.
    pub fn continuous(name: impl Into<String>, origin: Isometry3<f64>, axis: Vector3<f64>) -> Self {
        Self {
            kind: JointKind::Continuous,
            ..Self::revolute(name, origin, axis, -TAU, TAU)
        }
    }

    pub fn prismatic(
        name: impl Into<String>,
        origin: Isometry3<f64>,
        axis: Vector3<f64>,
        lower_limit: f64,
        upper_limit: f64,
    ) -> Self {
        Self {
            kind: JointKind::Prismatic,
            ..Self::revolute(name, origin, axis, lower_limit, upper_limit)
        }
    }

    /// Transform produced by moving this joint to `position`.
    fn motion(&self, position: f64) -> Isometry3<f64> {
        match self.kind {
            JointKind::Prismatic => Isometry3::from_parts(
                Translation3::from(self.axis.into_inner() * position),
                UnitQuaternion::identity(),
            ),
            JointKind::Revolute | JointKind::Continuous => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&self.axis, position),
            ),
        }
    }
}

/// An ordered kinematic chain from base to end-effector.
///
/// Immutable once built; share it by reference between the forward
/// kinematics, the LM engine and any number of IK solvers.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    /// Ordered joints from base to end-effector.
    joints: Vec<ChainJoint>,
    /// Transform from the last joint's child link to the end-effector frame.
    /// Accounts for any trailing fixed joints.
    ee_offset: Isometry3<f64>,
}

impl KinematicChain {
    /// Build a chain from explicit joints and a trailing end-effector offset.
    pub fn new(joints: Vec<ChainJoint>, ee_offset: Isometry3<f64>) -> Self {
        Self { joints, ee_offset }
    }

    /// Build a kinematic chain from a [`RobotModel`].
    ///
    /// Traces from the model's root link to `ee_link`, collecting movable
    /// joints. Fixed joints are folded into the accumulated transform.
    /// Angular joints without position limits get the harmonized range
    /// `[-2π, 2π]`; unlimited prismatic joints are unbounded.
    pub fn from_model(model: &RobotModel, ee_link: &str) -> Result<Self, ChainError> {
        model.link(ee_link)?;
        let path = model.path_between(&model.root_link, ee_link).ok_or_else(|| {
            ChainError::UnreachableLink {
                root: model.root_link.clone(),
                target: ee_link.to_string(),
            }
        })?;

        let mut joints = Vec::new();
        let mut accumulated_fixed = Isometry3::identity();

        for joint_name in &path {
            let joint = model.joint(joint_name)?;
            let joint_origin = origin_to_isometry(&joint.origin);

            let kind = match joint.joint_type {
                JointType::Revolute => JointKind::Revolute,
                JointType::Continuous => JointKind::Continuous,
                JointType::Prismatic => JointKind::Prismatic,
                // Floating and planar joints are not serial 1-DOF joints; treat
                // them as rigid like fixed joints.
                JointType::Fixed | JointType::Floating | JointType::Planar => {
                    accumulated_fixed *= joint_origin;
                    continue;
                }
            };

            // Compose any accumulated fixed transforms with this joint's origin
            let origin = accumulated_fixed * joint_origin;
            accumulated_fixed = Isometry3::identity();

            let axis = UnitVector3::new_normalize(Vector3::from(joint.axis));
            let (lower, upper) = match (kind, joint.limits.lower, joint.limits.upper) {
                (JointKind::Continuous, _, _) => (-TAU, TAU),
                (_, Some(lower), Some(upper)) => (lower, upper),
                (JointKind::Prismatic, _, _) => (f64::NEG_INFINITY, f64::INFINITY),
                (JointKind::Revolute, _, _) => (-TAU, TAU),
            };

            joints.push(ChainJoint {
                name: joint.name.clone(),
                kind,
                origin,
                axis,
                lower_limit: lower,
                upper_limit: upper,
            });
        }

        Ok(Self {
            joints,
            ee_offset: accumulated_fixed,
        })
    }

    /// Number of movable joints (full-vector length).
    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Joint names in chain order.
    pub fn joint_names(&self) -> Vec<&str> {
        self.joints.iter().map(|j| j.name.as_str()).collect()
    }

    /// Access the joint definitions.
    pub fn joints(&self) -> &[ChainJoint] {
        &self.joints
    }

    /// End-effector offset after the last joint.
    pub fn ee_offset(&self) -> &Isometry3<f64> {
        &self.ee_offset
    }

    /// Compute forward kinematics: joint positions -> end-effector pose.
    ///
    /// # Panics
    ///
    /// Panics if `q.len() != self.dof()`. The checked path is
    /// [`ForwardKinematics::joint_to_cart`](crate::ForwardKinematics::joint_to_cart).
    pub fn forward_kinematics(&self, q: &[f64]) -> Isometry3<f64> {
        assert_eq!(q.len(), self.dof(), "q.len() must equal chain DOF");

        let mut transform = Isometry3::identity();
        for (joint, &position) in self.joints.iter().zip(q) {
            transform *= joint.origin;
            transform *= joint.motion(position);
        }
        transform * self.ee_offset
    }

    /// Geometric Jacobian of the end-effector, expressed in the base frame.
    ///
    /// Rows 0..3 are linear velocity, rows 3..6 angular velocity.
    ///
    /// # Panics
    ///
    /// Panics if `q.len() != self.dof()`.
    pub fn geometric_jacobian(&self, q: &[f64]) -> DMatrix<f64> {
        assert_eq!(q.len(), self.dof(), "q.len() must equal chain DOF");

        let (origins, axes, ee_pos) = self.joint_frames(q);
        let mut jacobian = DMatrix::zeros(6, self.dof());

        for (i, joint) in self.joints.iter().enumerate() {
            let z_i = &axes[i];
            match joint.kind {
                JointKind::Prismatic => {
                    jacobian.fixed_view_mut::<3, 1>(0, i).copy_from(z_i);
                }
                JointKind::Revolute | JointKind::Continuous => {
                    let r = ee_pos - origins[i];
                    jacobian.fixed_view_mut::<3, 1>(0, i).copy_from(&z_i.cross(&r));
                    jacobian.fixed_view_mut::<3, 1>(3, i).copy_from(z_i);
                }
            }
        }

        jacobian
    }

    /// Per-joint origins and axes in the base frame, plus the EE position.
    fn joint_frames(&self, q: &[f64]) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>, Vector3<f64>) {
        let mut transform = Isometry3::identity();
        let mut origins = Vec::with_capacity(self.dof());
        let mut axes = Vec::with_capacity(self.dof());

        for (joint, &position) in self.joints.iter().zip(q) {
            transform *= joint.origin;

            // Record joint origin and axis BEFORE the joint's own motion
            origins.push(transform.translation.vector);
            axes.push(transform.rotation * joint.axis.into_inner());

            transform *= joint.motion(position);
        }

        let ee_pos = (transform * self.ee_offset).translation.vector;
        (origins, axes, ee_pos)
    }
}

/// Convert a URDF [`Origin`] (xyz + rpy) to an [`Isometry3`].
fn origin_to_isometry(origin: &Origin) -> Isometry3<f64> {
    let translation = Translation3::new(origin.xyz[0], origin.xyz[1], origin.xyz[2]);
    let rotation = UnitQuaternion::from_matrix(&rotation_matrix_from_rpy(
        origin.rpy[0],
        origin.rpy[1],
        origin.rpy[2],
    ));
    Isometry3::from_parts(translation, rotation)
}

/// Build a rotation matrix from roll-pitch-yaw (intrinsic XYZ / extrinsic ZYX).
fn rotation_matrix_from_rpy(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();

    Matrix3::new(
        cy * cp,
        cy * sp * sr - sy * cr,
        cy * sp * cr + sy * sr,
        sy * cp,
        sy * sp * sr + cy * cr,
        sy * sp * cr - cy * sr,
        -sp,
        cp * sr,
        cp * cr,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

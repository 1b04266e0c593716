//! In-memory robot model produced by the URDF parser.
//!
//! Only the kinematic subset of URDF is represented: the link tree, joint
//! origins, axes, position limits and `<mimic>` couplings.

use std::collections::{HashMap, HashSet};

use crate::error::UrdfError;

// ---------------------------------------------------------------------------
// JointType
// ---------------------------------------------------------------------------

/// URDF joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    /// Rotation about a single axis, with position limits.
    Revolute,
    /// Unlimited rotation about a single axis.
    Continuous,
    /// Translation along an axis, with position limits.
    Prismatic,
    /// No relative motion between parent and child.
    Fixed,
    /// Unconstrained 6-DOF joint (rarely used).
    Floating,
    /// Translation in a plane (rarely used).
    Planar,
}

impl JointType {
    /// Whether this joint type contributes a single movable DOF to a chain.
    pub const fn is_movable(self) -> bool {
        matches!(self, Self::Revolute | Self::Continuous | Self::Prismatic)
    }
}

// ---------------------------------------------------------------------------
// JointLimits
// ---------------------------------------------------------------------------

/// Position, effort and velocity limits of a joint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointLimits {
    /// Lower position limit (rad or m). `None` means unbounded.
    pub lower: Option<f64>,
    /// Upper position limit (rad or m). `None` means unbounded.
    pub upper: Option<f64>,
    /// Maximum effort (Nm or N).
    pub effort: f64,
    /// Maximum velocity (rad/s or m/s).
    pub velocity: f64,
}

// ---------------------------------------------------------------------------
// MimicData
// ---------------------------------------------------------------------------

/// A `<mimic>` coupling: `q = multiplier * q[joint] + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct MimicData {
    /// Name of the joint being followed.
    pub joint: String,
    /// Scale applied to the followed joint's position (default 1).
    pub multiplier: f64,
    /// Constant added after scaling (default 0).
    pub offset: f64,
}

impl MimicData {
    /// Mimic `joint` one-to-one.
    pub fn new(joint: impl Into<String>) -> Self {
        Self {
            joint: joint.into(),
            multiplier: 1.0,
            offset: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// A 3D pose specified as position + roll-pitch-yaw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Origin {
    /// Translation `[x, y, z]` in meters.
    pub xyz: [f64; 3],
    /// Rotation `[roll, pitch, yaw]` in radians.
    pub rpy: [f64; 3],
}

// ---------------------------------------------------------------------------
// LinkData / JointData
// ---------------------------------------------------------------------------

/// A URDF link. Kinematics only needs its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkData {
    pub name: String,
}

impl LinkData {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// In-memory representation of a URDF joint.
#[derive(Debug, Clone)]
pub struct JointData {
    /// Joint name.
    pub name: String,
    /// Joint type.
    pub joint_type: JointType,
    /// Parent link name.
    pub parent: String,
    /// Child link name.
    pub child: String,
    /// Joint origin relative to parent link.
    pub origin: Origin,
    /// Joint axis (default `[0, 0, 1]` in URDF, normalized downstream).
    pub axis: [f64; 3],
    /// Motion limits.
    pub limits: JointLimits,
    /// Coupling to another joint, if any.
    pub mimic: Option<MimicData>,
}

// ---------------------------------------------------------------------------
// RobotModel
// ---------------------------------------------------------------------------

/// Parsed URDF robot: links, joints and the root link name.
#[derive(Debug, Clone)]
pub struct RobotModel {
    /// Robot name.
    pub name: String,
    /// All links, keyed by name.
    pub links: HashMap<String, LinkData>,
    /// All joints, keyed by name.
    pub joints: HashMap<String, JointData>,
    /// Name of the root link (the one never referenced as a child).
    pub root_link: String,
}

impl RobotModel {
    /// Get a link by name.
    pub fn link(&self, name: &str) -> Result<&LinkData, UrdfError> {
        self.links
            .get(name)
            .ok_or_else(|| UrdfError::MissingLink(name.into()))
    }

    /// Get a joint by name.
    pub fn joint(&self, name: &str) -> Result<&JointData, UrdfError> {
        self.joints
            .get(name)
            .ok_or_else(|| UrdfError::MissingJoint(name.into()))
    }

    /// Iterate over movable joints (revolute, continuous, prismatic).
    pub fn movable_joints(&self) -> impl Iterator<Item = &JointData> {
        self.joints.values().filter(|j| j.joint_type.is_movable())
    }

    /// Iterate over joints that carry a `<mimic>` tag.
    pub fn mimic_joints(&self) -> impl Iterator<Item = &JointData> {
        self.joints.values().filter(|j| j.mimic.is_some())
    }

    /// Ordered joint names from `root` down to `target` link.
    ///
    /// Returns `None` if `target` is not reachable from `root`. Each link is
    /// expanded at most once, so a joint cycle cannot loop the search.
    pub fn path_between(&self, root: &str, target: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = self.path_from(root, target, &mut visited)?;
        path.reverse();
        Some(path)
    }

    /// Depth-first search below `link`; the path comes back leaf first.
    fn path_from<'m>(
        &'m self,
        link: &'m str,
        target: &str,
        visited: &mut HashSet<&'m str>,
    ) -> Option<Vec<String>> {
        if link == target {
            return Some(Vec::new());
        }
        if !visited.insert(link) {
            return None;
        }

        let mut children: Vec<&JointData> =
            self.joints.values().filter(|j| j.parent == link).collect();
        // HashMap order is unspecified; keep the search deterministic.
        children.sort_unstable_by(|a, b| a.name.cmp(&b.name));

        for joint in children {
            if let Some(mut path) = self.path_from(&joint.child, target, visited) {
                path.push(joint.name.clone());
                return Some(path);
            }
        }
        None
    }

    /// Names of all joints, sorted alphabetically.
    pub fn joint_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.joints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

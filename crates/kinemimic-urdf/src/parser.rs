//! URDF XML parsing using `urdf-rs`.
//!
//! Converts `urdf_rs` types into the crate's [`RobotModel`], keeping only
//! what the kinematics layer consumes.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::UrdfError;
use crate::types::{JointData, JointLimits, JointType, LinkData, MimicData, Origin, RobotModel};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a URDF file from disk into a [`RobotModel`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<RobotModel, UrdfError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| UrdfError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_string(&content)
}

/// Parse a URDF XML string into a [`RobotModel`].
pub fn parse_string(xml: &str) -> Result<RobotModel, UrdfError> {
    let robot = urdf_rs::read_from_string(xml).map_err(|e| UrdfError::Parse(e.to_string()))?;
    convert_robot(&robot)
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn convert_robot(robot: &urdf_rs::Robot) -> Result<RobotModel, UrdfError> {
    let links: HashMap<String, LinkData> = robot
        .links
        .iter()
        .map(|l| (l.name.clone(), LinkData::new(l.name.clone())))
        .collect();

    let joints: HashMap<String, JointData> = robot
        .joints
        .iter()
        .map(|j| convert_joint(j).map(|jd| (jd.name.clone(), jd)))
        .collect::<Result<_, _>>()?;

    for joint in joints.values() {
        if let Some(mimic) = &joint.mimic {
            if !joints.contains_key(&mimic.joint) {
                return Err(UrdfError::UnknownMimicTarget {
                    joint: joint.name.clone(),
                    target: mimic.joint.clone(),
                });
            }
        }
    }

    // Root link = a link that is never a child of any joint.
    let child_links: HashSet<&str> = joints.values().map(|j| j.child.as_str()).collect();
    let mut roots: Vec<&String> = links
        .keys()
        .filter(|name| !child_links.contains(name.as_str()))
        .collect();
    roots.sort_unstable();
    let root_link = roots.first().ok_or(UrdfError::NoRootLink)?.to_string();

    Ok(RobotModel {
        name: robot.name.clone(),
        links,
        joints,
        root_link,
    })
}

fn convert_joint(joint: &urdf_rs::Joint) -> Result<JointData, UrdfError> {
    let joint_type = convert_joint_type(&joint.joint_type).ok_or_else(|| {
        UrdfError::UnsupportedJointType {
            joint: joint.name.clone(),
            kind: "spherical",
        }
    })?;

    Ok(JointData {
        name: joint.name.clone(),
        joint_type,
        parent: joint.parent.link.clone(),
        child: joint.child.link.clone(),
        origin: convert_pose(&joint.origin),
        axis: vec3(&joint.axis.xyz),
        limits: convert_limits(&joint.limit),
        mimic: joint.mimic.as_ref().map(convert_mimic),
    })
}

/// `None` for joint types the kinematics layer cannot represent.
fn convert_joint_type(jt: &urdf_rs::JointType) -> Option<JointType> {
    Some(match jt {
        urdf_rs::JointType::Revolute => JointType::Revolute,
        urdf_rs::JointType::Continuous => JointType::Continuous,
        urdf_rs::JointType::Prismatic => JointType::Prismatic,
        urdf_rs::JointType::Fixed => JointType::Fixed,
        urdf_rs::JointType::Floating => JointType::Floating,
        urdf_rs::JointType::Planar => JointType::Planar,
        urdf_rs::JointType::Spherical => return None,
    })
}

fn convert_limits(limit: &urdf_rs::JointLimit) -> JointLimits {
    // urdf-rs defaults lower/upper to 0.0 for joints without limits.
    // Both zero is read as "no position limits".
    let has_limits = (limit.lower - limit.upper).abs() > f64::EPSILON;
    JointLimits {
        lower: has_limits.then_some(limit.lower),
        upper: has_limits.then_some(limit.upper),
        effort: limit.effort,
        velocity: limit.velocity,
    }
}

fn convert_mimic(mimic: &urdf_rs::Mimic) -> MimicData {
    MimicData {
        joint: mimic.joint.clone(),
        multiplier: mimic.multiplier.unwrap_or(1.0),
        offset: mimic.offset.unwrap_or(0.0),
    }
}

fn convert_pose(pose: &urdf_rs::Pose) -> Origin {
    Origin {
        xyz: vec3(&pose.xyz),
        rpy: vec3(&pose.rpy),
    }
}

const fn vec3(v: &[f64; 3]) -> [f64; 3] {
    [v[0], v[1], v[2]]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

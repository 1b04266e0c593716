//! URDF parsing for kinemimic.
//!
//! Reads the kinematic subset of a URDF (links, joints, origins, axes,
//! position limits and `<mimic>` couplings) into a [`RobotModel`] that the
//! IK crate turns into a chain and a mimic map.

pub mod error;
pub mod parser;
pub mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::UrdfError;
pub use parser::{parse_file, parse_string};
pub use types::{JointData, JointLimits, JointType, LinkData, MimicData, Origin, RobotModel};

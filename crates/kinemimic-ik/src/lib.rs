//! Joint-limit and mimic-aware inverse kinematics.
//!
//! Solves for a joint configuration that places a serial chain's
//! end-effector at a target pose while respecting per-joint position limits
//! and mimic couplings (`q_mimic = multiplier * q_active + offset`).
//!
//! # Architecture
//!
//! ```text
//! RobotModel ──► KinematicChain ──┬──► JlMimicSolver ──► joint angles
//!            └─► MimicMap ────────┘        │
//!                                          ▼
//!                       PositionSolver (LevenbergMarquardt)
//!                       over MimicKinematics (active joints only)
//! ```
//!
//! The [`KinematicChain`] and [`MimicMap`] are extracted from a
//! [`RobotModel`](kinemimic_urdf::RobotModel) (or built by hand). The
//! [`JlMimicSolver`] borrows the chain, its limits and both collaborators,
//! and handles the reduced/full bookkeeping, angle harmonization and limit
//! repair around each LM solve.

pub mod chain;
pub mod config;
pub mod error;
pub mod kinematics;
pub mod limits;
pub mod lm;
pub mod mimic;
pub mod solver;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use chain::{ChainJoint, JointKind, KinematicChain};
pub use config::{IkConfig, LmConfig};
pub use error::{ChainError, ConfigError, IkError, KinematicsError, LimitsError, MimicError};
pub use kinematics::{ForwardKinematics, MimicKinematics};
pub use limits::{harmonize, harmonize_angle, obeys_limits, JointLimits};
pub use lm::{CostMode, LevenbergMarquardt, LmOptions, LmOutcome, LmStatus, PositionSolver};
pub use mimic::{JointMimic, MimicMap};
pub use solver::{IkSolution, JlMimicSolver, SolveStatus};

use thiserror::Error;

use kinemimic_urdf::UrdfError;

/// Top-level error type for an IK solve or solver setup.
#[derive(Debug, Error)]
pub enum IkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mimic configuration error: {0}")]
    Mimic(#[from] MimicError),

    #[error("Kinematics error: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("Joint vector length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Initial joint vector contains a non-finite value at joint {joint}")]
    NonFiniteInput { joint: usize },

    #[error("Target frame contains a non-finite value")]
    NonFiniteTarget,

    #[error("Mimic joints must be set before solving")]
    MimicNotConfigured,

    #[error("Redundant joint index {index} out of range for {reduced_dof} active joints")]
    InvalidRedundantJoint { index: usize, reduced_dof: usize },

    #[error("Singular configuration on attempt {attempt}")]
    Singular { attempt: u32 },

    #[error("Joint limits still violated after {attempts} attempts")]
    LimitViolation {
        attempts: u32,
        /// Last full joint vector produced, after harmonization.
        joint_positions: Vec<f64>,
    },
}

/// Errors in a mimic descriptor set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MimicError {
    #[error("Expected {expected} mimic descriptors, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("Joint {joint} owns reduced slot {got}, expected {expected} (slots follow chain order)")]
    SlotOrder {
        joint: usize,
        expected: usize,
        got: usize,
    },

    #[error("Joint {joint} mimics reduced slot {slot}, but only {reduced_dof} active joints exist")]
    InvalidReference {
        joint: usize,
        slot: usize,
        reduced_dof: usize,
    },

    #[error("Joint {joint} has non-finite mimic coefficients")]
    NonFinite { joint: usize },

    #[error("Joint {joint} mimics {target}, which is itself a mimic joint")]
    MimicOfMimic { joint: String, target: String },

    #[error("Joint {0} is not part of the model")]
    UnknownJoint(String),

    #[error("Limits of mimic joints leave no admissible range for reduced slot {slot}")]
    EmptyLimits { slot: usize },
}

/// Errors building or evaluating a kinematic chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KinematicsError {
    #[error("Joint vector length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Errors extracting a chain from a URDF model.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("URDF error: {0}")]
    Urdf(#[from] UrdfError),

    #[error("Link {target} is not reachable from {root}")]
    UnreachableLink { root: String, target: String },
}

/// Errors in a set of position limits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitsError {
    #[error("Mismatched limit lengths: lower={lower}, upper={upper}")]
    LengthMismatch { lower: usize, upper: usize },

    #[error("Invalid limits for joint {joint}: [{lower}, {upper}]")]
    Inverted { joint: usize, lower: f64, upper: f64 },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

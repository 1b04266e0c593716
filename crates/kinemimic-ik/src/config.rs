use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_max_attempts() -> u32 {
    100
}
const fn default_eps() -> f64 {
    1e-6
}
const fn default_max_iterations() -> u32 {
    500
}
const fn default_initial_damping() -> f64 {
    1e-3
}
const fn default_damping_increase() -> f64 {
    10.0
}
const fn default_damping_decrease() -> f64 {
    0.5
}
const fn default_max_damping() -> f64 {
    1e10
}
const fn default_gradient_tolerance() -> f64 {
    1e-12
}
const fn default_orientation_weight() -> f64 {
    0.1
}

// ---------------------------------------------------------------------------
// IkConfig
// ---------------------------------------------------------------------------

/// Configuration for the limit- and mimic-aware IK solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IkConfig {
    /// Number of LM solves (the first plus retries after limit repair)
    /// before giving up with a limit violation (default: 100).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Convergence threshold on the weighted pose-error norm (default: 1e-6).
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Ignore orientation and solve for position only.
    #[serde(default)]
    pub position_ik: bool,

    /// Pass reduced-space limits into the LM engine so that it projects its
    /// steps back inside them. The post-solve limit check still decides.
    #[serde(default)]
    pub project_limits: bool,

    /// Settings for the built-in Levenberg-Marquardt engine, applied through
    /// [`LevenbergMarquardt::from_ik_config`](crate::LevenbergMarquardt::from_ik_config).
    #[serde(default)]
    pub lm: LmConfig,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            eps: default_eps(),
            position_ik: false,
            project_limits: false,
            lm: LmConfig::default(),
        }
    }
}

impl IkConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(invalid("eps", "must be a positive finite number"));
        }
        self.lm.validate()
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// LmConfig
// ---------------------------------------------------------------------------

/// Levenberg-Marquardt engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmConfig {
    /// Maximum outer iterations per solve (default: 500).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Starting damping (lambda) (default: 1e-3).
    #[serde(default = "default_initial_damping")]
    pub initial_damping: f64,

    /// Factor applied to lambda after a rejected step (default: 10).
    #[serde(default = "default_damping_increase")]
    pub damping_increase: f64,

    /// Factor applied to lambda after an accepted step (default: 0.5).
    #[serde(default = "default_damping_decrease")]
    pub damping_decrease: f64,

    /// Lambda beyond which the engine stops trying to improve (default: 1e10).
    #[serde(default = "default_max_damping")]
    pub max_damping: f64,

    /// Gradient norm under which a non-converged iterate counts as singular
    /// (default: 1e-12).
    #[serde(default = "default_gradient_tolerance")]
    pub gradient_tolerance: f64,

    /// Weight of the orientation residual relative to position (default: 0.1).
    #[serde(default = "default_orientation_weight")]
    pub orientation_weight: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            initial_damping: default_initial_damping(),
            damping_increase: default_damping_increase(),
            damping_decrease: default_damping_decrease(),
            max_damping: default_max_damping(),
            gradient_tolerance: default_gradient_tolerance(),
            orientation_weight: default_orientation_weight(),
        }
    }
}

impl LmConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(invalid("lm.max_iterations", "must be at least 1"));
        }
        if !(self.initial_damping > 0.0) {
            return Err(invalid("lm.initial_damping", "must be > 0"));
        }
        if !(self.damping_increase > 1.0) {
            return Err(invalid("lm.damping_increase", "must be > 1"));
        }
        if !(self.damping_decrease > 0.0 && self.damping_decrease < 1.0) {
            return Err(invalid("lm.damping_decrease", "must be in (0, 1)"));
        }
        if !(self.max_damping >= self.initial_damping) {
            return Err(invalid("lm.max_damping", "must be >= initial_damping"));
        }
        if !(self.gradient_tolerance >= 0.0) {
            return Err(invalid("lm.gradient_tolerance", "must be >= 0"));
        }
        if !(self.orientation_weight >= 0.0 && self.orientation_weight.is_finite()) {
            return Err(invalid("lm.orientation_weight", "must be a finite number >= 0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

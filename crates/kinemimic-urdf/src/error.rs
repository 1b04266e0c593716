use std::path::PathBuf;

use thiserror::Error;

/// Failure to load a URDF or to look something up in the parsed model.
#[derive(Debug, Error)]
pub enum UrdfError {
    #[error("cannot read URDF file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed XML, or XML that is not a URDF robot.
    #[error("malformed URDF: {0}")]
    Parse(String),

    #[error("model has no link named {0}")]
    MissingLink(String),

    #[error("model has no joint named {0}")]
    MissingJoint(String),

    /// Joint types with more than one DOF per axis.
    #[error("joint {joint} has unsupported type {kind}")]
    UnsupportedJointType { joint: String, kind: &'static str },

    #[error("joint {joint} mimics {target}, which is not in the model")]
    UnknownMimicTarget { joint: String, target: String },

    /// Every link is some joint's child, so the link graph has a cycle.
    #[error("model has no root link")]
    NoRootLink,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        assert_eq!(
            UrdfError::MissingLink("tool".into()).to_string(),
            "model has no link named tool"
        );
        assert_eq!(
            UrdfError::MissingJoint("wrist".into()).to_string(),
            "model has no joint named wrist"
        );
        assert_eq!(
            UrdfError::UnsupportedJointType {
                joint: "ball".into(),
                kind: "spherical"
            }
            .to_string(),
            "joint ball has unsupported type spherical"
        );
        assert_eq!(
            UrdfError::UnknownMimicTarget {
                joint: "finger_right".into(),
                target: "finger_left".into(),
            }
            .to_string(),
            "joint finger_right mimics finger_left, which is not in the model"
        );
    }

    #[test]
    fn io_error_keeps_path_and_source() {
        let e = UrdfError::Io {
            path: PathBuf::from("/tmp/arm.urdf"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/arm.urdf"));
        assert!(msg.ends_with("gone"));
        assert!(std::error::Error::source(&e).is_some());
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn error_is_send_sync() {
        assert_send_sync::<UrdfError>();
    }
}

//! Error types for the fallible, non-per-frame surface of the blend graph.
//!
//! Per-frame operations (play, update, weight and event mutation) never return these: an invalid
//! reference there is a silent no-op returning a default value.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BlendError {
    /// JSON text could not be parsed into the expected description.
    #[error("json parse error: {0}")]
    Parse(String),

    /// A description referenced a clip name the host does not know.
    #[error("unknown clip '{name}'")]
    UnknownClip { name: String },

    /// A configuration field holds a value the runtime cannot use.
    #[error("invalid config: {field} = {value}")]
    InvalidConfig { field: &'static str, value: String },

    /// A blend-tree or clip description is structurally unusable.
    #[error("invalid blend tree: {reason}")]
    InvalidTree { reason: String },
}

impl BlendError {
    pub(crate) fn invalid_tree(reason: impl Into<String>) -> Self {
        Self::InvalidTree {
            reason: reason.into(),
        }
    }

    /// Error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::UnknownClip { .. } => "data",
            Self::InvalidConfig { .. } => "config",
            Self::InvalidTree { .. } => "validation",
        }
    }
}

impl From<serde_json::Error> for BlendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = BlendError::UnknownClip {
            name: "jump".into(),
        };
        assert_eq!(err.to_string(), "unknown clip 'jump'");
        assert_eq!(err.category(), "data");

        let err = BlendError::invalid_tree("linear blend needs at least one child");
        assert!(err.to_string().contains("at least one child"));
    }

    #[test]
    fn serde_errors_convert_to_parse() {
        let raw = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: BlendError = raw.into();
        assert!(matches!(err, BlendError::Parse(_)));
    }
}

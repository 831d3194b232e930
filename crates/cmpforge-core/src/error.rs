//! Error types for cmpforge

use std::fmt;

use thiserror::Error;

/// Which argument of a binary operation an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Index used by the generated code when passing a side to a helper.
    pub fn index(self) -> i64 {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// Inverse of [`Side::index`]; anything but 0 is the right side.
    pub fn from_index(index: i64) -> Self {
        if index == 0 {
            Side::Left
        } else {
            Side::Right
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Main error type for comparator construction and use.
#[derive(Debug, Error)]
pub enum ComparatorError {
    /// Bad specification shape or unsupported request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Empty criteria and no fallback mode.
    #[error("No criteria for `{type_name}` and no fallback mode configured")]
    MissingCriteria { type_name: &'static str },

    /// Strict type check failed at call time.
    #[error("Type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A null argument was rejected by the ordering's null policy.
    #[error("Null {side} argument rejected")]
    NullArgument { side: Side },

    /// A criterion failed for reasons of its own.
    #[error("Criterion `{criterion}` failed: {message}")]
    Criterion { criterion: String, message: String },

    /// A materialization backend rejected the generated code.
    #[error("Failed to define artifact `{artifact}`: {reason}")]
    ArtifactDefinition { artifact: String, reason: String },

    /// An instantiation backend could not produce an instance.
    #[error("Failed to instantiate artifact `{artifact}`: {reason}")]
    Instantiation { artifact: String, reason: String },

    /// A privileged capability could not be initialized on this host.
    #[error("Capability `{capability}` unavailable: {reason}")]
    CapabilityUnavailable {
        capability: &'static str,
        reason: String,
    },

    /// Every candidate strategy failed. Fatal, not retried.
    #[error("No strategies available for {context}{}", render_causes(.causes))]
    NoStrategiesAvailable {
        context: String,
        causes: Vec<ComparatorError>,
    },

    /// An internal comparator form was deserialized without its proxy.
    #[error("`{form}` cannot be deserialized directly; it must be read through its proxy")]
    ProxyRequired { form: &'static str },

    /// Serialization is not supported for this comparator.
    #[error("Serialization disabled: {0}")]
    SerializationDisabled(String),

    /// Serialization is actively refused.
    #[error("Serialization blocked: {0}")]
    SerializationBlocked(String),

    /// The proxy record was written by a newer version.
    #[error("Unsupported proxy version {found} (supported up to {supported})")]
    UnsupportedProxyVersion { found: u32, supported: u32 },

    /// The proxy fingerprint does not match its contents.
    #[error("Proxy fingerprint mismatch for `{target}`")]
    ProxyTampered { target: String },

    /// A name in a proxy record is not registered in this process.
    #[error("Unresolved {kind} `{name}`")]
    Unresolved { kind: &'static str, name: String },

    /// The ambient interruption signal was raised.
    #[error("Interrupted")]
    Interrupted,
}

impl ComparatorError {
    /// Errors that abort a fallback walk instead of being chained.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ComparatorError::Interrupted | ComparatorError::NoStrategiesAvailable { .. }
        )
    }

    /// Chained causes of an aggregate failure; empty for everything else.
    pub fn causes(&self) -> &[ComparatorError] {
        match self {
            ComparatorError::NoStrategiesAvailable { causes, .. } => causes,
            _ => &[],
        }
    }
}

fn render_causes(causes: &[ComparatorError]) -> String {
    if causes.is_empty() {
        return String::new();
    }
    let mut out = String::from(":");
    for (idx, cause) in causes.iter().enumerate() {
        out.push_str(&format!("\n  [{idx}] {cause}"));
    }
    out
}

/// Result type alias for cmpforge operations
pub type Result<T> = std::result::Result<T, ComparatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_lists_every_cause() {
        let err = ComparatorError::NoStrategiesAvailable {
            context: "definers=[anonymous]".to_string(),
            causes: vec![
                ComparatorError::InvalidArgument("first".into()),
                ComparatorError::Interrupted,
            ],
        };
        let text = err.to_string();
        assert!(text.contains("definers=[anonymous]"));
        assert!(text.contains("[0] Invalid argument: first"));
        assert!(text.contains("[1] Interrupted"));
        assert_eq!(err.causes().len(), 2);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_side_index_round_trip() {
        assert_eq!(Side::from_index(Side::Left.index()), Side::Left);
        assert_eq!(Side::from_index(Side::Right.index()), Side::Right);
        assert!(!ComparatorError::NullArgument { side: Side::Left }.is_fatal());
    }
}

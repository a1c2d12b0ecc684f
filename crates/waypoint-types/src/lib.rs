//! Shared types, errors, payloads, and transaction context for Waypoint nodes.
//!
//! This crate provides the foundational types used across all other Waypoint crates:
//! - `WaypointError`: unified error taxonomy (data errors vs. fatal errors)
//! - `Payload`: the tagged union flowing through one pipeline branch
//! - `Element`: hierarchical document tree with an XML codec
//! - `Path`: dotted path grammar shared by payload and context lookups
//! - `TransactionContext`: per-transaction key space plus an optional pooled resource

pub mod context;
pub mod path;
pub mod payload;
pub mod resource;
pub mod tree;

pub use context::TransactionContext;
pub use path::{Path, Segment};
pub use payload::{Body, Carried, Payload, PayloadKind, Table};
pub use resource::{Resource, ResourcePool};
pub use tree::{Element, XmlNode};

/// Unified error type for all Waypoint subsystems.
#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    // === Data errors (scoped to one message) ===
    #[error("Required location '{location}' did not resolve on node '{node}'")]
    MissingLocation { node: String, location: String },

    #[error("Cannot convert {from} payload to {to}: {message}")]
    Conversion {
        from: &'static str,
        to: &'static str,
        message: String,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Path '{path}' cannot be applied: {message}")]
    PathMismatch { path: String, message: String },

    #[error("Node '{node}' rejected message: {message}")]
    Data { node: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Configuration errors (raised while building a node) ===
    #[error("Missing required property '{name}'")]
    MissingProperty { name: String },

    #[error("Invalid value for property '{name}': {message}")]
    InvalidProperty { name: String, message: String },

    #[error("Property group record {index} is incomplete: '{missing}' is required")]
    IncompleteRecord { index: usize, missing: String },

    #[error("Invalid location '{location}': {message}")]
    InvalidLocation { location: String, message: String },

    #[error("Unknown node type '{0}'")]
    UnknownNodeType(String),

    // === Infrastructure ===
    #[error("Shared resource error: {0}")]
    Resource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl WaypointError {
    /// Returns `true` for errors caused by the content of one message.
    ///
    /// Data errors abort the current node's processing of the current message
    /// only; the dispatcher is expected to route them to an error branch.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            WaypointError::MissingLocation { .. }
                | WaypointError::Conversion { .. }
                | WaypointError::Xml(_)
                | WaypointError::PathMismatch { .. }
                | WaypointError::Data { .. }
                | WaypointError::Json(_)
        )
    }

    /// Returns `true` for configuration and infrastructure failures that
    /// should abort the transaction and be surfaced to an operator.
    pub fn is_fatal(&self) -> bool {
        !self.is_data_error()
    }

    /// Short machine-readable name of the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            WaypointError::MissingLocation { .. } => "missing_location",
            WaypointError::Conversion { .. } => "conversion",
            WaypointError::Xml(_) => "xml",
            WaypointError::PathMismatch { .. } => "path_mismatch",
            WaypointError::Data { .. } => "data",
            WaypointError::Json(_) => "json",
            WaypointError::MissingProperty { .. } => "missing_property",
            WaypointError::InvalidProperty { .. } => "invalid_property",
            WaypointError::IncompleteRecord { .. } => "incomplete_record",
            WaypointError::InvalidLocation { .. } => "invalid_location",
            WaypointError::UnknownNodeType(_) => "unknown_node_type",
            WaypointError::Resource(_) => "resource",
            WaypointError::Io(_) => "io",
            WaypointError::Other(_) => "other",
        }
    }

    /// Wrap this error in a `Carried` payload so it can travel downstream
    /// instead of being thrown.
    pub fn to_carried(&self) -> Payload {
        Payload::carried(self.kind(), self.to_string())
    }
}

/// A convenience alias for `Result<T, WaypointError>`.
pub type Result<T> = std::result::Result<T, WaypointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_missing_location() {
        let err = WaypointError::MissingLocation {
            node: "headers".into(),
            location: "payload:order.id".into(),
        };
        assert_eq!(
            err.to_string(),
            "Required location 'payload:order.id' did not resolve on node 'headers'"
        );
    }

    #[test]
    fn error_display_conversion() {
        let err = WaypointError::Conversion {
            from: "list",
            to: "text",
            message: "lists have no text form".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot convert list payload to text: lists have no text form"
        );
    }

    #[test]
    fn error_display_missing_property() {
        let err = WaypointError::MissingProperty {
            name: "NEXT".into(),
        };
        assert_eq!(err.to_string(), "Missing required property 'NEXT'");
    }

    #[test]
    fn error_display_incomplete_record() {
        let err = WaypointError::IncompleteRecord {
            index: 1,
            missing: "Y_1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Property group record 1 is incomplete: 'Y_1' is required"
        );
    }

    #[test]
    fn error_display_unknown_node_type() {
        let err = WaypointError::UnknownNodeType("teleport".into());
        assert_eq!(err.to_string(), "Unknown node type 'teleport'");
    }

    // --- classification ---

    #[test]
    fn data_errors_are_not_fatal() {
        let errs = [
            WaypointError::MissingLocation {
                node: "n".into(),
                location: "x".into(),
            },
            WaypointError::Xml("bad".into()),
            WaypointError::Data {
                node: "n".into(),
                message: "bad date".into(),
            },
            WaypointError::PathMismatch {
                path: "a.1".into(),
                message: "index out of range".into(),
            },
        ];
        for err in errs {
            assert!(err.is_data_error(), "{err} should be a data error");
            assert!(!err.is_fatal());
        }
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let errs = [
            WaypointError::MissingProperty { name: "X".into() },
            WaypointError::InvalidProperty {
                name: "X".into(),
                message: "not a number".into(),
            },
            WaypointError::IncompleteRecord {
                index: 0,
                missing: "X_0".into(),
            },
            WaypointError::InvalidLocation {
                location: "a..b".into(),
                message: "empty segment".into(),
            },
            WaypointError::Resource("pool exhausted".into()),
        ];
        for err in errs {
            assert!(err.is_fatal(), "{err} should be fatal");
        }
    }

    #[test]
    fn to_carried_keeps_kind_and_message() {
        let err = WaypointError::Data {
            node: "dates".into(),
            message: "unparsable date '2024-13-45'".into(),
        };
        let carried = err.to_carried();
        let Some(c) = carried.as_carried() else {
            panic!("expected a carried payload");
        };
        assert_eq!(c.kind, "data");
        assert!(c.message.contains("2024-13-45"));
        assert_eq!(carried.as_text().unwrap(), err.to_string());
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WaypointError = io_err.into();
        assert!(matches!(err, WaypointError::Io(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: WaypointError = json_err.into();
        assert!(matches!(err, WaypointError::Json(_)));
        assert!(err.is_data_error());
    }
}

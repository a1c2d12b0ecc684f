//! Node trait and the configuration a node is built from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use waypoint_location::{Location, LocationSyntax, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::config::{Properties, PropertySource, NEXT, TYPE, UNMARKED};
use crate::property_group::GroupRecord;
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// Whether a node holds buffered input between invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Idle,
    Accumulating,
}

#[async_trait]
pub trait Node: Send + Sync {
    /// The registry type identifier (e.g. "split", "batch").
    fn node_type(&self) -> &str;

    /// The configured instance name.
    fn name(&self) -> &str;

    fn state(&self) -> NodeState {
        NodeState::Idle
    }

    /// Process one message.
    ///
    /// `payload` is `None` when the dispatcher signals that the current batch
    /// is closed. Data errors abort only this message; configuration and
    /// infrastructure errors abort the transaction.
    async fn invoke(
        &self,
        ctx: &mut TransactionContext,
        payload: Option<Payload>,
    ) -> Result<RoutingDecision>;
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// A node's instance name and its own (already scoped) properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    pub properties: Properties,
    pub syntax: LocationSyntax,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
            syntax: LocationSyntax::default(),
        }
    }

    /// Select `node.<name>.*` from a shared property set.
    pub fn from_scoped(name: impl Into<String>, all: &Properties) -> Self {
        let name = name.into();
        let properties = all.with_prefix(&format!("node.{name}."));
        Self::new(name, properties)
    }

    pub fn with_syntax(mut self, syntax: LocationSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn node_type(&self) -> Result<&str> {
        self.properties.required(TYPE)
    }

    /// Default destinations from `NEXT`; may be empty.
    pub fn next(&self) -> Vec<String> {
        self.properties.get_list(NEXT)
    }

    /// Default destinations from `NEXT`; empty is a configuration error.
    pub fn require_next(&self) -> Result<Vec<String>> {
        let next = self.next();
        if next.is_empty() {
            return Err(WaypointError::MissingProperty {
                name: NEXT.to_string(),
            });
        }
        Ok(next)
    }

    /// Literal policy for unmarked candidates, overridable with `UNMARKED`.
    pub fn unmarked(&self, default: Unmarked) -> Result<Unmarked> {
        match self.properties.get(UNMARKED) {
            Some(v) => v.parse(),
            None => Ok(default),
        }
    }

    /// Parse a location string with this node's syntax.
    pub fn parse_location(&self, key: &str, raw: &str, unmarked: Unmarked) -> Result<Location> {
        Location::parse(raw, &self.syntax, unmarked).map_err(|e| match e {
            WaypointError::InvalidLocation { location, message } => WaypointError::InvalidProperty {
                name: key.to_string(),
                message: format!("invalid location '{location}': {message}"),
            },
            other => other,
        })
    }

    /// Parse the required `prefix` field of a group record as a location.
    pub fn record_location(
        &self,
        record: &GroupRecord,
        prefix: &str,
        unmarked: Unmarked,
    ) -> Result<Location> {
        self.parse_location(&record.key(prefix), record.require(prefix)?, unmarked)
    }

    pub fn location(&self, key: &str, unmarked: Unmarked) -> Result<Location> {
        let raw = self.properties.required(key)?;
        self.parse_location(key, raw, unmarked)
    }

    pub fn optional_location(&self, key: &str, unmarked: Unmarked) -> Result<Option<Location>> {
        self.properties
            .get(key)
            .map(|raw| self.parse_location(key, raw, unmarked))
            .transpose()
    }
}

impl PropertySource for NodeConfig {
    fn get_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_scoped_selects_own_keys() {
        let all = Properties::from_pairs([
            ("node.split.TYPE", "split"),
            ("node.split.NEXT", "a,b"),
            ("node.other.TYPE", "log"),
        ]);
        let config = NodeConfig::from_scoped("split", &all);
        assert_eq!(config.node_type().unwrap(), "split");
        assert_eq!(config.require_next().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn missing_next_is_fatal() {
        let config = NodeConfig::new("n", Properties::new());
        let err = config.require_next().unwrap_err();
        assert!(err.is_fatal());
        assert!(config.next().is_empty());
        assert!(config.node_type().is_err());
    }

    #[test]
    fn unmarked_override() {
        let config = NodeConfig::new("n", Properties::new().with(UNMARKED, "literal"));
        assert_eq!(config.unmarked(Unmarked::PayloadPath).unwrap(), Unmarked::Literal);
        let config = NodeConfig::new("n", Properties::new());
        assert_eq!(
            config.unmarked(Unmarked::PathOrLiteral).unwrap(),
            Unmarked::PathOrLiteral
        );
    }

    #[test]
    fn bad_location_names_property() {
        let config = NodeConfig::new("n", Properties::new().with("SOURCE", "order..line"));
        let err = config
            .optional_location("SOURCE", Unmarked::PayloadPath)
            .unwrap_err();
        assert!(matches!(err, WaypointError::InvalidProperty { ref name, .. } if name == "SOURCE"));
        assert!(config
            .optional_location("ABSENT", Unmarked::PayloadPath)
            .unwrap()
            .is_none());
    }
}

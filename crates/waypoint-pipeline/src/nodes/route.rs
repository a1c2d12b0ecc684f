use async_trait::async_trait;
use regex::Regex;

use waypoint_location::{Location, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::node::{Node, NodeConfig};
use crate::property_group::{parse_group, FieldSpec, FromGroupRecord, GroupRecord};
use crate::routing::{Route, RoutingDecision};

// ---------------------------------------------------------------------------
// RouteNode: content-based routing on regex rules
// ---------------------------------------------------------------------------

/// Routes the payload to `DEST_n` when any value at `LOCATION_n` matches `PATTERN_n`.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub location: Location,
    pub pattern: Regex,
    pub destination: String,
}

impl FromGroupRecord for RouteRule {
    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::required("LOCATION"),
            FieldSpec::required("PATTERN"),
            FieldSpec::required("DEST"),
        ]
    }

    fn from_record(record: &GroupRecord, config: &NodeConfig) -> Result<Self> {
        let pattern = record.require("PATTERN")?;
        Ok(RouteRule {
            location: config.record_location(
                record,
                "LOCATION",
                config.unmarked(Unmarked::PayloadPath)?,
            )?,
            pattern: Regex::new(pattern).map_err(|e| WaypointError::InvalidProperty {
                name: record.key("PATTERN"),
                message: e.to_string(),
            })?,
            destination: record.require("DEST")?.to_string(),
        })
    }
}

impl RouteRule {
    fn matches(&self, ctx: &TransactionContext, payload: &Payload) -> bool {
        self.location
            .get_all(ctx, Some(payload))
            .iter()
            .filter_map(|v| v.as_text().ok())
            .any(|text| self.pattern.is_match(text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Only the first matching rule routes.
    First,
    /// Every matching rule routes.
    All,
}

pub struct RouteNode {
    name: String,
    rules: Vec<RouteRule>,
    mode: RouteMode,
    default: Option<String>,
}

impl RouteNode {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let rules = parse_group::<RouteRule>(config)?;
        if rules.is_empty() {
            return Err(WaypointError::MissingProperty {
                name: "LOCATION_0".into(),
            });
        }
        let mode = match config.properties.get_or("MODE", "first").to_ascii_lowercase().as_str() {
            "first" => RouteMode::First,
            "all" => RouteMode::All,
            other => {
                return Err(WaypointError::InvalidProperty {
                    name: "MODE".into(),
                    message: format!("expected 'first' or 'all', got '{other}'"),
                })
            }
        };
        Ok(Self {
            name: config.name.clone(),
            rules,
            mode,
            default: config.properties.get("DEFAULT").map(String::from),
        })
    }
}

#[async_trait]
impl Node for RouteNode {
    fn node_type(&self) -> &str {
        "route"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        ctx: &mut TransactionContext,
        payload: Option<Payload>,
    ) -> Result<RoutingDecision> {
        let Some(payload) = payload else {
            return Ok(RoutingDecision::EndOfBranch);
        };

        let mut destinations: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if rule.matches(ctx, &payload) && !destinations.contains(&rule.destination.as_str()) {
                destinations.push(&rule.destination);
                if self.mode == RouteMode::First {
                    break;
                }
            }
        }

        if destinations.is_empty() {
            return Ok(match &self.default {
                Some(default) => {
                    tracing::debug!(node = %self.name, destination = %default, "No rule matched, using default");
                    RoutingDecision::to(default.as_str(), payload)
                }
                None => {
                    tracing::debug!(node = %self.name, "No rule matched, ending branch");
                    RoutingDecision::EndOfBranch
                }
            });
        }

        tracing::debug!(node = %self.name, destinations = ?destinations, "Routing payload");
        Ok(RoutingDecision::Continue(
            destinations
                .into_iter()
                .map(|dest| Route::new(dest, payload.clone()))
                .collect(),
        ))
    }
}

use async_trait::async_trait;
use tracing::Level;

use waypoint_location::{Location, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::node::{Node, NodeConfig};
use crate::property_group::{parse_group, FieldSpec, FromGroupRecord, GroupRecord};
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// LogNode: emit every value at the configured locations
// ---------------------------------------------------------------------------

struct LogRule {
    location: Location,
}

impl FromGroupRecord for LogRule {
    fn fields() -> Vec<FieldSpec> {
        vec![FieldSpec::required("LOCATION")]
    }

    fn from_record(record: &GroupRecord, config: &NodeConfig) -> Result<Self> {
        Ok(LogRule {
            location: config.record_location(
                record,
                "LOCATION",
                config.unmarked(Unmarked::PayloadPath)?,
            )?,
        })
    }
}

pub struct LogNode {
    name: String,
    rules: Vec<LogRule>,
    level: Level,
}

impl LogNode {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let level = match config.properties.get_or("LEVEL", "info").to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => {
                return Err(WaypointError::InvalidProperty {
                    name: "LEVEL".into(),
                    message: format!("unknown level '{other}'"),
                })
            }
        };
        Ok(Self {
            name: config.name.clone(),
            rules: parse_group::<LogRule>(config)?,
            level,
        })
    }

    /// Text of every value matched by each rule, in rule order.
    fn collect(&self, ctx: &TransactionContext, payload: Option<&Payload>) -> Vec<(String, String)> {
        let mut lines = Vec::new();
        for rule in &self.rules {
            for value in rule.location.get_all(ctx, payload) {
                let text = match value.as_text() {
                    Ok(text) => text.to_string(),
                    Err(_) => format!("<{}>", value.kind().as_str()),
                };
                lines.push((rule.location.raw().to_string(), text));
            }
        }
        lines
    }

    fn emit(&self, location: &str, value: &str) {
        let node = self.name.as_str();
        match self.level {
            Level::TRACE => tracing::trace!(node, location, value, "Logged value"),
            Level::DEBUG => tracing::debug!(node, location, value, "Logged value"),
            Level::INFO => tracing::info!(node, location, value, "Logged value"),
            Level::WARN => tracing::warn!(node, location, value, "Logged value"),
            _ => tracing::error!(node, location, value, "Logged value"),
        }
    }
}

#[async_trait]
impl Node for LogNode {
    fn node_type(&self) -> &str {
        "log"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        ctx: &mut TransactionContext,
        payload: Option<Payload>,
    ) -> Result<RoutingDecision> {
        if payload.is_none() {
            return Ok(RoutingDecision::EndOfBranch);
        }
        for (location, value) in self.collect(ctx, payload.as_ref()) {
            self.emit(&location, &value);
        }
        Ok(RoutingDecision::Unchanged)
    }
}

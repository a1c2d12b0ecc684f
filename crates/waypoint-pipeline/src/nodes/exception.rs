use async_trait::async_trait;

use waypoint_location::{Candidate, Location, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::node::{Node, NodeConfig};
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// ExceptionNode: turn a carried error back into ordinary text
// ---------------------------------------------------------------------------

/// Recovers the message of a `Carried` payload so downstream nodes can treat
/// an upstream failure as text.
///
/// `FORMAT` may reference `{kind}` and `{message}`. `KIND_TARGET` names a
/// context location that receives the error kind. Non-carried input is left
/// to the default edges.
pub struct ExceptionNode {
    name: String,
    format: Option<String>,
    kind_target: Option<Location>,
    next: Vec<String>,
}

impl ExceptionNode {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let kind_target = config.optional_location("KIND_TARGET", Unmarked::PayloadPath)?;
        if let Some(target) = &kind_target {
            if !matches!(target.candidates().first(), Some(Candidate::Context(_))) {
                return Err(WaypointError::InvalidProperty {
                    name: "KIND_TARGET".into(),
                    message: format!("'{target}' must be a context location"),
                });
            }
        }
        Ok(Self {
            name: config.name.clone(),
            format: config.properties.get("FORMAT").map(String::from),
            kind_target,
            next: config.require_next()?,
        })
    }
}

#[async_trait]
impl Node for ExceptionNode {
    fn node_type(&self) -> &str {
        "exception"
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
        let Some(carried) = payload.as_carried() else {
            return Ok(RoutingDecision::Unchanged);
        };

        let text = match &self.format {
            Some(format) => format
                .replace("{kind}", &carried.kind)
                .replace("{message}", &carried.message),
            None => carried.message.clone(),
        };

        if let Some(target) = &self.kind_target {
            let mut scratch = None;
            target.set_value(ctx, &mut scratch, carried.kind.as_str())?;
        }

        tracing::info!(node = %self.name, kind = %carried.kind, "Recovered carried error");
        Ok(RoutingDecision::broadcast(Payload::text(text), &self.next))
    }
}

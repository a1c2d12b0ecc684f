use async_trait::async_trait;

use waypoint_location::{Location, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext};

use crate::node::{Node, NodeConfig};
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// SplitNode: one collection in, items × destinations out
// ---------------------------------------------------------------------------

/// Splits a collection-shaped payload and routes every item to every `NEXT`
/// destination.
///
/// `SOURCE` optionally selects the collection inside the payload (default:
/// the payload itself). List items, table values and tree child elements are
/// all treated as items; anything else is a single item.
pub struct SplitNode {
    name: String,
    source: Option<Location>,
    next: Vec<String>,
}

impl SplitNode {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let unmarked = config.unmarked(Unmarked::PayloadPath)?;
        Ok(Self {
            name: config.name.clone(),
            source: config.optional_location("SOURCE", unmarked)?,
            next: config.require_next()?,
        })
    }
}

#[async_trait]
impl Node for SplitNode {
    fn node_type(&self) -> &str {
        "split"
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

        let collection = match &self.source {
            Some(source) => source.require_value(&self.name, ctx, Some(&payload))?,
            None => payload,
        };
        let items = collection.items();

        tracing::debug!(
            node = %self.name,
            items = items.len(),
            destinations = self.next.len(),
            "Splitting payload"
        );
        Ok(RoutingDecision::fan_out(items, &self.next))
    }
}

use async_trait::async_trait;

use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::accumulator::Accumulator;
use crate::node::{Node, NodeConfig, NodeState};
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// BatchNode: many payloads in, one list out on batch close
// ---------------------------------------------------------------------------

pub struct BatchNode {
    name: String,
    next: Vec<String>,
    buffer: Accumulator,
}

impl BatchNode {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let buffer = match config.properties.get_parsed::<usize>("MAX_SIZE")? {
            Some(0) => {
                return Err(WaypointError::InvalidProperty {
                    name: "MAX_SIZE".into(),
                    message: "must be at least 1".into(),
                })
            }
            Some(max) => Accumulator::with_max_size(max),
            None => Accumulator::new(),
        };
        Ok(Self {
            name: config.name.clone(),
            next: config.require_next()?,
            buffer,
        })
    }

    fn emit(&self, batch: Vec<Payload>) -> RoutingDecision {
        tracing::info!(node = %self.name, size = batch.len(), "Flushing batch");
        RoutingDecision::broadcast(Payload::list(batch), &self.next)
    }
}

#[async_trait]
impl Node for BatchNode {
    fn node_type(&self) -> &str {
        "batch"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> NodeState {
        self.buffer.state()
    }

    async fn invoke(
        &self,
        _ctx: &mut TransactionContext,
        payload: Option<Payload>,
    ) -> Result<RoutingDecision> {
        match payload {
            Some(payload) => match self.buffer.push(payload) {
                Some(full) => Ok(self.emit(full)),
                None => {
                    tracing::debug!(node = %self.name, buffered = self.buffer.len(), "Buffered payload");
                    Ok(RoutingDecision::EndOfBranch)
                }
            },
            None => match self.buffer.flush() {
                Some(batch) => Ok(self.emit(batch)),
                None => Ok(RoutingDecision::EndOfBranch),
            },
        }
    }
}

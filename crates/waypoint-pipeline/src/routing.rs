// ---------------------------------------------------------------------------
// RoutingDecision: what a node hands back to the dispatcher
// ---------------------------------------------------------------------------

use serde::Serialize;

use waypoint_types::Payload;

/// One payload addressed to one destination node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub destination: String,
    pub payload: Payload,
}

impl Route {
    pub fn new(destination: impl Into<String>, payload: Payload) -> Self {
        Self {
            destination: destination.into(),
            payload,
        }
    }
}

/// Result of one node invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", content = "routes", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Deliver these payloads, in order.
    Continue(Vec<Route>),
    /// Nothing to deliver; this branch stops here.
    EndOfBranch,
    /// The node did not decide; forward the input along the default edges.
    Unchanged,
}

impl RoutingDecision {
    /// Send `payload` to a single destination.
    pub fn to(destination: impl Into<String>, payload: Payload) -> Self {
        RoutingDecision::Continue(vec![Route::new(destination, payload)])
    }

    /// Send the same payload to every destination.
    ///
    /// Each route holds a shared handle to the payload; a downstream `set`
    /// copies before writing, so branches never see each other's changes.
    pub fn broadcast(payload: Payload, destinations: &[String]) -> Self {
        Self::fan_out(vec![payload], destinations)
    }

    /// Cartesian product of payloads × destinations, payload-major.
    pub fn fan_out(payloads: Vec<Payload>, destinations: &[String]) -> Self {
        let routes: Vec<Route> = payloads
            .into_iter()
            .flat_map(|payload| {
                destinations
                    .iter()
                    .map(move |dest| Route::new(dest.as_str(), payload.clone()))
            })
            .collect();
        if routes.is_empty() {
            RoutingDecision::EndOfBranch
        } else {
            RoutingDecision::Continue(routes)
        }
    }

    pub fn routes(&self) -> &[Route] {
        match self {
            RoutingDecision::Continue(routes) => routes,
            RoutingDecision::EndOfBranch | RoutingDecision::Unchanged => &[],
        }
    }

    pub fn into_routes(self) -> Vec<Route> {
        match self {
            RoutingDecision::Continue(routes) => routes,
            RoutingDecision::EndOfBranch | RoutingDecision::Unchanged => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes().is_empty()
    }

    pub fn is_end_of_branch(&self) -> bool {
        matches!(self, RoutingDecision::EndOfBranch)
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, RoutingDecision::Unchanged)
    }

    /// Destinations in route order.
    pub fn destinations(&self) -> Vec<&str> {
        self.routes().iter().map(|r| r.destination.as_str()).collect()
    }
}

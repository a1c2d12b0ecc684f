//! End-to-end tests for Waypoint nodes wired together by a minimal driver.
//!
//! The driver stands in for the external dispatcher: it builds nodes from one
//! shared `.properties` text, delivers routes depth-first in route order, forwards
//! `Unchanged` payloads along `NEXT`, and sends data errors to an optional
//! error branch as carried payloads.

use std::collections::HashMap;

use waypoint_pipeline::{
    default_registry, Node, NodeConfig, NodeState, Properties, RoutingDecision,
};
use waypoint_types::{Path, Payload, PayloadKind, Result, TransactionContext, WaypointError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Driver {
    nodes: HashMap<String, Box<dyn Node>>,
    next: HashMap<String, Vec<String>>,
    error_branch: Option<String>,
}

/// A payload that reached a destination with no configured node.
#[derive(Debug)]
struct Delivery {
    destination: String,
    payload: Payload,
}

impl Driver {
    fn build(text: &str) -> Result<Driver> {
        let props = Properties::parse(text);
        let registry = default_registry();
        let mut nodes = HashMap::new();
        let mut next = HashMap::new();
        for name in props.get_list("nodes") {
            let config = NodeConfig::from_scoped(name.as_str(), &props);
            next.insert(name.clone(), config.next());
            nodes.insert(name, registry.build(&config)?);
        }
        Ok(Driver {
            nodes,
            next,
            error_branch: props.get("error.branch").map(String::from),
        })
    }

    fn node(&self, name: &str) -> &dyn Node {
        self.nodes[name].as_ref()
    }

    async fn run(
        &self,
        ctx: &mut TransactionContext,
        entry: &str,
        payload: Option<Payload>,
    ) -> Result<Vec<Delivery>> {
        let mut stack = vec![(entry.to_string(), payload)];
        let mut delivered = Vec::new();

        while let Some((name, payload)) = stack.pop() {
            let Some(node) = self.nodes.get(&name) else {
                if let Some(payload) = payload {
                    delivered.push(Delivery {
                        destination: name,
                        payload,
                    });
                }
                continue;
            };

            match node.invoke(ctx, payload.clone()).await {
                Ok(RoutingDecision::Continue(routes)) => {
                    for route in routes.into_iter().rev() {
                        stack.push((route.destination, Some(route.payload)));
                    }
                }
                Ok(RoutingDecision::EndOfBranch) => {}
                Ok(RoutingDecision::Unchanged) => {
                    for dest in self.next[&name].iter().rev() {
                        stack.push((dest.clone(), payload.clone()));
                    }
                }
                Err(err) if err.is_data_error() => match &self.error_branch {
                    Some(branch) => stack.push((branch.clone(), Some(err.to_carried()))),
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
        Ok(delivered)
    }
}

const ORDERS: &str = r#"<orders>
    <order id="A-1" type="NEW"><customer>Ada</customer><line sku="X1"/></order>
    <order id="A-2" type="CANCEL"><customer>Bob</customer><line sku="Y2"/></order>
    <order id="A-3" type="NEW"><customer>Cy</customer><line sku="X3"/></order>
</orders>"#;

fn p(s: &str) -> Path {
    Path::parse(s).unwrap()
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn split_emits_items_times_destinations() {
    let driver = Driver::build(
        r#"
nodes = split
node.split.TYPE = split
node.split.NEXT = audit, store
"#,
    )
    .unwrap();
    let mut ctx = TransactionContext::new();
    let delivered = driver
        .run(&mut ctx, "split", Some(Payload::text(ORDERS)))
        .await
        .unwrap();

    assert_eq!(delivered.len(), 3 * 2);
    let ids: Vec<String> = delivered
        .iter()
        .map(|d| {
            let id = d.payload.get(&p("order.@id")).unwrap();
            format!("{}:{}", d.destination, id.as_text().unwrap())
        })
        .collect();
    assert_eq!(
        ids,
        vec!["audit:A-1", "store:A-1", "audit:A-2", "store:A-2", "audit:A-3", "store:A-3"]
    );
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_returns_nothing_until_close_then_one_list() {
    let driver = Driver::build(
        r#"
nodes = batch
node.batch.TYPE = batch
node.batch.NEXT = sink
"#,
    )
    .unwrap();
    let mut ctx = TransactionContext::new();
    let batch = driver.node("batch");

    let k = 4;
    for i in 0..k {
        let decision = batch
            .invoke(&mut ctx, Some(Payload::text(format!("msg-{i}"))))
            .await
            .unwrap();
        assert!(decision.is_end_of_branch());
    }
    assert_eq!(batch.state(), NodeState::Accumulating);

    let flushed = batch.invoke(&mut ctx, None).await.unwrap();
    assert_eq!(flushed.len(), 1);
    let items = flushed.routes()[0].payload.as_list().unwrap();
    assert_eq!(items.len(), k);
    assert_eq!(items[0], Payload::text("msg-0"));
    assert_eq!(batch.state(), NodeState::Idle);

    assert!(batch.invoke(&mut ctx, None).await.unwrap().is_end_of_branch());
}

#[tokio::test]
async fn split_then_batch_reassembles() {
    let driver = Driver::build(
        r#"
nodes = split, batch
node.split.TYPE = split
node.split.NEXT = batch
node.batch.TYPE = batch
node.batch.NEXT = sink
"#,
    )
    .unwrap();
    let mut ctx = TransactionContext::new();

    let delivered = driver
        .run(&mut ctx, "split", Some(Payload::text(ORDERS)))
        .await
        .unwrap();
    assert!(delivered.is_empty());

    let delivered = driver.run(&mut ctx, "batch", None).await.unwrap();
    assert_eq!(delivered.len(), 1);
    let list = &delivered[0].payload;
    assert_eq!(list.kind(), PayloadKind::List);
    assert_eq!(list.as_list().unwrap().len(), 3);
    assert_eq!(list.as_tree().unwrap().name, "list");
}

// ---------------------------------------------------------------------------
// Copy-on-write across sibling branches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sibling_branches_do_not_share_writes() {
    let driver = Driver::build(
        r#"
nodes = fan, stamp, keep
node.fan.TYPE = split
node.fan.NEXT = stamp, keep
node.stamp.TYPE = extract
node.stamp.UNMARKED = literal
node.stamp.FROM_0 = STAMPED
node.stamp.TO_0 = order.@status
node.stamp.NEXT = stamped
node.keep.TYPE = log
node.keep.LOCATION_0 = order.@id
node.keep.NEXT = kept
"#,
    )
    .unwrap();
    let mut ctx = TransactionContext::new();
    let delivered = driver
        .run(&mut ctx, "fan", Some(Payload::text(ORDERS)))
        .await
        .unwrap();

    let stamped: Vec<&Delivery> = delivered.iter().filter(|d| d.destination == "stamped").collect();
    let kept: Vec<&Delivery> = delivered.iter().filter(|d| d.destination == "kept").collect();
    assert_eq!(stamped.len(), kept.len());
    assert!(!stamped.is_empty());

    for d in &stamped {
        assert_eq!(d.payload.get(&p("order.@status")), Some(Payload::text("STAMPED")));
    }
    for d in &kept {
        assert_eq!(d.payload.get(&p("order.@status")), None);
    }
}

// ---------------------------------------------------------------------------
// Context, alternation, and literals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn headers_flow_through_context_to_routing() {
    let driver = Driver::build(
        r#"
nodes = split, headers, router
node.split.TYPE = split
node.split.NEXT = headers
node.headers.TYPE = extract
node.headers.FROM_0 = order.@priority|order.@type
node.headers.TO_0 = context:requestType
node.headers.NEXT = router
node.router.TYPE = route
node.router.LOCATION_0 = context:requestType
node.router.PATTERN_0 = ^CANCEL$
node.router.DEST_0 = cancellations
node.router.DEFAULT = fulfilment
"#,
    )
    .unwrap();

    let mut ctx = TransactionContext::new();
    let delivered = driver
        .run(&mut ctx, "split", Some(Payload::text(ORDERS)))
        .await
        .unwrap();
    let destinations: Vec<&str> = delivered.iter().map(|d| d.destination.as_str()).collect();
    assert_eq!(destinations, vec!["fulfilment", "cancellations", "fulfilment"]);
    assert_eq!(ctx.get_text(&p("requestType")).as_deref(), Some("NEW"));
}

// ---------------------------------------------------------------------------
// Error branch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn data_error_is_carried_to_exception_node() {
    let driver = Driver::build(
        r#"
error.branch = errors
nodes = headers, errors
node.headers.TYPE = extract
node.headers.FROM_0 = order.@missing
node.headers.TO_0 = context:x
node.headers.NEXT = done
node.errors.TYPE = exception
node.errors.FORMAT = {kind}: {message}
node.errors.KIND_TARGET = context:lastError
node.errors.NEXT = operator
"#,
    )
    .unwrap();

    let mut ctx = TransactionContext::new();
    let delivered = driver
        .run(&mut ctx, "headers", Some(Payload::text(r#"<order id="1"/>"#)))
        .await
        .unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].destination, "operator");
    let text = delivered[0].payload.as_text().unwrap();
    assert!(text.starts_with("missing_location: "));
    assert!(text.contains("order.@missing"));
    assert_eq!(ctx.get_text(&p("lastError")).as_deref(), Some("missing_location"));
}

#[tokio::test]
async fn data_error_without_branch_surfaces() {
    let driver = Driver::build(
        r#"
nodes = headers
node.headers.TYPE = extract
node.headers.FROM_0 = order.@missing
node.headers.TO_0 = context:x
node.headers.NEXT = done
"#,
    )
    .unwrap();
    let mut ctx = TransactionContext::new();
    let err = driver
        .run(&mut ctx, "headers", Some(Payload::text("<order/>")))
        .await
        .unwrap_err();
    assert!(matches!(err, WaypointError::MissingLocation { .. }));
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[test]
fn partial_rule_fails_before_any_message() {
    let err = Driver::build(
        r#"
nodes = router
node.router.TYPE = route
node.router.LOCATION_0 = order.@type
node.router.PATTERN_0 = NEW
node.router.DEST_0 = a
node.router.LOCATION_1 = order.@type
"#,
    )
    .err()
    .unwrap();
    assert!(err.is_fatal());
    assert_eq!(
        err.to_string(),
        "Property group record 1 is incomplete: 'PATTERN_1' is required"
    );
}

#[test]
fn unknown_node_type_fails_build() {
    let err = Driver::build("nodes = x\nnode.x.TYPE = teleport\n").err().unwrap();
    assert!(matches!(err, WaypointError::UnknownNodeType(_)));
}

// ---------------------------------------------------------------------------
// Templates and payload round-trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn template_renders_per_order() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("ack.txt");
    tokio::fs::write(&template, "Hello ${NAME}, order ${ID} is ${STATE}.")
        .await
        .unwrap();

    let text = format!(
        r#"
nodes = split, ack
node.split.TYPE = split
node.split.NEXT = ack
node.ack.TYPE = template
node.ack.TEMPLATE_FILE = {}
node.ack.TOKEN_0 = NAME
node.ack.VALUE_0 = order.customer
node.ack.TOKEN_1 = ID
node.ack.VALUE_1 = order.@id
node.ack.TOKEN_2 = STATE
node.ack.VALUE_2 = received
node.ack.NEXT = mail
"#,
        template.display()
    );
    let driver = Driver::build(&text).unwrap();
    let mut ctx = TransactionContext::new();
    let delivered = driver
        .run(&mut ctx, "split", Some(Payload::text(ORDERS)))
        .await
        .unwrap();
    let letters: Vec<&str> = delivered
        .iter()
        .map(|d| d.payload.as_text().unwrap())
        .collect();
    assert_eq!(
        letters,
        vec![
            "Hello Ada, order A-1 is received.",
            "Hello Bob, order A-2 is received.",
            "Hello Cy, order A-3 is received.",
        ]
    );
}

#[test]
fn text_tree_round_trip_is_stable() {
    let tree = Payload::text(ORDERS).as_tree().unwrap().clone();
    let text = Payload::tree(tree.clone()).as_text().unwrap().to_string();
    assert_eq!(Payload::text(text).as_tree().unwrap(), &tree);
}

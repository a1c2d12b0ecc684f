use async_trait::async_trait;

use waypoint_location::{Location, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::node::{Node, NodeConfig};
use crate::property_group::{FieldSpec, PropertyGroup};
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// ExtractNode: copy values between locations
// ---------------------------------------------------------------------------

/// One `FROM_n` → `TO_n` copy rule.
#[derive(Debug, Clone)]
pub struct ExtractRule {
    pub from: Location,
    pub to: Location,
    pub required: bool,
    pub default: Option<String>,
}

/// Copies values between locations, typically header fields into the
/// transaction context, then forwards the (possibly updated) payload.
pub struct ExtractNode {
    name: String,
    rules: Vec<ExtractRule>,
    next: Vec<String>,
}

impl ExtractNode {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let unmarked = config.unmarked(Unmarked::PayloadPath)?;
        let mut rules = Vec::new();
        for record in PropertyGroup::new(config)
            .field(FieldSpec::required("FROM"))
            .field(FieldSpec::required("TO"))
            .field(FieldSpec::optional("REQUIRED"))
            .field(FieldSpec::optional("DEFAULT"))
            .records()
        {
            let record = record?;
            rules.push(ExtractRule {
                from: config.parse_location(&record.key("FROM"), record.require("FROM")?, unmarked)?,
                to: config.parse_location(
                    &record.key("TO"),
                    record.require("TO")?,
                    Unmarked::PayloadPath,
                )?,
                required: record.get_bool("REQUIRED", true)?,
                default: record.get("DEFAULT").map(String::from),
            });
        }
        if rules.is_empty() {
            return Err(WaypointError::MissingProperty {
                name: "FROM_0".into(),
            });
        }

        Ok(Self {
            name: config.name.clone(),
            rules,
            next: config.require_next()?,
        })
    }

    pub fn rules(&self) -> &[ExtractRule] {
        &self.rules
    }
}

#[async_trait]
impl Node for ExtractNode {
    fn node_type(&self) -> &str {
        "extract"
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
        let mut payload = payload;

        for rule in &self.rules {
            let value = match rule.from.get_value(ctx, payload.as_ref()) {
                Some(value) => value,
                None => match &rule.default {
                    Some(default) => Payload::text(default.as_str()),
                    None if rule.required => {
                        return Err(WaypointError::MissingLocation {
                            node: self.name.clone(),
                            location: rule.from.raw().to_string(),
                        })
                    }
                    None => {
                        tracing::debug!(node = %self.name, from = %rule.from, "Optional value absent, skipping");
                        continue;
                    }
                },
            };
            tracing::debug!(node = %self.name, from = %rule.from, to = %rule.to, "Copying value");
            rule.to.set_value(ctx, &mut payload, value)?;
        }

        match payload {
            Some(payload) => Ok(RoutingDecision::broadcast(payload, &self.next)),
            None => Ok(RoutingDecision::EndOfBranch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use waypoint_types::Path;

    const ORDER: &str = r#"<order id="A-17" type="NEW"><customer><id>C-9</id></customer></order>"#;

    fn extract(props: &[(&str, &str)]) -> Result<ExtractNode> {
        ExtractNode::from_config(&NodeConfig::new(
            "headers",
            Properties::from_pairs(props.iter().copied()),
        ))
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[tokio::test]
    async fn copies_header_fields_into_context() {
        let node = extract(&[
            ("NEXT", "route"),
            ("FROM_0", "order.@type"),
            ("TO_0", "context:requestType"),
            ("FROM_1", "order.customer.id"),
            ("TO_1", "context:customerId"),
        ])
        .unwrap();
        let mut ctx = TransactionContext::new();
        let input = Payload::text(ORDER);
        let decision = node.invoke(&mut ctx, Some(input.clone())).await.unwrap();

        assert_eq!(ctx.get_text(&p("requestType")).as_deref(), Some("NEW"));
        assert_eq!(ctx.get_text(&p("customerId")).as_deref(), Some("C-9"));
        assert_eq!(decision.destinations(), vec!["route"]);
        assert!(decision.routes()[0].payload.ptr_eq(&input));
    }

    #[tokio::test]
    async fn writes_into_payload_copy() {
        let node = extract(&[
            ("NEXT", "out"),
            ("FROM_0", "context:batchId"),
            ("TO_0", "order.@batch"),
        ])
        .unwrap();
        let mut ctx = TransactionContext::new();
        ctx.set(&p("batchId"), "B-1").unwrap();
        let input = Payload::text(ORDER);
        let decision = node.invoke(&mut ctx, Some(input.clone())).await.unwrap();

        let out = &decision.routes()[0].payload;
        assert_eq!(out.get(&p("order.@batch")), Some(Payload::text("B-1")));
        assert_eq!(input.get(&p("order.@batch")), None);
    }

    #[tokio::test]
    async fn missing_required_value_is_data_error() {
        let node = extract(&[("NEXT", "x"), ("FROM_0", "order.@missing"), ("TO_0", "context:v")]).unwrap();
        let mut ctx = TransactionContext::new();
        let err = node
            .invoke(&mut ctx, Some(Payload::text(ORDER)))
            .await
            .unwrap_err();
        assert!(err.is_data_error());
        assert!(err.to_string().contains("order.@missing"));
    }

    #[tokio::test]
    async fn optional_and_default_values() {
        let node = extract(&[
            ("NEXT", "x"),
            ("FROM_0", "order.@missing"),
            ("TO_0", "context:a"),
            ("REQUIRED_0", "false"),
            ("FROM_1", "order.@missing"),
            ("TO_1", "context:b"),
            ("DEFAULT_1", "fallback"),
        ])
        .unwrap();
        let mut ctx = TransactionContext::new();
        node.invoke(&mut ctx, Some(Payload::text(ORDER))).await.unwrap();
        assert!(!ctx.exists(&p("a")));
        assert_eq!(ctx.get_text(&p("b")).as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn literal_policy_from_unmarked() {
        let node = extract(&[
            ("NEXT", "x"),
            ("UNMARKED", "literal"),
            ("FROM_0", "MANUAL"),
            ("TO_0", "context:source"),
        ])
        .unwrap();
        let mut ctx = TransactionContext::new();
        node.invoke(&mut ctx, Some(Payload::text(ORDER))).await.unwrap();
        assert_eq!(ctx.get_text(&p("source")).as_deref(), Some("MANUAL"));
    }

    #[test]
    fn partial_rule_fails_construction() {
        let err = extract(&[
            ("NEXT", "x"),
            ("FROM_0", "a"),
            ("TO_0", "context:a"),
            ("FROM_1", "b"),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, WaypointError::IncompleteRecord { index: 1, .. }));
    }

    #[test]
    fn no_rules_fails_construction() {
        assert!(extract(&[("NEXT", "x")]).is_err());
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Captures, Regex};

use waypoint_location::{Location, Unmarked};
use waypoint_types::{Payload, Result, TransactionContext, WaypointError};

use crate::cache::FileCache;
use crate::node::{Node, NodeConfig};
use crate::property_group::{parse_group, FieldSpec, FromGroupRecord, GroupRecord};
use crate::routing::RoutingDecision;

// ---------------------------------------------------------------------------
// TemplateNode: `${TOKEN}` replacement over a cached template
// ---------------------------------------------------------------------------

/// `TOKEN_n` is replaced by the value of `VALUE_n`, which is a location when
/// it resolves and a constant otherwise.
#[derive(Debug, Clone)]
pub struct TokenRule {
    pub token: String,
    pub value: Location,
}

impl FromGroupRecord for TokenRule {
    fn fields() -> Vec<FieldSpec> {
        vec![FieldSpec::required("TOKEN"), FieldSpec::required("VALUE")]
    }

    fn from_record(record: &GroupRecord, config: &NodeConfig) -> Result<Self> {
        Ok(TokenRule {
            token: record.require("TOKEN")?.to_string(),
            value: config.record_location(
                record,
                "VALUE",
                config.unmarked(Unmarked::PathOrLiteral)?,
            )?,
        })
    }
}

/// Renders text from `TEMPLATE_FILE` (read through the shared [`FileCache`])
/// or, without one, from the payload itself. Unknown tokens are left as is.
pub struct TemplateNode {
    name: String,
    template_file: Option<PathBuf>,
    tokens: Vec<TokenRule>,
    placeholder: Regex,
    files: Arc<FileCache>,
    next: Vec<String>,
}

impl TemplateNode {
    pub fn from_config(config: &NodeConfig, files: Arc<FileCache>) -> Result<Self> {
        let placeholder = Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}")
            .map_err(|e| WaypointError::Other(e.to_string()))?;
        Ok(Self {
            name: config.name.clone(),
            template_file: config.properties.get("TEMPLATE_FILE").map(PathBuf::from),
            tokens: parse_group::<TokenRule>(config)?,
            placeholder,
            files,
            next: config.require_next()?,
        })
    }

    fn render(&self, template: &str, values: &HashMap<&str, String>) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

#[async_trait]
impl Node for TemplateNode {
    fn node_type(&self) -> &str {
        "template"
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

        let mut values = HashMap::new();
        for rule in &self.tokens {
            let value = rule.value.get_text(ctx, Some(&payload))?.unwrap_or_default();
            values.insert(rule.token.as_str(), value);
        }

        let rendered = match &self.template_file {
            Some(path) => {
                let template = self.files.read_file(path).await?;
                self.render(&template, &values)
            }
            None => self.render(payload.as_text()?, &values),
        };

        tracing::debug!(node = %self.name, tokens = values.len(), len = rendered.len(), "Rendered template");
        Ok(RoutingDecision::broadcast(Payload::text(rendered), &self.next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use waypoint_types::Path;

    fn template(props: &[(&str, &str)], files: Arc<FileCache>) -> TemplateNode {
        TemplateNode::from_config(
            &NodeConfig::new("letter", Properties::from_pairs(props.iter().copied())),
            files,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn renders_payload_text_with_locations_and_constants() {
        let node = template(
            &[
                ("NEXT", "mail"),
                ("TOKEN_0", "NAME"),
                ("VALUE_0", "context:customer.name"),
                ("TOKEN_1", "GREETING"),
                ("VALUE_1", "Dear"),
            ],
            Arc::new(FileCache::default()),
        );
        let mut ctx = TransactionContext::new();
        ctx.set(&Path::parse("customer.name").unwrap(), "Ada").unwrap();

        let decision = node
            .invoke(&mut ctx, Some(Payload::text("${GREETING} ${NAME}, ${UNKNOWN}")))
            .await
            .unwrap();
        assert_eq!(
            decision.routes()[0].payload,
            Payload::text("Dear Ada, ${UNKNOWN}")
        );
    }

    #[tokio::test]
    async fn reads_template_file_through_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ack.txt");
        tokio::fs::write(&path, "Order ${ID} received").await.unwrap();

        let files = Arc::new(FileCache::default());
        let node = template(
            &[
                ("NEXT", "mail"),
                ("TEMPLATE_FILE", path.to_str().unwrap()),
                ("TOKEN_0", "ID"),
                ("VALUE_0", "order.@id"),
            ],
            files.clone(),
        );
        let mut ctx = TransactionContext::new();
        let decision = node
            .invoke(&mut ctx, Some(Payload::text(r#"<order id="A-17"/>"#)))
            .await
            .unwrap();
        assert_eq!(decision.routes()[0].payload, Payload::text("Order A-17 received"));
        assert_eq!(files.len().await, 1);
    }

    #[tokio::test]
    async fn unmarked_literal_values_are_never_resolved() {
        let node = template(
            &[
                ("NEXT", "mail"),
                ("UNMARKED", "literal"),
                ("TOKEN_0", "FIELD"),
                ("VALUE_0", "order.@id"),
            ],
            Arc::new(FileCache::default()),
        );
        let mut ctx = TransactionContext::new();
        let decision = node
            .invoke(&mut ctx, Some(Payload::text(r#"<order id="A-17">${FIELD}</order>"#)))
            .await
            .unwrap();
        assert_eq!(
            decision.routes()[0].payload,
            Payload::text(r#"<order id="A-17">order.@id</order>"#)
        );
    }

    #[tokio::test]
    async fn missing_template_file_is_fatal() {
        let node = template(
            &[("NEXT", "mail"), ("TEMPLATE_FILE", "/no/such/template.txt")],
            Arc::new(FileCache::default()),
        );
        let mut ctx = TransactionContext::new();
        let err = node
            .invoke(&mut ctx, Some(Payload::text("x")))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}

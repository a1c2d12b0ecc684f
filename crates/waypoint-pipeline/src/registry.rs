//! Node factories keyed by type name.

use std::collections::BTreeMap;
use std::sync::Arc;

use waypoint_types::{Result, WaypointError};

use crate::cache::FileCache;
use crate::node::{Node, NodeConfig};
use crate::nodes::{BatchNode, ExceptionNode, ExtractNode, LogNode, RouteNode, SplitNode, TemplateNode};

/// Shared services handed to node factories.
#[derive(Clone, Default)]
pub struct NodeServices {
    pub files: Arc<FileCache>,
}

pub type NodeFactory =
    Box<dyn Fn(&NodeConfig, &NodeServices) -> Result<Box<dyn Node>> + Send + Sync>;

// ---------------------------------------------------------------------------
// NodeRegistry
// ---------------------------------------------------------------------------

pub struct NodeRegistry {
    factories: BTreeMap<String, NodeFactory>,
    services: NodeServices,
}

impl NodeRegistry {
    pub fn new(services: NodeServices) -> Self {
        Self {
            factories: BTreeMap::new(),
            services,
        }
    }

    pub fn register<F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(&NodeConfig, &NodeServices) -> Result<Box<dyn Node>> + Send + Sync + 'static,
    {
        self.factories.insert(node_type.into(), Box::new(factory));
    }

    pub fn has(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn services(&self) -> &NodeServices {
        &self.services
    }

    /// Construct the node described by `config`, dispatching on its `TYPE`.
    ///
    /// All configuration is validated here, before any message is processed.
    pub fn build(&self, config: &NodeConfig) -> Result<Box<dyn Node>> {
        let node_type = config.node_type()?;
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WaypointError::UnknownNodeType(node_type.to_string()))?;
        let node = factory(config, &self.services)?;
        tracing::info!(node = %config.name, node_type = %node_type, "Node constructed");
        Ok(node)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(NodeServices::default())
    }
}

/// Create a registry with every built-in node type and fresh services.
pub fn default_registry() -> NodeRegistry {
    default_registry_with_services(NodeServices::default())
}

/// Create a registry with every built-in node type sharing `services`.
pub fn default_registry_with_services(services: NodeServices) -> NodeRegistry {
    let mut reg = NodeRegistry::new(services);
    reg.register("split", |c, _| Ok(Box::new(SplitNode::from_config(c)?)));
    reg.register("batch", |c, _| Ok(Box::new(BatchNode::from_config(c)?)));
    reg.register("extract", |c, _| Ok(Box::new(ExtractNode::from_config(c)?)));
    reg.register("route", |c, _| Ok(Box::new(RouteNode::from_config(c)?)));
    reg.register("exception", |c, _| Ok(Box::new(ExceptionNode::from_config(c)?)));
    reg.register("template", |c, s| {
        Ok(Box::new(TemplateNode::from_config(c, s.files.clone())?))
    });
    reg.register("log", |c, _| Ok(Box::new(LogNode::from_config(c)?)));
    reg
}

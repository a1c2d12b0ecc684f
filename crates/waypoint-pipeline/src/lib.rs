//! Node contract, routing decisions, and built-in nodes.
//!
//! This crate implements everything a Waypoint node needs besides the
//! dispatcher that drives it: node configuration and the indexed property
//! group parser, the `Node` trait and its tri-state `RoutingDecision`, the
//! accumulator state machine, injectable caches, and the node registry with
//! its built-in leaf nodes.

pub mod accumulator;
pub mod cache;
pub mod config;
pub mod node;
pub mod nodes;
pub mod property_group;
pub mod registry;
pub mod routing;

pub use accumulator::Accumulator;
pub use cache::{Cache, FileCache};
pub use config::{Properties, PropertySource};
pub use node::{Node, NodeConfig, NodeState};
pub use nodes::{
    BatchNode, ExceptionNode, ExtractNode, LogNode, RouteNode, SplitNode, TemplateNode,
};
pub use property_group::{
    parse_group, FieldSpec, FromGroupRecord, GroupRecord, PropertyGroup, Records,
};
pub use registry::{
    default_registry, default_registry_with_services, NodeFactory, NodeRegistry, NodeServices,
};
pub use routing::{Route, RoutingDecision};

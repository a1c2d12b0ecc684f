pub mod batch;
pub mod exception;
pub mod extract;
pub mod log;
pub mod route;
pub mod split;
pub mod template;

pub use batch::BatchNode;
pub use exception::ExceptionNode;
pub use extract::{ExtractNode, ExtractRule};
pub use log::LogNode;
pub use route::{RouteMode, RouteNode, RouteRule};
pub use split::SplitNode;
pub use template::{TemplateNode, TokenRule};

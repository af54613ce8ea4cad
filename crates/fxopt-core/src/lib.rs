pub mod edge;
pub mod error;
pub mod graph;
pub mod graph_module;
pub mod id;
pub mod layer;
pub mod module;
pub mod node;
pub mod ops;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::Graph;
pub use graph_module::GraphModule;
pub use id::NodeId;
pub use layer::{BatchNorm1d, Layer, LayerNorm, Linear};
pub use module::{split_target, Submodule};
pub use node::Node;
pub use ops::{Argument, Function, NodeOp, OpKind};

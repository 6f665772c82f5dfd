//! Node graph execution.
//!
//! A turn is a walk over a fixed graph of [`Node`]s. Each node runs three
//! phases against the conversation's [`TurnContext`](crate::context::TurnContext)
//! and returns an [`Action`]. The [`Graph`] maps `(node, action)` to the next
//! node; when no edge matches, the walk ends. [`Flow`] drives the walk.

pub mod flow;
pub mod node;
pub mod table;

pub use flow::{Flow, FlowReport, Step};
pub use node::{Action, DynNode, Node, NodeId};
pub use table::{Graph, GraphBuilder, GraphError};

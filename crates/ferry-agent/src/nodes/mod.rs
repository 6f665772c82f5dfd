//! The nodes of the agent graph.

mod decide;
mod execute;
mod prepare;
mod terminal;

pub use decide::DecideNode;
pub use execute::{ExecuteNode, ExecuteOutcome};
pub use prepare::PrepareNode;
pub use terminal::{CompleteNode, ErrorNode};

use crate::graph::NodeId;

pub const PREPARE: NodeId = NodeId("prepare");
pub const DECIDE: NodeId = NodeId("decide");
pub const EXECUTE: NodeId = NodeId("execute");
pub const COMPLETE: NodeId = NodeId("complete");
pub const ERROR: NodeId = NodeId("error");

pub const STATUS_PREPARING: &str = "Getting tools";
pub const STATUS_THINKING: &str = "Thinking";
pub const STATUS_EXECUTING: &str = "Executing";
pub const STATUS_AWAITING_ACK: &str = "Awaiting acknowledgement";
pub const STATUS_COMPLETED: &str = "Completed";

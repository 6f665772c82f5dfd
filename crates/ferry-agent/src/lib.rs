//! Turn orchestration for Ferry.
//!
//! An [`Agent`] owns the node graph (prepare, decide, execute, complete,
//! error) and runs it against a [`Conversation`]'s [`TurnContext`]. Sessions
//! group the conversations of one client connection.

pub mod agent;
pub mod context;
pub mod gate;
pub mod graph;
pub mod nodes;
pub mod session;
pub mod stream;

pub use agent::Agent;
pub use context::TurnContext;
pub use gate::AnswerGate;
pub use graph::{Action, Flow, FlowReport, Graph, NodeId};
pub use session::{Conversation, Session, SessionManager, SharedConversation};
pub use stream::StreamPrinter;

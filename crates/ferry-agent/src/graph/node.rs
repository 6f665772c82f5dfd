use std::fmt;

use futures::future::BoxFuture;

use crate::context::TurnContext;

/// Stable identity of a node within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub &'static str);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Outcome a node reports after its decide phase.
///
/// `Pause` and `Done` end the walk on purpose and may not label an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    CallLlm,
    Execute,
    Complete,
    Error,
    /// Waiting for the client to acknowledge before continuing.
    Pause,
    /// The turn is over.
    Done,
}

impl Action {
    pub fn is_terminal(self) -> bool {
        matches!(self, Action::Pause | Action::Done)
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::CallLlm => "call_llm",
            Action::Execute => "execute",
            Action::Complete => "complete",
            Action::Error => "error",
            Action::Pause => "pause",
            Action::Done => "done",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A three-phase unit of work.
///
/// `prepare` reads and updates the context, `execute` does the external work
/// without touching the context, and `decide` folds the outcome back in and
/// picks the action. The phases always run in that order.
pub trait Node: Send + Sync + 'static {
    type Prep: Send;
    type Exec: Send;

    fn id(&self) -> NodeId;

    /// Every action `decide` can return.
    fn outcomes(&self) -> &'static [Action];

    fn prepare<'a>(&'a self, ctx: &'a mut TurnContext) -> BoxFuture<'a, Self::Prep>;

    fn execute<'a>(&'a self, prep: &'a mut Self::Prep) -> BoxFuture<'a, Self::Exec>;

    fn decide<'a>(
        &'a self,
        ctx: &'a mut TurnContext,
        prep: Self::Prep,
        exec: Self::Exec,
    ) -> BoxFuture<'a, Action>;
}

/// Object-safe view of a [`Node`], as stored in a [`Graph`](super::Graph).
pub trait DynNode: Send + Sync {
    fn id(&self) -> NodeId;

    fn outcomes(&self) -> &'static [Action];

    fn run<'a>(&'a self, ctx: &'a mut TurnContext) -> BoxFuture<'a, Action>;
}

impl<N: Node> DynNode for N {
    fn id(&self) -> NodeId {
        Node::id(self)
    }

    fn outcomes(&self) -> &'static [Action] {
        Node::outcomes(self)
    }

    fn run<'a>(&'a self, ctx: &'a mut TurnContext) -> BoxFuture<'a, Action> {
        Box::pin(async move {
            let mut prep = self.prepare(ctx).await;
            let exec = self.execute(&mut prep).await;
            self.decide(ctx, prep, exec).await
        })
    }
}

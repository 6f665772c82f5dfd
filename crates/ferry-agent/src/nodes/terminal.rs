use futures::future::BoxFuture;
use tracing::{error, info};

use super::{COMPLETE, ERROR, STATUS_COMPLETED};
use crate::context::TurnContext;
use crate::graph::{Action, Node, NodeId};

/// Reports a finished turn.
pub struct CompleteNode;

impl Node for CompleteNode {
    type Prep = ();
    type Exec = ();

    fn id(&self) -> NodeId {
        COMPLETE
    }

    fn outcomes(&self) -> &'static [Action] {
        &[Action::Done]
    }

    fn prepare<'a>(&'a self, _ctx: &'a mut TurnContext) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn execute<'a>(&'a self, _prep: &'a mut ()) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn decide<'a>(&'a self, ctx: &'a mut TurnContext, _: (), _: ()) -> BoxFuture<'a, Action> {
        Box::pin(async move {
            info!(
                conversation = %ctx.conversation_id,
                answers = ctx.answers.len(),
                "Turn completed"
            );
            ctx.sink().status(STATUS_COMPLETED).await;
            Action::Done
        })
    }
}

/// Reports a failed turn with a single terminal status.
pub struct ErrorNode;

impl Node for ErrorNode {
    type Prep = ();
    type Exec = ();

    fn id(&self) -> NodeId {
        ERROR
    }

    fn outcomes(&self) -> &'static [Action] {
        &[Action::Done]
    }

    fn prepare<'a>(&'a self, _ctx: &'a mut TurnContext) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn execute<'a>(&'a self, _prep: &'a mut ()) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn decide<'a>(&'a self, ctx: &'a mut TurnContext, _: (), _: ()) -> BoxFuture<'a, Action> {
        Box::pin(async move {
            let message = ctx.error.as_deref().unwrap_or("unknown error").to_string();
            error!(conversation = %ctx.conversation_id, error = %message, "Turn failed");
            ctx.sink().status(&format!("Error: {}", message)).await;
            Action::Done
        })
    }
}

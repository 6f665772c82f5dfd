use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ferry_agent::{Agent, SessionManager};

/// Shared application state for axum handlers.
pub struct AppState {
    pub agent: Arc<Agent>,
    pub sessions: Arc<SessionManager>,
    pub incomplete_prompt: String,
    /// Parent of every connection's token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

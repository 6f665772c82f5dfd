use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use ferry_agent::{Agent, SessionManager};
use ferry_core::config::GatewayConfig;

use crate::routes;
use crate::state::AppState;

/// WebSocket + HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    agent: Arc<Agent>,
    sessions: Arc<SessionManager>,
    incomplete_prompt: String,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        agent: Arc<Agent>,
        sessions: Arc<SessionManager>,
        incomplete_prompt: impl Into<String>,
    ) -> Self {
        Self {
            config,
            agent,
            sessions,
            incomplete_prompt: incomplete_prompt.into(),
        }
    }

    pub fn router(&self, shutdown: CancellationToken) -> Router {
        let state = Arc::new(AppState {
            agent: self.agent.clone(),
            sessions: self.sessions.clone(),
            incomplete_prompt: self.incomplete_prompt.clone(),
            shutdown,
        });

        Router::new()
            .route("/ws", get(routes::ws_handler))
            .route("/api/health", get(routes::health))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.bind).await?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(bind = %listener.local_addr()?, "Gateway listening");
        let app = self.router(shutdown.clone());

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

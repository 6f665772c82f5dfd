use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent, Tool as McpTool};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use ferry_core::config::{McpServerConfig, McpTransport};
use ferry_core::error::{FerryError, Result};

use crate::handler::FerryClientHandler;

type McpConnection = RunningService<RoleClient, FerryClientHandler>;

/// Connections to every configured MCP server, keyed by server name.
#[derive(Default)]
pub struct McpClientManager {
    connections: Mutex<HashMap<String, McpConnection>>,
    server_configs: Mutex<HashMap<String, McpServerConfig>>,
}

impl McpClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to a server and remember its config for reconnects.
    pub async fn connect(&self, name: &str, config: &McpServerConfig) -> Result<()> {
        let handler = FerryClientHandler::new(name);

        let client = match &config.transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd)
                    .map_err(|e| FerryError::Mcp(format!("failed to spawn {}: {}", command, e)))?;

                handler.serve(transport).await.map_err(|e| {
                    FerryError::Mcp(format!("failed to initialize MCP client for {}: {}", name, e))
                })?
            }
            McpTransport::Sse { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                <FerryClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                    .await
                    .map_err(|e| FerryError::Mcp(format!("MCP init for '{}' failed: {}", name, e)))?
            }
        };

        info!(server = %name, "MCP server connected");

        self.connections.lock().await.insert(name.to_string(), client);
        self.server_configs
            .lock()
            .await
            .insert(name.to_string(), config.clone());
        Ok(())
    }

    /// Drop the current connection and connect again with the stored config.
    pub async fn reconnect(&self, server_name: &str) -> Result<()> {
        let config = self
            .server_configs
            .lock()
            .await
            .get(server_name)
            .cloned()
            .ok_or_else(|| FerryError::Mcp(format!("no stored config for server '{}'", server_name)))?;

        if let Some(mut old) = self.connections.lock().await.remove(server_name) {
            let _ = old.close().await;
        }

        self.connect(server_name, &config).await
    }

    pub async fn is_connected(&self, server_name: &str) -> bool {
        self.connections
            .lock()
            .await
            .get(server_name)
            .map(|c| !c.is_closed())
            .unwrap_or(false)
    }

    /// Connected server names, sorted.
    pub async fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// A handle for issuing requests without holding the connection map
    /// locked, so calls to the same server can overlap.
    async fn peer(&self, server_name: &str) -> Result<Peer<RoleClient>> {
        self.connections
            .lock()
            .await
            .get(server_name)
            .map(|c| c.peer().clone())
            .ok_or_else(|| FerryError::Mcp(format!("server '{}' not connected", server_name)))
    }

    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<McpTool>> {
        let peer = self.peer(server_name).await?;
        let tools = peer.list_all_tools().await.map_err(|e| {
            FerryError::Mcp(format!("failed to list tools from '{}': {}", server_name, e))
        })?;

        debug!(server = %server_name, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    /// Call a tool, reconnecting once if the transport has gone away.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let result = self
            .call_tool_inner(server_name, tool_name, arguments.clone())
            .await;

        if let Err(FerryError::Mcp(ref message)) = result {
            if message.contains("closed") || message.contains("Transport") {
                warn!(server = %server_name, "MCP transport closed, attempting reconnect");
                if self.reconnect(server_name).await.is_ok() {
                    return self.call_tool_inner(server_name, tool_name, arguments).await;
                }
            }
        }

        result
    }

    async fn call_tool_inner(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let timeout_secs = self
            .server_configs
            .lock()
            .await
            .get(server_name)
            .map(|c| c.timeout_secs)
            .unwrap_or(120);

        let peer = self.peer(server_name).await?;
        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments: Some(arguments),
            meta: None,
            task: None,
        };

        let call = peer.call_tool(params);
        let result = match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
            Ok(r) => r.map_err(|e| {
                FerryError::Mcp(format!("tool call '{}.{}' failed: {}", server_name, tool_name, e))
            })?,
            Err(_) => {
                return Err(FerryError::ToolTimeout {
                    tool: tool_name.to_string(),
                    timeout_secs,
                })
            }
        };

        let text = render_content(&result);
        if result.is_error.unwrap_or(false) {
            return Err(FerryError::ToolExecution {
                tool: tool_name.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    pub async fn disconnect_all(&self) {
        let mut conns = self.connections.lock().await;
        for (name, mut client) in conns.drain() {
            let _ = client.close().await;
            info!(server = %name, "MCP server disconnected");
        }
    }
}

fn render_content(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .map(|c| match c.raw {
            RawContent::Text(ref t) => t.text.to_string(),
            _ => format!("{:?}", c.raw),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

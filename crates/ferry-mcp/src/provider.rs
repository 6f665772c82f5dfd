use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use ferry_core::config::McpConfig;
use ferry_core::error::{FerryError, Result};
use ferry_core::traits::ToolProvider;
use ferry_core::types::ToolDefinition;

use crate::client::McpClientManager;

/// [`ToolProvider`] over every connected MCP server.
///
/// Tool names share one namespace. When two servers advertise the same name,
/// the server that sorts first keeps it.
pub struct McpToolProvider {
    manager: Arc<McpClientManager>,
    /// Tool name -> server name, rebuilt on every listing.
    routes: RwLock<HashMap<String, String>>,
}

impl McpToolProvider {
    pub fn new(manager: Arc<McpClientManager>) -> Self {
        Self {
            manager,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Connect to every configured server. Servers that fail to start are
    /// logged and left out.
    pub async fn connect(config: &McpConfig) -> Self {
        let manager = Arc::new(McpClientManager::new());
        let mut names: Vec<_> = config.servers.keys().collect();
        names.sort();
        for name in names {
            if let Err(e) = manager.connect(name, &config.servers[name]).await {
                warn!(server = %name, error = %e, "Failed to connect MCP server");
            }
        }
        Self::new(manager)
    }

    pub fn manager(&self) -> &Arc<McpClientManager> {
        &self.manager
    }

    fn route(&self, tool: &str) -> Option<String> {
        self.routes
            .read()
            .ok()
            .and_then(|routes| routes.get(tool).cloned())
    }
}

impl ToolProvider for McpToolProvider {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDefinition>>> {
        Box::pin(async move {
            let mut catalog = Catalog::default();
            for server in self.manager.connected_servers().await {
                for tool in self.manager.list_tools(&server).await? {
                    let schema = serde_json::to_value(&*tool.input_schema)
                        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
                    catalog.add(
                        &server,
                        definition(&tool.name, tool.description.as_deref(), schema),
                    );
                }
            }

            debug!(count = catalog.definitions.len(), "Remote tools listed");
            let (definitions, routes) = catalog.into_parts();
            if let Ok(mut table) = self.routes.write() {
                *table = routes;
            }
            Ok(definitions)
        })
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let server = self
                .route(name)
                .ok_or_else(|| FerryError::ToolNotFound(name.to_string()))?;
            debug!(server = %server, tool = %name, "Calling MCP tool");
            self.manager.call_tool(&server, name, arguments).await
        })
    }
}

fn definition(name: &str, description: Option<&str>, schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description
            .map(str::to_string)
            .unwrap_or_else(|| format!("MCP tool: {}", name)),
        input_schema: schema,
    }
}

/// Merged tool listing across servers.
#[derive(Default)]
struct Catalog {
    definitions: Vec<ToolDefinition>,
    routes: HashMap<String, String>,
}

impl Catalog {
    fn add(&mut self, server: &str, def: ToolDefinition) {
        if let Some(owner) = self.routes.get(&def.name) {
            warn!(
                tool = %def.name,
                kept = %owner,
                dropped = %server,
                "Tool offered by more than one MCP server"
            );
            return;
        }
        self.routes.insert(def.name.clone(), server.to_string());
        self.definitions.push(def);
    }

    fn into_parts(self) -> (Vec<ToolDefinition>, HashMap<String, String>) {
        (self.definitions, self.routes)
    }
}

/// Provider for a deployment with no MCP servers configured.
pub struct NoRemoteTools;

impl ToolProvider for NoRemoteTools {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDefinition>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        _arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Err(FerryError::ToolNotFound(name.to_string())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> ToolDefinition {
        definition(name, None, serde_json::json!({"type": "object"}))
    }

    #[test]
    fn test_missing_description_gets_placeholder() {
        assert_eq!(def("list_tables").description, "MCP tool: list_tables");
        let d = definition("q", Some("Run a query"), serde_json::json!({}));
        assert_eq!(d.description, "Run a query");
    }

    #[test]
    fn test_first_server_keeps_duplicate_name() {
        let mut catalog = Catalog::default();
        catalog.add("alpha", def("query"));
        catalog.add("beta", def("query"));
        catalog.add("beta", def("list_tables"));

        let (defs, routes) = catalog.into_parts();
        assert_eq!(defs.len(), 2);
        assert_eq!(routes["query"], "alpha");
        assert_eq!(routes["list_tables"], "beta");
    }

    #[tokio::test]
    async fn test_no_servers_means_no_tools() {
        let provider = McpToolProvider::new(Arc::new(McpClientManager::new()));
        assert!(provider.list_tools().await.unwrap().is_empty());

        let err = provider
            .call_tool("anything", serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FerryError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_no_remote_tools() {
        assert!(NoRemoteTools.list_tools().await.unwrap().is_empty());
        let err = NoRemoteTools
            .call_tool("query", serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FerryError::ToolNotFound(name) if name == "query"));
    }
}

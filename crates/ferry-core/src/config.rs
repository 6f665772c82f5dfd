use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FerryError, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful assistant that completes tasks by \
calling the tools available to you. Think step by step with the sequentialthinking tool when \
the task needs planning. Report your findings to the user in plain text. When the task is \
finished and the user has received the answer, call the task_done tool.";

pub const DEFAULT_INCOMPLETE_PROMPT: &str =
    "It seems that you have not completed the task. You should return result to user.";

/// Top-level Ferry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on node invocations in one flow run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Sent back when the model tries to stop without having answered.
    #[serde(default = "default_incomplete_prompt")]
    pub incomplete_prompt: String,
    /// Tools whose calls pause the turn until the client acknowledges.
    #[serde(default)]
    pub confirm_tools: Vec<String>,
    /// Tool name -> string argument streamed live to the client.
    #[serde(default = "default_stream_fields")]
    pub stream_fields: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            system_prompt: None,
            incomplete_prompt: default_incomplete_prompt(),
            confirm_tools: Vec::new(),
            stream_fields: default_stream_fields(),
        }
    }
}

impl AgentConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

fn default_max_steps() -> usize { 100 }
fn default_incomplete_prompt() -> String { DEFAULT_INCOMPLETE_PROMPT.to_string() }
fn default_stream_fields() -> HashMap<String, String> {
    HashMap::from([("sequentialthinking".to_string(), "thought".to_string())])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM calls.
///
/// Every failed attempt is followed by a uniformly random pause in
/// `[min_backoff_ms, max_backoff_ms]`, except the last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 { 3 }
fn default_min_backoff() -> u64 { 3000 }
fn default_max_backoff() -> u64 { 5000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

/// MCP (Model Context Protocol) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub transport: McpTransport,
    /// Per-tool-call timeout in seconds. Default: 120.
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 { 120 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
    },
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FerryError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| FerryError::Config(e.to_string()))?;
        config.validate()?;
        debug!(
            path = %path.display(),
            mcp_servers = config.mcp.servers.len(),
            "Config loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let retry = &self.model.retry;
        if retry.max_attempts == 0 {
            return Err(FerryError::Config(
                "model.retry.max_attempts must be at least 1".into(),
            ));
        }
        if retry.min_backoff_ms > retry.max_backoff_ms {
            return Err(FerryError::Config(format!(
                "model.retry.min_backoff_ms ({}) exceeds max_backoff_ms ({})",
                retry.min_backoff_ms, retry.max_backoff_ms
            )));
        }
        if self.agent.max_steps == 0 {
            return Err(FerryError::Config("agent.max_steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay literal
                Err(_) => {
                    warn!(var = %var_name, "Config references an unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferry_agent::{Agent, Conversation, SessionManager};
use ferry_core::config::AppConfig;
use ferry_core::error::FerryError;
use ferry_core::output::{OutputEvent, OutputSink};
use ferry_core::traits::ToolProvider;
use ferry_gateway::GatewayServer;
use ferry_mcp::{McpToolProvider, NoRemoteTools};

#[derive(Parser)]
#[command(name = "ferry", version, about = "Tool-calling agent served over WebSocket")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ferry.toml", env = "FERRY_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway server (default)
    Serve,
    /// Run a single prompt in the terminal and exit
    Run {
        /// The prompt to send to the agent; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferry=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    if let Some(Commands::Config) = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let model = Arc::new(ferry_llm::create_chat_model(&config.model)?);
    let mcp = if config.mcp.servers.is_empty() {
        None
    } else {
        Some(Arc::new(McpToolProvider::connect(&config.mcp).await))
    };
    let tools: Arc<dyn ToolProvider> = match &mcp {
        Some(provider) => provider.clone(),
        None => Arc::new(NoRemoteTools),
    };
    let agent = Arc::new(Agent::new(model, tools, &config.agent)?);
    let mcp_servers = match &mcp {
        Some(provider) => provider.manager().connected_servers().await.len(),
        None => 0,
    };
    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        mcp_servers,
        "Agent ready"
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
        cancel_clone.cancel();
    });

    let result = match cli.command {
        Some(Commands::Run { prompt }) => {
            let text = if prompt.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                prompt.join(" ")
            };
            run_once(&agent, &text, &config.agent.incomplete_prompt, &cancel).await
        }
        _ => {
            let server = GatewayServer::new(
                config.gateway.clone(),
                agent,
                Arc::new(SessionManager::new()),
                config.agent.incomplete_prompt.clone(),
            );
            server.run(cancel).await
        }
    };

    if let Some(provider) = mcp {
        provider.manager().disconnect_all().await;
    }
    result
}

/// Run one turn against the terminal, asking on stdin whenever the turn
/// pauses for acknowledgement.
async fn run_once(
    agent: &Agent,
    input: &str,
    incomplete_prompt: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut conversation = Conversation::new(input, Arc::new(StdoutSink), incomplete_prompt);

    loop {
        match agent.run(&mut conversation, cancel).await {
            Ok(report) if report.paused() => {
                if !confirm().await? {
                    eprintln!("[cancelled]");
                    return Ok(());
                }
                conversation.acknowledge();
            }
            Ok(_) => return Ok(()),
            Err(FerryError::Cancelled) => {
                warn!("Turn cancelled");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn confirm() -> anyhow::Result<bool> {
    let answer = tokio::task::spawn_blocking(|| {
        eprint!("Continue? [y/N] ");
        io::stderr().flush().ok();
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Prints stream blocks to stdout and everything else to stderr.
struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, event: OutputEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match event {
                OutputEvent::Start => {}
                OutputEvent::Chunk(text) => {
                    print!("{}", text);
                    io::stdout().flush().ok();
                }
                OutputEvent::End => println!(),
                OutputEvent::Text(text) => println!("{}", text),
                OutputEvent::Status(label) => eprintln!("[{}]", label),
                OutputEvent::Error(message) => eprintln!("[error] {}", message),
            }
        })
    }
}

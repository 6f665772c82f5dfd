pub mod accumulate;
pub mod providers;
pub mod retry;
pub mod streaming;

use ferry_core::config::ModelConfig;
use ferry_core::error::{FerryError, Result};
use ferry_core::traits::LlmClient;

pub use accumulate::ResponseAccumulator;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingChat;

/// Create an LLM client based on the provider name.
///
/// Every supported provider speaks the OpenAI chat-completions dialect;
/// `base_url` selects the endpoint.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "azure" | "ollama" | "vllm" | "groq" | "openrouter" | "deepseek" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(FerryError::UnsupportedProvider(other.to_string())),
    }
}

/// Client plus retry policy, ready for the agent.
pub fn create_chat_model(config: &ModelConfig) -> Result<RetryingChat> {
    Ok(RetryingChat::new(create_client(config)?, config.clone()))
}

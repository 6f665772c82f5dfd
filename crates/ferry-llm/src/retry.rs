use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use rand::Rng;
use tracing::{debug, info, warn};

use ferry_core::config::{ModelConfig, RetryConfig};
use ferry_core::error::{FerryError, Result};
use ferry_core::traits::{ChatModel, LlmClient, StreamObserver};
use ferry_core::types::*;

use crate::accumulate::ResponseAccumulator;

/// A [`ChatModel`] over a streaming client that retries whole attempts.
///
/// An attempt is opening the stream and consuming it to the end; an error at
/// any point fails the attempt. After `max_attempts` failures the call fails
/// with [`FerryError::RetriesExhausted`].
pub struct RetryingChat {
    client: Box<dyn LlmClient>,
    config: ModelConfig,
}

impl RetryingChat {
    pub fn new(client: Box<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        observer: &mut dyn StreamObserver,
    ) -> Result<LlmResponse> {
        let mut stream = self
            .client
            .chat_stream(&self.config, messages.to_vec(), tools)
            .await?;

        let mut acc = ResponseAccumulator::new();
        let consumed: Result<()> = async {
            while let Some(delta) = stream.next().await {
                let delta = delta?;
                observer.on_delta(&delta).await;
                acc.push(&delta);
            }
            Ok(())
        }
        .await;
        observer.finish().await;
        consumed?;

        acc.finish()
    }
}

fn calculate_backoff(config: &RetryConfig) -> Duration {
    let lo = config.min_backoff_ms.min(config.max_backoff_ms);
    let hi = config.max_backoff_ms.max(lo);
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

impl ChatModel for RetryingChat {
    fn chat<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        tools: &'a [ToolDefinition],
        observer: &'a mut dyn StreamObserver,
    ) -> BoxFuture<'a, Result<LlmResponse>> {
        Box::pin(async move {
            let retry = &self.config.retry;
            let max_attempts = retry.max_attempts.max(1);
            let mut last_err = None;

            for attempt in 1..=max_attempts {
                debug!(attempt, max_attempts, "LLM attempt");
                match self.attempt(&messages, tools, observer).await {
                    Ok(mut response) => {
                        if attempt > 1 {
                            info!(attempt, "LLM call succeeded after retry");
                        }
                        response.model = Some(self.config.model_id.clone());
                        return Ok(response);
                    }
                    Err(e) => {
                        if attempt < max_attempts {
                            let backoff = calculate_backoff(retry);
                            warn!(
                                attempt,
                                max_attempts,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                        } else {
                            warn!(attempt, error = %e, "LLM attempts exhausted");
                        }
                        last_err = Some(e);
                    }
                }
            }

            Err(FerryError::RetriesExhausted {
                attempts: max_attempts,
                last: last_err.map(|e| e.to_string()).unwrap_or_default(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use ferry_core::traits::NoopObserver;
    use ferry_test_utils::{FailingLlm, ScriptedLlm};

    fn model(max_attempts: u32, min: u64, max: u64) -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "test-model".into(),
            api_key: None,
            base_url: None,
            max_tokens: 256,
            temperature: 0.0,
            top_p: None,
            retry: RetryConfig {
                max_attempts,
                min_backoff_ms: min,
                max_backoff_ms: max,
            },
        }
    }

    #[tokio::test]
    async fn test_exactly_k_attempts_then_fatal() {
        for k in 1..=4u32 {
            let llm = FailingLlm::new();
            let calls = llm.calls();
            let chat = RetryingChat::new(Box::new(llm), model(k, 0, 0));

            let err = chat
                .chat(vec![ChatMessage::user("hi")], &[], &mut NoopObserver)
                .await
                .unwrap_err();

            assert_eq!(calls.load(Ordering::SeqCst), k as usize);
            match err {
                FerryError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, k),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_stays_within_window() {
        let llm = FailingLlm::new();
        let chat = RetryingChat::new(Box::new(llm), model(3, 3000, 5000));

        let started = tokio::time::Instant::now();
        let _ = chat
            .chat(vec![ChatMessage::user("hi")], &[], &mut NoopObserver)
            .await;
        let waited = started.elapsed();

        // Two pauses between three attempts
        assert!(waited >= Duration::from_millis(6000), "{waited:?}");
        assert!(waited <= Duration::from_millis(10_100), "{waited:?}");
    }

    #[tokio::test]
    async fn test_recovers_when_a_later_attempt_succeeds() {
        let llm = ScriptedLlm::new()
            .then_fail("HTTP 503")
            .then_deltas(vec![
                StreamDelta::TextDelta("ok".into()),
                StreamDelta::Stop(FinishReason::Stop),
            ]);
        let calls = llm.calls();
        let chat = RetryingChat::new(Box::new(llm), model(3, 0, 0));

        let response = chat
            .chat(vec![ChatMessage::user("hi")], &[], &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.model.as_deref(), Some("test-model"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mid_stream_error_fails_the_attempt() {
        let llm = ScriptedLlm::new()
            .then_broken_stream(vec![StreamDelta::TextDelta("par".into())], "connection reset")
            .then_deltas(vec![StreamDelta::TextDelta("full".into())]);
        let chat = RetryingChat::new(Box::new(llm), model(2, 0, 0));

        let response = chat
            .chat(vec![ChatMessage::user("hi")], &[], &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(response.content, "full");
    }

    #[test]
    fn test_calculate_backoff_bounds() {
        let cfg = RetryConfig {
            max_attempts: 3,
            min_backoff_ms: 3000,
            max_backoff_ms: 5000,
        };
        for _ in 0..100 {
            let d = calculate_backoff(&cfg);
            assert!(d >= Duration::from_millis(3000) && d <= Duration::from_millis(5000));
        }
    }
}

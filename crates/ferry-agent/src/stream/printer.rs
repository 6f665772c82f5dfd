use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use ferry_core::output::OutputSink;
use ferry_core::traits::StreamObserver;
use ferry_core::types::StreamDelta;

use super::extractor::ArgumentExtractor;

/// Observes a model stream and forwards the configured argument of each
/// matching tool call to the sink as a start/chunk/end block.
pub struct StreamPrinter {
    sink: Arc<dyn OutputSink>,
    /// Tool name -> argument to stream.
    fields: HashMap<String, String>,
    extractors: HashMap<usize, ArgumentExtractor>,
    /// Tool-call index whose block is open.
    open: Option<usize>,
}

impl StreamPrinter {
    pub fn new(sink: Arc<dyn OutputSink>, fields: HashMap<String, String>) -> Self {
        Self {
            sink,
            fields,
            extractors: HashMap::new(),
            open: None,
        }
    }

    async fn close_block(&mut self) {
        if self.open.take().is_some() {
            self.sink.end().await;
        }
    }
}

impl StreamObserver for StreamPrinter {
    fn on_delta<'a>(&'a mut self, delta: &'a StreamDelta) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match delta {
                StreamDelta::ToolUseStart { index, name, .. } => {
                    // Providers may repeat the start for every fragment of a call
                    if self.extractors.contains_key(index) {
                        return;
                    }
                    if let Some(field) = self.fields.get(name) {
                        debug!(tool = %name, field = %field, "Streaming tool argument");
                        self.extractors.insert(*index, ArgumentExtractor::new(field.clone()));
                    }
                }
                StreamDelta::ToolInputDelta { index, delta } => {
                    let Some(extractor) = self.extractors.get_mut(index) else {
                        return;
                    };
                    let Some(suffix) = extractor.push(delta) else {
                        return;
                    };
                    if self.open != Some(*index) {
                        self.close_block().await;
                        self.sink.start().await;
                        self.open = Some(*index);
                    }
                    self.sink.chunk(&suffix).await;
                }
                _ => {}
            }
        })
    }

    fn finish(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.close_block().await;
            self.extractors.clear();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::output::OutputEvent;
    use ferry_test_utils::RecordingSink;

    fn printer(sink: Arc<RecordingSink>) -> StreamPrinter {
        let fields = HashMap::from([("sequentialthinking".to_string(), "thought".to_string())]);
        StreamPrinter::new(sink, fields)
    }

    fn start(index: usize, name: &str) -> StreamDelta {
        StreamDelta::ToolUseStart { index, id: format!("call_{}", index), name: name.into() }
    }

    fn input(index: usize, delta: &str) -> StreamDelta {
        StreamDelta::ToolInputDelta { index, delta: delta.into() }
    }

    #[tokio::test]
    async fn test_streams_thought_as_one_block() {
        let sink = Arc::new(RecordingSink::new());
        let mut p = printer(sink.clone());
        for d in [
            start(0, "sequentialthinking"),
            input(0, r#"{"thought": "The sch"#),
            input(0, r#"ema has 3"#),
            input(0, r#" tables", "thought_number": 1}"#),
        ] {
            p.on_delta(&d).await;
        }
        p.finish().await;

        assert_eq!(
            sink.events(),
            vec![
                OutputEvent::Start,
                OutputEvent::Chunk("The sch".into()),
                OutputEvent::Chunk("ema has 3".into()),
                OutputEvent::Chunk(" tables".into()),
                OutputEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_start_keeps_buffered_arguments() {
        let sink = Arc::new(RecordingSink::new());
        let mut p = printer(sink.clone());
        for fragment in [r#"{"thought": "The sch"#, "ema has 3", r#" tables"}"#] {
            p.on_delta(&start(0, "sequentialthinking")).await;
            p.on_delta(&input(0, fragment)).await;
        }
        p.finish().await;

        let streamed: String = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Chunk(text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "The schema has 3 tables");
        assert_eq!(sink.events().first(), Some(&OutputEvent::Start));
        assert_eq!(sink.events().last(), Some(&OutputEvent::End));
    }

    #[tokio::test]
    async fn test_other_tools_stay_silent() {
        let sink = Arc::new(RecordingSink::new());
        let mut p = printer(sink.clone());
        p.on_delta(&start(0, "list_tables")).await;
        p.on_delta(&input(0, r#"{"thought": "hidden"}"#)).await;
        p.on_delta(&StreamDelta::TextDelta("plain".into())).await;
        p.finish().await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_one_block_per_call_and_reset_on_finish() {
        let sink = Arc::new(RecordingSink::new());
        let mut p = printer(sink.clone());
        p.on_delta(&start(0, "sequentialthinking")).await;
        p.on_delta(&input(0, r#"{"thought": "a"}"#)).await;
        p.on_delta(&start(1, "sequentialthinking")).await;
        p.on_delta(&input(1, r#"{"thought": "b"}"#)).await;
        p.finish().await;

        // A retried attempt streams again from scratch.
        p.on_delta(&start(0, "sequentialthinking")).await;
        p.on_delta(&input(0, r#"{"thought": "a"}"#)).await;
        p.finish().await;

        assert_eq!(
            sink.events(),
            vec![
                OutputEvent::Start,
                OutputEvent::Chunk("a".into()),
                OutputEvent::End,
                OutputEvent::Start,
                OutputEvent::Chunk("b".into()),
                OutputEvent::End,
                OutputEvent::Start,
                OutputEvent::Chunk("a".into()),
                OutputEvent::End,
            ]
        );
    }
}

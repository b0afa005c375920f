//! Generation coordinator
//!
//! Streams a completion from the ready engine and republishes it as a growing
//! text buffer: every callback receives the full text generated so far, not
//! the raw delta.

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::inference::capability::{CompletionRequest, EngineError};
use crate::inference::lifecycle::EngineLifecycle;
use crate::truncate_str;
use crate::types::Message;

/// Sampling temperature for chat completions
pub const TEMPERATURE: f32 = 0.7;
/// Upper bound on generated tokens per reply
pub const MAX_TOKENS: u32 = 1024;

/// Errors returned by [`GenerationCoordinator::generate`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("No model is ready")]
    EngineNotReady,

    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] EngineError),

    #[error("Model was switched during generation")]
    EngineSwapped,
}

/// Generation parameters sent with every completion request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

/// Events emitted by [`GenerationCoordinator::spawn_generation`]
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Full accumulated text so far
    Delta(String),
    Finished(String),
    Failed(GenerationError),
}

#[derive(Clone)]
pub struct GenerationCoordinator {
    lifecycle: EngineLifecycle,
    params: GenerationParams,
}

impl GenerationCoordinator {
    pub fn new(lifecycle: EngineLifecycle) -> Self {
        Self {
            lifecycle,
            params: GenerationParams::default(),
        }
    }

    /// Generates a reply to `history`.
    ///
    /// Fails with [`GenerationError::EngineNotReady`] before doing any work
    /// unless an engine is ready. `on_delta` is called once per chunk with
    /// the accumulated text. Text already delivered is not retracted when the
    /// stream later fails. If the engine is replaced mid-stream the call fails
    /// with [`GenerationError::EngineSwapped`] at the next chunk.
    pub async fn generate<F>(
        &self,
        history: &[Message],
        mut on_delta: F,
    ) -> Result<String, GenerationError>
    where
        F: FnMut(&str),
    {
        let engine = self
            .lifecycle
            .ready_engine()
            .ok_or(GenerationError::EngineNotReady)?;

        if let Some(last) = history.last() {
            tracing::debug!(
                "Generating reply to {} message(s), last: {:?}",
                history.len(),
                truncate_str(&last.content, 80)
            );
        }

        let request = CompletionRequest {
            history: history.to_vec(),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };

        let mut stream = match engine.handle().stream_completion(request).await {
            Ok(stream) => stream,
            // Retired between lookup and open: same outcome as a swap mid-stream
            Err(_) if engine.is_retired() => return Err(GenerationError::EngineSwapped),
            Err(e) => return Err(e.into()),
        };
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            if engine.is_retired() {
                tracing::warn!("Engine replaced during generation, aborting");
                return Err(GenerationError::EngineSwapped);
            }

            let chunk = chunk.map_err(|e| {
                tracing::warn!("Generation error: {e}");
                GenerationError::GenerationFailed(e)
            })?;

            accumulated.push_str(chunk.delta_text());
            on_delta(&accumulated);
        }

        tracing::debug!("Generation finished ({} bytes)", accumulated.len());
        Ok(accumulated)
    }

    /// Runs [`GenerationCoordinator::generate`] on a tokio task and reports
    /// its increments over a channel, ending with `Finished` or `Failed`.
    pub fn spawn_generation(&self, history: Vec<Message>) -> mpsc::UnboundedReceiver<GenerationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = self.clone();

        tokio::spawn(async move {
            let delta_tx = tx.clone();
            let result = coordinator
                .generate(&history, |text| {
                    let _ = delta_tx.send(GenerationEvent::Delta(text.to_string()));
                })
                .await;

            let last = match result {
                Ok(text) => GenerationEvent::Finished(text),
                Err(e) => GenerationEvent::Failed(e),
            };
            let _ = tx.send(last);
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::inference::fake::{FakeCapability, Step};
    use crate::inference::lifecycle::EngineState;

    const LLAMA_1B: &str = "Llama-3.2-1B-Instruct-q4f16_1-MLC";
    const QWEN: &str = "Qwen2-1.5B-Instruct-q4f16_1-MLC";

    async fn ready(fake: &FakeCapability) -> GenerationCoordinator {
        let lifecycle = EngineLifecycle::new(Arc::new(fake.clone()));
        lifecycle.select_model(LLAMA_1B).unwrap().await.unwrap();
        assert!(lifecycle.current_state().is_ready());
        GenerationCoordinator::new(lifecycle)
    }

    #[tokio::test]
    async fn test_deltas_are_prefix_sums() {
        let fake = FakeCapability::instant();
        fake.script(vec![Step::text("He"), Step::text("llo")]);
        let coordinator = ready(&fake).await;

        let mut seen = Vec::new();
        let text = coordinator
            .generate(&[Message::user("hi")], |t| seen.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["He", "Hello"]);
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_request_carries_history_and_fixed_params() {
        let fake = FakeCapability::instant();
        fake.script(vec![Step::text("ok")]);
        let coordinator = ready(&fake).await;

        let history = vec![Message::system("be brief"), Message::user("hi")];
        coordinator.generate(&history, |_| {}).await.unwrap();

        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].history, history);
        assert_eq!(requests[0].temperature, 0.7);
        assert_eq!(requests[0].max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_missing_delta_counts_as_empty() {
        let fake = FakeCapability::instant();
        fake.script(vec![Step::text("a"), Step::missing(), Step::text("b")]);
        let coordinator = ready(&fake).await;

        let mut seen = Vec::new();
        let text = coordinator
            .generate(&[Message::user("hi")], |t| seen.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["a", "a", "ab"]);
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_empty_stream_returns_empty_text() {
        let fake = FakeCapability::instant();
        let coordinator = ready(&fake).await;

        let mut calls = 0;
        let text = coordinator
            .generate(&[Message::user("hi")], |_| calls += 1)
            .await
            .unwrap();
        assert_eq!(text, "");
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_not_ready_fails_without_deltas() {
        let fake = FakeCapability::manual();
        let lifecycle = EngineLifecycle::new(Arc::new(fake.clone()));
        let coordinator = GenerationCoordinator::new(lifecycle.clone());

        let mut calls = 0;
        let err = coordinator
            .generate(&[Message::user("hi")], |_| calls += 1)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::EngineNotReady);

        // Still not ready while loading
        let _load = lifecycle.select_model(LLAMA_1B).unwrap();
        assert!(lifecycle.current_state().is_loading());
        let err = coordinator
            .generate(&[Message::user("hi")], |_| calls += 1)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::EngineNotReady);

        assert_eq!(calls, 0);
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_after_failed_load() {
        let fake = FakeCapability::manual();
        let lifecycle = EngineLifecycle::new(Arc::new(fake.clone()));
        let coordinator = GenerationCoordinator::new(lifecycle.clone());

        let load = lifecycle.select_model(QWEN).unwrap();
        fake.wait_for_pending(1).await;
        fake.resolve(QWEN, Err(EngineError::BackendInit("no GPU".into())));
        load.await.unwrap();
        assert!(matches!(lifecycle.current_state(), EngineState::Failed { .. }));

        let err = coordinator.generate(&[Message::user("hi")], |_| {}).await;
        assert_eq!(err, Err(GenerationError::EngineNotReady));
    }

    #[tokio::test]
    async fn test_stream_error_keeps_delivered_text() {
        let fake = FakeCapability::instant();
        fake.script(vec![Step::text("Par"), Step::fail("device lost")]);
        let coordinator = ready(&fake).await;

        let mut seen = Vec::new();
        let err = coordinator
            .generate(&[Message::user("hi")], |t| seen.push(t.to_string()))
            .await
            .unwrap_err();

        assert_eq!(seen, vec!["Par"]);
        assert_eq!(
            err,
            GenerationError::GenerationFailed(EngineError::Inference("device lost".into()))
        );
        // The engine itself stays usable.
        assert!(coordinator.lifecycle.current_state().is_ready());
    }

    #[tokio::test]
    async fn test_swap_mid_stream_fails_generation() {
        let fake = FakeCapability::instant();
        let gate = Arc::new(tokio::sync::Notify::new());
        fake.script(vec![
            Step::text("Once"),
            Step::Wait(gate.clone()),
            Step::text(" upon"),
        ]);
        let coordinator = ready(&fake).await;
        let mut events = coordinator.spawn_generation(vec![Message::user("story")]);

        assert_eq!(
            events.recv().await,
            Some(GenerationEvent::Delta("Once".to_string()))
        );

        let load = coordinator.lifecycle.select_model(QWEN).unwrap();
        gate.notify_one();

        assert_eq!(
            events.recv().await,
            Some(GenerationEvent::Failed(GenerationError::EngineSwapped))
        );
        assert_eq!(events.recv().await, None);

        load.await.unwrap();
        assert_eq!(coordinator.lifecycle.current_state().model_id(), Some(QWEN));
    }

    #[tokio::test]
    async fn test_swap_while_opening_stream_is_reported_as_swap() {
        let fake = FakeCapability::instant();
        let gate = Arc::new(tokio::sync::Notify::new());
        fake.hold_open(gate.clone());
        let coordinator = ready(&fake).await;

        let mut events = coordinator.spawn_generation(vec![Message::user("hi")]);
        while fake.requests().is_empty() {
            tokio::task::yield_now().await;
        }

        // The engine is retired after lookup but before the stream opens.
        let load = coordinator.lifecycle.select_model(QWEN).unwrap();
        gate.notify_one();

        assert_eq!(
            events.recv().await,
            Some(GenerationEvent::Failed(GenerationError::EngineSwapped))
        );
        load.await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_generation_reports_deltas_then_finished() {
        let fake = FakeCapability::instant();
        fake.script(vec![Step::text("He"), Step::text("llo")]);
        let coordinator = ready(&fake).await;

        let mut events = coordinator.spawn_generation(vec![Message::user("hi")]);
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }

        assert_eq!(
            collected,
            vec![
                GenerationEvent::Delta("He".to_string()),
                GenerationEvent::Delta("Hello".to_string()),
                GenerationEvent::Finished("Hello".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_spawn_generation_when_not_ready() {
        let lifecycle = EngineLifecycle::new(Arc::new(FakeCapability::instant()));
        let coordinator = GenerationCoordinator::new(lifecycle);

        let mut events = coordinator.spawn_generation(vec![Message::user("hi")]);
        assert_eq!(
            events.recv().await,
            Some(GenerationEvent::Failed(GenerationError::EngineNotReady))
        );
        assert_eq!(events.recv().await, None);
    }
}

//! Inference capability contract
//!
//! The narrow interface the lifecycle manager and the generation coordinator
//! depend on. A capability creates engines for model ids; an engine handle
//! opens streaming completions. Tokenization, weights and tensor execution
//! all live behind these two traits.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::inference::model::ModelError;
use crate::inference::streaming::CompletionStream;
use crate::types::Message;

/// Errors raised by an inference capability while creating an engine or
/// streaming a completion
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Model validation failed: {0}")]
    ModelValidation(String),

    #[error("Failed to initialize backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to create context: {0}")]
    ContextCreate(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Worker thread error: {0}")]
    WorkerError(String),

    #[error("Engine has been unloaded")]
    Unloaded,
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::ModelValidation(e.to_string())
    }
}

/// Load progress reported by a capability while an engine is being created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadingProgress {
    /// Completed fraction in `[0, 1]`
    pub fraction: f32,
    /// Human-readable status line
    pub text: String,
}

impl LoadingProgress {
    pub fn new(fraction: f32, text: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            text: text.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.fraction >= 1.0
    }

    /// Fraction as a whole percentage, for progress bars
    pub fn percent(&self) -> u32 {
        (self.fraction * 100.0).round() as u32
    }
}

/// Callback a capability invokes for every progress notification
pub type ProgressCallback = Arc<dyn Fn(LoadingProgress) + Send + Sync>;

/// A chat completion request against a loaded engine
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub history: Vec<Message>,
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// A loaded, ready-to-run engine bound to one model.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Opens a streaming completion over `request.history`.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, EngineError>;

    /// Releases the engine's resources. Called once when the engine is
    /// replaced; engines without an explicit release keep the default.
    fn unload(&self) {}
}

/// Factory for engines
#[async_trait]
pub trait InferenceCapability: Send + Sync {
    /// Creates an engine for `model_id`, reporting progress through
    /// `on_progress` until it resolves.
    async fn create_engine(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn EngineHandle>, EngineError>;
}

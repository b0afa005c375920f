//! Model lifecycle and streaming generation
//!
//! The lifecycle manager owns the single active engine; the generation
//! coordinator streams replies from it. Both talk to the inference backend
//! only through the traits in [`capability`].

pub mod capability;
pub mod generation;
pub mod lifecycle;
#[cfg(feature = "llama")]
pub mod llama;
pub mod model;
pub mod registry;
pub mod streaming;

#[cfg(test)]
pub(crate) mod fake;

// Re-export main types for convenience
pub use capability::{
    CompletionRequest, EngineError, EngineHandle, InferenceCapability, LoadingProgress,
    ProgressCallback,
};
pub use generation::{GenerationCoordinator, GenerationError, GenerationEvent, GenerationParams};
pub use lifecycle::{EngineLifecycle, EngineState, LifecycleError};
#[cfg(feature = "llama")]
pub use llama::{EngineConfig, LlamaCapability};
pub use model::{validate_gguf, GgufMetadata, ModelError, GGUF_MAGIC};
pub use registry::{default_model, find_model, list_models, ModelDescriptor};
pub use streaming::{CompletionChunk, CompletionStream};

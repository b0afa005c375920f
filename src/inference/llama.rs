//! llama.cpp inference capability
//!
//! Resolves registry ids to GGUF files under the configured models directory
//! and runs them with llama-cpp-2.
//!
//! # Architecture
//!
//! Since llama-cpp-2 types (`LlamaBackend`, `LlamaModel`, `LlamaContext`) contain
//! raw pointers that are not `Send`, the backend and the one loaded model live on
//! a dedicated worker thread. Engine handles talk to it over channels. Loading a
//! model drops the previous one first, so only one model holds GPU memory at a
//! time. Each load gets a slot number; commands for a slot that is no longer
//! loaded fail with [`EngineError::Unloaded`].

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use tokio::sync::{mpsc as async_mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::inference::capability::{
    CompletionRequest, EngineError, EngineHandle, InferenceCapability, LoadingProgress,
    ProgressCallback,
};
use crate::inference::model::{model_path, validate_gguf};
use crate::inference::streaming::{drain_utf8, CompletionChunk, CompletionStream};
use crate::storage::settings::AppSettings;
use crate::types::Message;

/// Minimum context window, whatever the settings say
const MIN_CONTEXT: u32 = 2048;
const BATCH_SIZE: usize = 512;

/// Engine configuration, derived from [`AppSettings`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `<model id>.gguf` files
    pub models_directory: PathBuf,
    /// Layers to offload to GPU (0 = CPU only)
    pub gpu_layers: u32,
    pub context_size: u32,
    pub top_k: u32,
    pub top_p: f32,
    /// Sampling seed (0 = random)
    pub seed: u32,
}

impl EngineConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            models_directory: settings.models_directory.clone(),
            gpu_layers: settings.gpu_layers,
            context_size: settings.context_size,
            top_k: settings.top_k,
            top_p: settings.top_p,
            seed: 0,
        }
    }
}

/// Model information after loading
#[derive(Debug, Clone)]
pub struct LoadedModelInfo {
    pub path: String,
    pub vocab_size: i32,
    pub embedding_dim: i32,
    /// Training context length
    pub context_length: u32,
    pub param_count: u64,
    pub size_bytes: u64,
}

impl LoadedModelInfo {
    /// One-line summary for the load log
    fn summary(&self) -> String {
        format!(
            "{} ({} params, {} vocab, {} embd, {} ctx, {:.1} MiB)",
            self.path,
            self.param_count,
            self.vocab_size,
            self.embedding_dim,
            self.context_length,
            self.size_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

/// Per-request sampling settings passed to the worker
#[derive(Debug, Clone)]
struct SamplingParams {
    temperature: f32,
    max_tokens: u32,
    top_k: u32,
    top_p: f32,
    seed: u32,
    context_size: u32,
}

type ChunkSender = async_mpsc::Sender<Result<CompletionChunk, EngineError>>;

/// Commands sent to the worker thread
enum WorkerCommand {
    Load {
        slot: u64,
        path: PathBuf,
        gpu_layers: u32,
        on_progress: ProgressCallback,
        response_tx: oneshot::Sender<Result<LoadedModelInfo, EngineError>>,
    },
    Unload {
        slot: u64,
    },
    Generate {
        slot: u64,
        history: Vec<Message>,
        params: SamplingParams,
        retired: Arc<AtomicBool>,
        chunk_tx: ChunkSender,
    },
    Shutdown,
}

struct Worker {
    command_tx: Sender<WorkerCommand>,
    handle: JoinHandle<()>,
}

/// Local inference capability backed by llama.cpp
pub struct LlamaCapability {
    config: EngineConfig,
    worker: Mutex<Option<Worker>>,
    next_slot: AtomicU64,
}

impl LlamaCapability {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            worker: Mutex::new(None),
            next_slot: AtomicU64::new(0),
        }
    }

    /// Returns the worker's command channel, starting the worker on first use
    fn command_tx(&self) -> Result<Sender<WorkerCommand>, EngineError> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        if let Some(worker) = worker.as_ref() {
            return Ok(worker.command_tx.clone());
        }

        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let handle = thread::Builder::new()
            .name("llama-worker".to_string())
            .spawn(move || worker_thread_main(command_rx))
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        tracing::info!("llama.cpp worker thread started");
        *worker = Some(Worker {
            command_tx: command_tx.clone(),
            handle,
        });
        Ok(command_tx)
    }
}

#[async_trait]
impl InferenceCapability for LlamaCapability {
    async fn create_engine(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let path = model_path(&self.config.models_directory, model_id);
        on_progress(LoadingProgress::new(
            0.0,
            format!("Checking {}", path.display()),
        ));

        if !path.is_file() {
            return Err(EngineError::ModelNotFound(path.display().to_string()));
        }
        let metadata = validate_gguf(&path)?;
        tracing::debug!(
            "GGUF v{} with {} tensors at {:?}",
            metadata.version,
            metadata.tensor_count,
            path
        );

        let command_tx = self.command_tx()?;
        let slot = self.next_slot.fetch_add(1, Ordering::SeqCst) + 1;
        let (response_tx, response_rx) = oneshot::channel();

        command_tx
            .send(WorkerCommand::Load {
                slot,
                path,
                gpu_layers: self.config.gpu_layers,
                on_progress: on_progress.clone(),
                response_tx,
            })
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        let info = response_rx
            .await
            .map_err(|e| EngineError::WorkerError(e.to_string()))??;

        on_progress(LoadingProgress::new(
            1.0,
            format!("Finish loading {model_id}"),
        ));

        Ok(Arc::new(LlamaEngineHandle {
            slot,
            info,
            config: self.config.clone(),
            command_tx,
            retired: Arc::new(AtomicBool::new(false)),
        }))
    }
}

impl Drop for LlamaCapability {
    fn drop(&mut self) {
        let worker = match self.worker.get_mut() {
            Ok(worker) => worker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            let _ = worker.command_tx.send(WorkerCommand::Shutdown);
            let _ = worker.handle.join();
        }
    }
}

/// Handle to the model occupying one worker slot
struct LlamaEngineHandle {
    slot: u64,
    info: LoadedModelInfo,
    config: EngineConfig,
    command_tx: Sender<WorkerCommand>,
    retired: Arc<AtomicBool>,
}

#[async_trait]
impl EngineHandle for LlamaEngineHandle {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, EngineError> {
        if self.retired.load(Ordering::Acquire) {
            return Err(EngineError::Unloaded);
        }

        let params = SamplingParams {
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_k: self.config.top_k,
            top_p: self.config.top_p,
            seed: self.config.seed,
            context_size: self.config.context_size,
        };

        let (chunk_tx, chunk_rx) = async_mpsc::channel(32);
        self.command_tx
            .send(WorkerCommand::Generate {
                slot: self.slot,
                history: request.history,
                params,
                retired: self.retired.clone(),
                chunk_tx,
            })
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        Ok(Box::pin(ReceiverStream::new(chunk_rx)))
    }

    fn unload(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            let _ = self.command_tx.send(WorkerCommand::Unload { slot: self.slot });
            tracing::info!("Model unload requested: {}", self.info.path);
        }
    }
}

/// Worker thread main loop
///
/// Owns the LlamaBackend and the loaded model, processes commands in order.
fn worker_thread_main(command_rx: Receiver<WorkerCommand>) {
    let backend = LlamaBackend::init().map_err(|e| e.to_string());
    match &backend {
        Ok(_) => tracing::info!("LlamaBackend initialized in worker thread"),
        Err(e) => tracing::error!("Failed to init backend: {}", e),
    }
    let mut loaded: Option<(u64, LlamaModel)> = None;

    loop {
        match command_rx.recv() {
            Ok(WorkerCommand::Load {
                slot,
                path,
                gpu_layers,
                on_progress,
                response_tx,
            }) => {
                if loaded.take().is_some() {
                    on_progress(LoadingProgress::new(0.05, "Releasing previous model"));
                    tracing::info!("Previous model dropped before load");
                }

                let result = match &backend {
                    Ok(b) => load_model(b, &path, gpu_layers, &on_progress),
                    Err(e) => Err(EngineError::BackendInit(e.clone())),
                };
                let result = result.map(|(model, info)| {
                    loaded = Some((slot, model));
                    info
                });
                let _ = response_tx.send(result);
            }
            Ok(WorkerCommand::Unload { slot }) => {
                if matches!(&loaded, Some((current, _)) if *current == slot) {
                    loaded = None;
                    tracing::info!("Model unloaded in worker thread");
                }
            }
            Ok(WorkerCommand::Generate {
                slot,
                history,
                params,
                retired,
                chunk_tx,
            }) => match (&backend, &loaded) {
                (Ok(b), Some((current, m))) if *current == slot => {
                    if let Err(e) = run_generation(b, m, &history, params, &chunk_tx, &retired) {
                        let _ = chunk_tx.blocking_send(Err(e));
                    }
                }
                _ => {
                    let _ = chunk_tx.blocking_send(Err(EngineError::Unloaded));
                }
            },
            Ok(WorkerCommand::Shutdown) => {
                tracing::info!("Worker thread shutting down");
                break;
            }
            Err(_) => {
                tracing::debug!("Command channel closed, worker exiting");
                break;
            }
        }
    }
}

fn load_model(
    backend: &LlamaBackend,
    path: &Path,
    gpu_layers: u32,
    on_progress: &ProgressCallback,
) -> Result<(LlamaModel, LoadedModelInfo), EngineError> {
    on_progress(LoadingProgress::new(0.1, "Loading model weights"));

    let model_params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
    let model = LlamaModel::load_from_file(backend, path, &model_params)
        .map_err(|e| EngineError::ModelLoad(e.to_string()))?;

    let info = LoadedModelInfo {
        path: path.to_string_lossy().to_string(),
        vocab_size: model.n_vocab(),
        embedding_dim: model.n_embd(),
        context_length: model.n_ctx_train(),
        param_count: model.n_params() as u64,
        size_bytes: model.size() as u64,
    };

    tracing::info!("Model loaded: {}", info.summary());
    on_progress(LoadingProgress::new(0.9, "Model weights loaded"));

    Ok((model, info))
}

/// Run text generation (called from worker thread)
fn run_generation(
    backend: &LlamaBackend,
    model: &LlamaModel,
    history: &[Message],
    params: SamplingParams,
    tx: &ChunkSender,
    retired: &AtomicBool,
) -> Result<(), EngineError> {
    let prompt = match build_chat_prompt(model, history) {
        Ok(chat_prompt) => chat_prompt,
        Err(error) => {
            tracing::warn!("Chat template not applied: {error}");
            plain_transcript(history)
        }
    };

    let n_ctx = params.context_size.min(model.n_ctx_train()).max(MIN_CONTEXT);

    let tokens = model
        .str_to_token(&prompt, AddBos::Always)
        .map_err(|e| EngineError::Tokenization(e.to_string()))?;
    tracing::debug!("Tokenized prompt into {} tokens", tokens.len());

    if tokens.len() >= n_ctx as usize {
        return Err(EngineError::Tokenization(format!(
            "prompt of {} tokens does not fit a {} token context",
            tokens.len(),
            n_ctx
        )));
    }

    let n_batch = tokens.len().max(BATCH_SIZE);
    let ctx_params = LlamaContextParams::default()
        .with_n_ctx(NonZeroU32::new(n_ctx))
        .with_n_batch(n_batch as u32);

    let mut ctx = model
        .new_context(backend, ctx_params)
        .map_err(|e| EngineError::ContextCreate(e.to_string()))?;

    run_inference(&mut ctx, model, tokens, n_batch, params, tx, retired)
}

fn build_chat_prompt(model: &LlamaModel, history: &[Message]) -> Result<String, String> {
    let template = model
        .chat_template(None)
        .map_err(|e| format!("Failed to load chat template: {e}"))?;
    let messages = history
        .iter()
        .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to build chat message: {e}"))?;
    model
        .apply_chat_template(&template, &messages, true)
        .map_err(|e| format!("Failed to apply chat template: {e}"))
}

/// Fallback prompt for models without a chat template
fn plain_transcript(history: &[Message]) -> String {
    let mut prompt = String::new();
    for message in history {
        prompt.push_str(message.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("assistant: ");
    prompt
}

/// Sends a delta; false once the consumer has gone away
fn send_delta(tx: &ChunkSender, text: String) -> bool {
    if text.is_empty() {
        return true;
    }
    tx.blocking_send(Ok(CompletionChunk::text(text))).is_ok()
}

/// Runs the decode loop, streaming text pieces until end of generation,
/// `max_tokens`, retirement of the engine, or the receiver being dropped.
fn run_inference(
    ctx: &mut LlamaContext,
    model: &LlamaModel,
    prompt_tokens: Vec<LlamaToken>,
    n_batch: usize,
    params: SamplingParams,
    tx: &ChunkSender,
    retired: &AtomicBool,
) -> Result<(), EngineError> {
    let mut batch = LlamaBatch::new(n_batch, 1);

    let last_index = prompt_tokens.len().saturating_sub(1);
    for (i, token) in prompt_tokens.iter().enumerate() {
        batch
            .add(*token, i as i32, &[0], i == last_index)
            .map_err(|e| EngineError::Inference(format!("Failed to add token to batch: {e}")))?;
    }

    ctx.decode(&mut batch)
        .map_err(|e| EngineError::Inference(format!("Failed to decode prompt: {e}")))?;

    let seed = if params.seed == 0 {
        rand_seed()
    } else {
        params.seed
    };

    let mut sampler = if params.temperature < 0.01 {
        LlamaSampler::greedy()
    } else {
        LlamaSampler::chain_simple([
            LlamaSampler::top_k(params.top_k as i32),
            LlamaSampler::top_p(params.top_p, 1),
            LlamaSampler::temp(params.temperature),
            LlamaSampler::dist(seed),
        ])
    };

    let mut n_decoded = prompt_tokens.len() as i32;
    let mut utf8_buffer: Vec<u8> = Vec::new();

    for _ in 0..params.max_tokens {
        if retired.load(Ordering::Acquire) {
            tracing::debug!("Engine retired, stopping generation");
            let _ = tx.blocking_send(Err(EngineError::Unloaded));
            return Ok(());
        }

        let new_token = sampler.sample(ctx, batch.n_tokens() - 1);
        sampler.accept(new_token);

        if model.is_eog_token(new_token) {
            tracing::debug!("End of generation token encountered");
            break;
        }

        let token_bytes = model
            .token_to_bytes(new_token, Special::Tokenize)
            .map_err(|e| EngineError::Inference(format!("Failed to convert token: {e}")))?;
        utf8_buffer.extend_from_slice(&token_bytes);

        if let Some(text) = drain_utf8(&mut utf8_buffer) {
            if !send_delta(tx, text) {
                tracing::debug!("Receiver dropped, stopping generation");
                return Ok(());
            }
        }

        batch.clear();
        batch
            .add(new_token, n_decoded, &[0], true)
            .map_err(|e| EngineError::Inference(format!("Failed to add token to batch: {e}")))?;
        ctx.decode(&mut batch)
            .map_err(|e| EngineError::Inference(format!("Failed to decode: {e}")))?;

        n_decoded += 1;
    }

    // An incomplete sequence left at the end will never complete
    if !utf8_buffer.is_empty() {
        send_delta(tx, String::from_utf8_lossy(&utf8_buffer).into_owned());
    }

    Ok(())
}

/// Generates a random seed using system entropy
fn rand_seed() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}

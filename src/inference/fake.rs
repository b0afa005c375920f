//! Scriptable inference capability used by the unit tests.
//!
//! Loads either resolve immediately or wait until the test resolves them by
//! model id, in any order. Streams replay the current script.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

use crate::inference::capability::{
    CompletionRequest, EngineError, EngineHandle, InferenceCapability, LoadingProgress,
    ProgressCallback,
};
use crate::inference::streaming::{CompletionChunk, CompletionStream};

/// One step of a scripted completion stream
#[derive(Clone)]
pub(crate) enum Step {
    Chunk(Option<String>),
    Fail(String),
    /// Pause the stream until the notify is signalled
    Wait(Arc<Notify>),
}

impl Step {
    pub fn text(delta: &str) -> Self {
        Step::Chunk(Some(delta.to_string()))
    }

    pub fn missing() -> Self {
        Step::Chunk(None)
    }

    pub fn fail(message: &str) -> Self {
        Step::Fail(message.to_string())
    }
}

struct PendingLoad {
    model_id: String,
    resolve: oneshot::Sender<Result<(), EngineError>>,
}

#[derive(Default)]
struct Shared {
    steps: Mutex<Vec<Step>>,
    requests: Mutex<Vec<CompletionRequest>>,
    pending: Mutex<Vec<PendingLoad>>,
    loads: Mutex<Vec<String>>,
    /// When set, opening a stream waits on it after recording the request
    open_gate: Mutex<Option<Arc<Notify>>>,
    progress_reports: AtomicUsize,
    unloads: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct FakeCapability {
    shared: Arc<Shared>,
    manual: bool,
}

impl FakeCapability {
    /// Loads succeed as soon as they start
    pub fn instant() -> Self {
        Self {
            shared: Arc::default(),
            manual: false,
        }
    }

    /// Loads wait for [`FakeCapability::resolve`]
    pub fn manual() -> Self {
        Self {
            shared: Arc::default(),
            manual: true,
        }
    }

    pub fn script(&self, steps: Vec<Step>) {
        *self.shared.steps.lock().unwrap() = steps;
    }

    /// Holds every `stream_completion` call until `gate` is notified
    pub fn hold_open(&self, gate: Arc<Notify>) {
        *self.shared.open_gate.lock().unwrap() = Some(gate);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// Model ids passed to `create_engine`, in call order
    pub fn loads(&self) -> Vec<String> {
        self.shared.loads.lock().unwrap().clone()
    }

    pub fn progress_reports(&self) -> usize {
        self.shared.progress_reports.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.shared.unloads.load(Ordering::SeqCst)
    }

    /// Yields until `count` loads are waiting to be resolved
    pub async fn wait_for_pending(&self, count: usize) {
        while self.shared.pending.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn resolve(&self, model_id: &str, result: Result<(), EngineError>) {
        let load = {
            let mut pending = self.shared.pending.lock().unwrap();
            let index = pending
                .iter()
                .position(|p| p.model_id == model_id)
                .expect("no pending load for model");
            pending.remove(index)
        };
        let _ = load.resolve.send(result);
    }

    fn report(&self, on_progress: &ProgressCallback, fraction: f32, text: &str) {
        self.shared.progress_reports.fetch_add(1, Ordering::SeqCst);
        on_progress(LoadingProgress::new(fraction, text));
    }
}

#[async_trait]
impl InferenceCapability for FakeCapability {
    async fn create_engine(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        self.shared.loads.lock().unwrap().push(model_id.to_string());
        self.report(&on_progress, 0.0, "Fetching params");

        if self.manual {
            let (resolve, rx) = oneshot::channel();
            self.shared.pending.lock().unwrap().push(PendingLoad {
                model_id: model_id.to_string(),
                resolve,
            });
            rx.await
                .map_err(|_| EngineError::WorkerError("load abandoned".to_string()))??;
        } else {
            self.report(&on_progress, 0.5, "Loading weights");
        }

        self.report(&on_progress, 1.0, "Finish loading");
        Ok(Arc::new(FakeEngine {
            shared: self.shared.clone(),
            unloaded: AtomicBool::new(false),
        }))
    }
}

struct FakeEngine {
    shared: Arc<Shared>,
    unloaded: AtomicBool,
}

#[async_trait]
impl EngineHandle for FakeEngine {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, EngineError> {
        self.shared.requests.lock().unwrap().push(request);
        let gate = self.shared.open_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.unloaded.load(Ordering::SeqCst) {
            return Err(EngineError::Unloaded);
        }
        let steps: VecDeque<Step> = self.shared.steps.lock().unwrap().clone().into();

        let stream = futures::stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    Step::Chunk(delta) => return Some((Ok(CompletionChunk { delta }), steps)),
                    Step::Fail(message) => {
                        return Some((Err(EngineError::Inference(message)), steps))
                    }
                    Step::Wait(notify) => notify.notified().await,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    fn unload(&self) {
        self.unloaded.store(true, Ordering::SeqCst);
        self.shared.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

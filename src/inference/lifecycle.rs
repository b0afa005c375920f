//! Engine lifecycle
//!
//! Owns the single active engine. Selecting a model retires whatever engine
//! is loaded, moves to `Loading`, and creates the new engine on a tokio task.
//!
//! Every selection bumps an epoch. A load only publishes progress or its
//! final state while its epoch is still the latest one, so a slow load that
//! has been superseded can never overwrite a newer selection. The epoch is
//! read and written only while holding the state channel's write lock, which
//! makes the check and the transition a single step.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::inference::capability::{
    EngineHandle, InferenceCapability, LoadingProgress, ProgressCallback,
};
use crate::inference::registry::{self, ModelDescriptor};

/// Errors returned by [`EngineLifecycle::select_model`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

/// An engine owned by the lifecycle manager.
///
/// The handle itself is crate-private; UI code can observe that an engine is
/// ready but cannot keep the handle alive across a model switch.
#[derive(Clone)]
pub struct LoadedEngine {
    handle: Arc<dyn EngineHandle>,
    retired: Arc<AtomicBool>,
}

impl LoadedEngine {
    fn new(handle: Arc<dyn EngineHandle>) -> Self {
        Self {
            handle,
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn handle(&self) -> &Arc<dyn EngineHandle> {
        &self.handle
    }

    /// True once a newer selection has replaced this engine
    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            self.handle.unload();
        }
    }
}

impl fmt::Debug for LoadedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedEngine")
            .field("retired", &self.is_retired())
            .finish()
    }
}

impl PartialEq for LoadedEngine {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.retired, &other.retired)
    }
}

/// State of the single process-wide engine
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Loading {
        model_id: String,
    },
    Ready {
        engine: LoadedEngine,
        model_id: String,
    },
    Failed {
        model_id: String,
        error: String,
    },
}

impl EngineState {
    /// The selected model, if any selection has been made
    pub fn model_id(&self) -> Option<&str> {
        match self {
            EngineState::Uninitialized => None,
            EngineState::Loading { model_id }
            | EngineState::Ready { model_id, .. }
            | EngineState::Failed { model_id, .. } => Some(model_id),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, EngineState::Loading { .. })
    }

    /// Error detail of a failed load
    pub fn error(&self) -> Option<&str> {
        match self {
            EngineState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

struct Inner {
    capability: Arc<dyn InferenceCapability>,
    state_tx: watch::Sender<EngineState>,
    progress_tx: watch::Sender<LoadingProgress>,
    /// One sender per `progress_updates` subscriber; closed ones are pruned on send
    progress_listeners: Mutex<Vec<mpsc::UnboundedSender<LoadingProgress>>>,
    epoch: AtomicU64,
}

impl Inner {
    /// Runs `apply` under the state lock if `epoch` is still current.
    /// Returns whether `apply` ran.
    fn if_current(&self, epoch: u64, apply: impl FnOnce(&mut EngineState) -> bool) -> bool {
        let mut ran = false;
        self.state_tx.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            ran = true;
            apply(state)
        });
        ran
    }

    fn publish_progress(&self, epoch: u64, progress: LoadingProgress) {
        let applied = self.if_current(epoch, |_| {
            self.progress_listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|listener| listener.send(progress.clone()).is_ok());
            self.progress_tx.send_replace(progress);
            false
        });
        if !applied {
            tracing::trace!("Dropping progress from superseded load");
        }
    }
}

/// Owner of the process-wide engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EngineLifecycle {
    inner: Arc<Inner>,
}

impl EngineLifecycle {
    /// Creates a manager in the `Uninitialized` state
    pub fn new(capability: Arc<dyn InferenceCapability>) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Uninitialized);
        let (progress_tx, _) = watch::channel(LoadingProgress::default());

        Self {
            inner: Arc::new(Inner {
                capability,
                state_tx,
                progress_tx,
                progress_listeners: Mutex::new(Vec::new()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a manager and immediately selects the registry default.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(capability: Arc<dyn InferenceCapability>) -> Self {
        let lifecycle = Self::new(capability);
        if let Err(e) = lifecycle.select_model(registry::default_model().id) {
            tracing::error!("Default model rejected: {e}");
        }
        lifecycle
    }

    /// Switches to `model_id`.
    ///
    /// The previous engine is retired before the new one starts loading.
    /// Selecting the id that is already loaded (or failed) performs a fresh
    /// load. The returned handle resolves once this load has settled, whether
    /// it was applied or discarded as stale.
    pub fn select_model(&self, model_id: &str) -> Result<JoinHandle<()>, LifecycleError> {
        let descriptor = registry::find_model(model_id)
            .ok_or_else(|| LifecycleError::UnknownModel(model_id.to_string()))?;

        let mut epoch = 0;
        let mut previous = None;
        self.inner.state_tx.send_modify(|state| {
            epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let old = std::mem::replace(
                state,
                EngineState::Loading {
                    model_id: descriptor.id.to_string(),
                },
            );
            if let EngineState::Ready { engine, .. } = old {
                previous = Some(engine);
            }
            self.inner.progress_tx.send_replace(LoadingProgress::default());
        });

        if let Some(engine) = previous {
            tracing::info!("Unloading previous engine");
            engine.retire();
        }

        tracing::info!("Loading model {} (selection #{epoch})", descriptor.id);

        let lifecycle = self.clone();
        Ok(tokio::spawn(async move {
            lifecycle.load(epoch, descriptor).await;
        }))
    }

    async fn load(&self, epoch: u64, descriptor: &'static ModelDescriptor) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let on_progress: ProgressCallback = Arc::new(move |progress| {
            if let Some(inner) = weak.upgrade() {
                tracing::debug!("Load progress {:.2}: {}", progress.fraction, progress.text);
                inner.publish_progress(epoch, progress);
            }
        });

        let result = self
            .inner
            .capability
            .create_engine(descriptor.id, on_progress)
            .await;

        match result {
            Ok(handle) => {
                let engine = LoadedEngine::new(handle);
                let ready = EngineState::Ready {
                    engine: engine.clone(),
                    model_id: descriptor.id.to_string(),
                };
                let applied = self.inner.if_current(epoch, |state| {
                    *state = ready;
                    true
                });
                if applied {
                    tracing::info!("Model {} ready", descriptor.id);
                } else {
                    tracing::debug!("Discarding stale load of {}", descriptor.id);
                    engine.retire();
                }
            }
            Err(e) => {
                let failed = EngineState::Failed {
                    model_id: descriptor.id.to_string(),
                    error: e.to_string(),
                };
                let applied = self.inner.if_current(epoch, |state| {
                    *state = failed;
                    true
                });
                if applied {
                    tracing::error!("Failed to load {}: {e}", descriptor.id);
                } else {
                    tracing::debug!("Ignoring stale failure of {}: {e}", descriptor.id);
                }
            }
        }
    }

    pub fn current_state(&self) -> EngineState {
        self.inner.state_tx.borrow().clone()
    }

    /// Latest progress of the current load
    pub fn progress(&self) -> LoadingProgress {
        self.inner.progress_tx.borrow().clone()
    }

    /// Descriptor of the most recent selection
    pub fn selected_model(&self) -> Option<&'static ModelDescriptor> {
        self.inner
            .state_tx
            .borrow()
            .model_id()
            .and_then(registry::find_model)
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.inner.state_tx.subscribe()
    }

    /// Latest-value view of progress; intermediate reports may be skipped
    pub fn subscribe_progress(&self) -> watch::Receiver<LoadingProgress> {
        self.inner.progress_tx.subscribe()
    }

    /// Every progress report of the current load, in the order the
    /// capability emitted it. Reports from superseded loads are never sent.
    pub fn progress_updates(&self) -> mpsc::UnboundedReceiver<LoadingProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .progress_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// The engine to generate against, if one is ready right now
    pub(crate) fn ready_engine(&self) -> Option<LoadedEngine> {
        match &*self.inner.state_tx.borrow() {
            EngineState::Ready { engine, .. } => Some(engine.clone()),
            _ => None,
        }
    }
}

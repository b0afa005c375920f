//! Root Dioxus application component
//!
//! Holds the application state shared across components and mirrors the
//! engine lifecycle's watch channels into signals for rendering.

use std::sync::Arc;

use dioxus::prelude::*;

use crate::inference::{
    EngineConfig, EngineLifecycle, EngineState, GenerationCoordinator, GenerationEvent,
    LlamaCapability, LoadingProgress,
};
use crate::storage::settings::{load_settings, AppSettings};
use crate::types::Transcript;
use crate::ui::Layout;

/// Global application state shared across components
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: EngineLifecycle,
    pub coordinator: GenerationCoordinator,
    pub settings: Signal<AppSettings>,
    pub engine_state: Signal<EngineState>,
    pub progress: Signal<LoadingProgress>,
    pub transcript: Signal<Transcript>,
    pub is_generating: Signal<bool>,
}

impl AppState {
    /// Builds the state and starts loading the default model
    pub fn new() -> Self {
        let settings = load_settings();
        let capability = Arc::new(LlamaCapability::new(EngineConfig::from_settings(&settings)));
        let lifecycle = EngineLifecycle::start(capability);
        let coordinator = GenerationCoordinator::new(lifecycle.clone());

        tracing::info!("AppState initialized");
        Self {
            engine_state: Signal::new(lifecycle.current_state()),
            progress: Signal::new(lifecycle.progress()),
            lifecycle,
            coordinator,
            settings: Signal::new(settings),
            transcript: Signal::new(Transcript::new()),
            is_generating: Signal::new(false),
        }
    }

    pub fn select_model(&self, model_id: &str) {
        if let Err(e) = self.lifecycle.select_model(model_id) {
            tracing::warn!("Model selection rejected: {e}");
        }
    }

    pub fn new_chat(&self) {
        let mut transcript = self.transcript;
        transcript.set(Transcript::new());
    }

    /// Appends the user's turn and streams the reply into the placeholder
    pub fn send_message(&self, text: String) {
        let mut transcript = self.transcript;
        let mut is_generating = self.is_generating;

        if text.trim().is_empty() || is_generating() || !self.engine_state.read().is_ready() {
            return;
        }

        let system_prompt = self.settings.read().system_prompt.clone();
        let history = transcript.write().begin_turn(&text, &system_prompt);
        is_generating.set(true);

        let mut events = self.coordinator.spawn_generation(history);
        spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    GenerationEvent::Delta(text) => transcript.write().update_reply(&text),
                    GenerationEvent::Finished(text) => {
                        tracing::debug!("Reply complete ({} chars)", text.chars().count());
                    }
                    GenerationEvent::Failed(e) => {
                        tracing::error!("Generation failed: {e}");
                        transcript.write().fail_reply();
                    }
                }
            }
            is_generating.set(false);
        });
    }
}

#[component]
pub fn App() -> Element {
    let app_state = use_context_provider(AppState::new);

    let lifecycle = app_state.lifecycle.clone();
    let mut engine_state = app_state.engine_state;
    let mut progress = app_state.progress;
    use_future(move || {
        let lifecycle = lifecycle.clone();
        let mut states = lifecycle.subscribe();
        async move {
            loop {
                let state = states.borrow_and_update().clone();
                engine_state.set(state);
                // A new selection restarts progress from zero
                progress.set(lifecycle.progress());
                if states.changed().await.is_err() {
                    break;
                }
            }
        }
    });

    let lifecycle = app_state.lifecycle.clone();
    use_future(move || {
        let mut updates = lifecycle.progress_updates();
        async move {
            while let Some(update) = updates.recv().await {
                progress.set(update);
            }
        }
    });

    rsx! {
        Layout {}
    }
}

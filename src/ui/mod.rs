//! UI components for Emberchat
//!
//! This module contains all user interface components built with Dioxus.

pub mod chat;
pub mod components;
pub mod sidebar;

use crate::app::AppState;
use crate::inference::{find_model, EngineState};
use crate::ui::chat::ChatView;
use crate::ui::components::loading::ProgressBar;
use crate::ui::sidebar::model_picker::ModelPicker;
use crate::ui::sidebar::Sidebar;
use dioxus::prelude::*;

/// Main Application Layout
///
/// Shows the load screen until an engine is ready, the error screen when the
/// load failed, and the chat otherwise.
#[component]
pub fn Layout() -> Element {
    let app_state = use_context::<AppState>();
    let state = app_state.engine_state.read().clone();

    rsx! {
        div {
            "data-theme": "dark",
            class: "flex h-screen w-screen bg-[var(--bg-main)] text-[var(--text-primary)] overflow-hidden font-sans",

            link { rel: "stylesheet", href: "assets/styles.css" }

            match state {
                EngineState::Ready { .. } => rsx! {
                    Sidebar {}
                    main {
                        class: "flex-1 flex flex-col h-full relative min-w-0 bg-[var(--bg-main)]",
                        ChatView {}
                    }
                },
                EngineState::Failed { model_id, error } => rsx! {
                    LoadError { model_id, error }
                },
                EngineState::Uninitialized | EngineState::Loading { .. } => rsx! {
                    LoadingScreen {}
                },
            }
        }
    }
}

#[component]
fn LoadingScreen() -> Element {
    let app_state = use_context::<AppState>();
    let progress = app_state.progress.read().clone();
    let model_name = app_state
        .engine_state
        .read()
        .model_id()
        .and_then(find_model)
        .map(|m| m.name)
        .unwrap_or("model");

    rsx! {
        div {
            class: "flex-1 flex flex-col items-center justify-center p-8 text-center animate-fade-in",
            div {
                class: "w-full max-w-md space-y-6",
                div {
                    class: "w-16 h-16 mx-auto bg-gradient-to-br from-[var(--accent-primary)] to-[var(--accent-hover)] rounded-full flex items-center justify-center text-white animate-pulse",
                    svg { width: "32", height: "32", view_box: "0 0 24 24", fill: "none", stroke: "currentColor", stroke_width: "1.5", path { d: "M21 15a2 2 0 0 1-2 2H7l-4 4V5a2 2 0 0 1 2-2h14a2 2 0 0 1 2 2z" } }
                }
                h2 { class: "text-2xl font-bold", "Initializing AI Model" }
                p { class: "text-[var(--text-secondary)]", "Loading {model_name}..." }
                ProgressBar { percent: progress.percent() }
                p { class: "text-xs font-mono text-[var(--text-tertiary)]", "{progress.text}" }
            }
        }
    }
}

#[component]
fn LoadError(model_id: String, error: String) -> Element {
    let model_name = find_model(&model_id).map(|m| m.name).unwrap_or("model");

    rsx! {
        div {
            class: "flex-1 flex flex-col items-center justify-center p-8 text-center",
            div {
                class: "w-full max-w-md space-y-4",
                p { class: "text-xl font-semibold text-[var(--text-error)]", "Error Loading Model" }
                p { class: "text-sm text-[var(--text-secondary)]", "{model_name}: {error}" }
                p { class: "text-xs text-[var(--text-tertiary)]", "Pick a model to try again." }
                div {
                    class: "text-left border border-[var(--border-subtle)] rounded-md overflow-hidden",
                    ModelPicker {}
                }
            }
        }
    }
}

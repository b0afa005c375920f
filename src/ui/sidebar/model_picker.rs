use crate::app::AppState;
use crate::inference::{find_model, list_models, EngineState};
use crate::ui::components::loading::Spinner;
use dioxus::prelude::*;

#[component]
pub fn ModelPicker() -> Element {
    let app_state = use_context::<AppState>();
    let state = app_state.engine_state.read().clone();
    let selected_id = state.model_id().unwrap_or_default().to_string();
    let selected = find_model(&selected_id);

    let app_state_for_select = app_state.clone();
    let handle_change = move |evt: Event<FormData>| {
        app_state_for_select.select_model(&evt.value());
    };

    rsx! {
        div {
            class: "flex flex-col p-4 border-b border-[var(--border-subtle)] gap-3 bg-[var(--bg-sidebar)]",

            span {
                class: "text-[10px] uppercase tracking-wider text-[var(--text-tertiary)] font-bold select-none",
                "Model Selection"
            }

            div {
                class: "flex flex-col gap-2",

                div {
                    class: "relative group",
                    select {
                        class: "w-full appearance-none bg-[var(--bg-input)] border border-[var(--border-subtle)] text-[var(--text-primary)] text-sm rounded-md py-2 pl-3 pr-8 focus:outline-none focus:border-[var(--accent-primary)] focus:ring-1 focus:ring-[var(--accent-primary)] transition-all font-mono",
                        disabled: state.is_loading(),
                        onchange: handle_change,
                        value: "{selected_id}",

                        for model in list_models() {
                            option {
                                value: "{model.id}",
                                selected: model.id == selected_id,
                                "{model.name}"
                            }
                        }
                    }
                    // Custom Chevron
                    div {
                        class: "absolute right-2 top-1/2 -translate-y-1/2 pointer-events-none text-[var(--text-tertiary)] group-hover:text-[var(--text-secondary)]",
                        svg {
                            class: "w-4 h-4",
                            view_box: "0 0 24 24",
                            fill: "none",
                            stroke: "currentColor",
                            stroke_width: "2",
                            stroke_linecap: "round",
                            stroke_linejoin: "round",
                            polyline { points: "6 9 12 15 18 9" }
                        }
                    }
                }

                if let Some(model) = selected {
                    div {
                        class: "flex items-start justify-between gap-2",
                        span { class: "text-[11px] text-[var(--text-secondary)]", "{model.description}" }
                        span {
                            class: "text-[10px] text-[var(--text-tertiary)] font-mono whitespace-nowrap",
                            "{model.approximate_size}"
                        }
                    }
                }

                match state {
                    EngineState::Uninitialized | EngineState::Loading { .. } => rsx! {
                        div {
                            class: "w-full flex items-center justify-center gap-3 bg-[var(--bg-subtle)] border border-[var(--border-subtle)] py-2 rounded-md",
                            Spinner { size: 16 }
                            span { class: "text-sm text-[var(--text-secondary)]", "Loading..." }
                        }
                    },
                    EngineState::Ready { .. } => rsx! {
                        div {
                            class: "flex items-center gap-2 px-3 py-2 bg-[var(--bg-success-subtle)] border border-[var(--border-success-subtle)] rounded-md",
                            div { class: "w-2 h-2 rounded-full bg-[var(--success)] animate-pulse" }
                            span { class: "text-xs font-medium text-[var(--text-success)]", "Active" }
                        }
                    },
                    EngineState::Failed { error, .. } => rsx! {
                        div {
                            class: "w-full p-2 bg-[var(--bg-error-subtle)] border border-[var(--border-error-subtle)] rounded-md text-xs text-[var(--text-error)]",
                            "{error}"
                        }
                    },
                }
            }
        }
    }
}

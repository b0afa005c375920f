pub mod model_picker;

use crate::app::AppState;
use crate::ui::sidebar::model_picker::ModelPicker;
use dioxus::prelude::*;

#[component]
pub fn Sidebar() -> Element {
    let app_state = use_context::<AppState>();
    let is_generating = app_state.is_generating;

    rsx! {
        aside {
            class: "flex flex-col w-[260px] h-full bg-[var(--bg-sidebar)] border-r border-[var(--border-subtle)] transition-colors duration-300",

            // Model Selector
            ModelPicker {}

            // New Chat
            div {
                class: "p-3",
                button {
                    class: "w-full flex items-center gap-3 px-3 py-3 text-sm text-[var(--text-primary)] border border-[var(--border-subtle)] rounded-md hover:bg-[var(--bg-hover)] transition-colors duration-200 text-left shadow-sm disabled:opacity-50",
                    disabled: is_generating(),
                    onclick: move |_| app_state.new_chat(),

                    svg {
                        width: "16",
                        height: "16",
                        view_box: "0 0 24 24",
                        fill: "none",
                        stroke: "currentColor",
                        stroke_width: "2",
                        stroke_linecap: "round",
                        stroke_linejoin: "round",
                        path { d: "M12 5v14M5 12h14" }
                    }
                    "New Chat"
                }
            }

            div { class: "flex-1" }

            div {
                class: "p-3 border-t border-[var(--border-subtle)] text-[10px] text-[var(--text-tertiary)] select-none",
                "Runs entirely on this device"
            }
        }
    }
}

//! Chat interface components
//!
//! Contains the main chat view, message display, and input components.

pub mod input;
pub mod message;

use dioxus::prelude::*;
use input::ChatInput;
use message::MessageBubble;

use crate::app::AppState;

#[component]
pub fn ChatView() -> Element {
    let app_state = use_context::<AppState>();
    let transcript = app_state.transcript;
    let is_generating = app_state.is_generating;

    let handle_send = move |text: String| app_state.send_message(text);

    rsx! {
        div { class: "flex flex-col h-full bg-[var(--bg-main)] relative",

            // Messages Area
            div { class: "flex-1 overflow-y-auto p-4 space-y-2 custom-scrollbar scroll-smooth",
                for (idx, msg) in transcript.read().messages().iter().enumerate() {
                    MessageBubble { key: "{idx}", message: msg.clone() }
                }
                div { class: "h-4" }
            }

            ChatInput {
                on_send: handle_send,
                is_generating: is_generating(),
            }
        }
    }
}

use dioxus::prelude::*;

#[component]
pub fn Spinner(props: SpinnerProps) -> Element {
    let size = props.size.unwrap_or(24);
    let color = props.color.unwrap_or("var(--accent-primary)".to_string());

    rsx! {
        div {
            class: "spinner",
            style: "width: {size}px; height: {size}px; border: 2px solid var(--bg-active); border-top-color: {color}; border-radius: 50%; animation: spin 1s linear infinite;",
        }
        style {
            "@keyframes spin {{ to {{ transform: rotate(360deg); }} }}"
        }
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct SpinnerProps {
    #[props(optional)]
    pub size: Option<i32>,
    #[props(optional)]
    pub color: Option<String>,
}

/// Horizontal bar filled to `percent` (0-100)
#[component]
pub fn ProgressBar(percent: u32) -> Element {
    let width = percent.min(100);

    rsx! {
        div {
            class: "h-1.5 w-full bg-[var(--bg-active)] rounded-full overflow-hidden",
            div {
                class: "h-full bg-[var(--accent-primary)] transition-all duration-300 ease-out",
                style: "width: {width}%;",
            }
        }
    }
}

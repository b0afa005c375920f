//! Emberchat - Local LLM Chat Application
//!
//! A desktop chat window backed by a model running entirely on this machine.

use dioxus::desktop::{Config, LogicalSize, WindowBuilder};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use emberchat::app::App;
use emberchat::storage::init_storage;

fn main() {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emberchat=info")))
        .init();

    info!("Starting Emberchat v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = init_storage() {
        warn!("Storage unavailable, continuing with defaults: {e}");
    }

    dioxus::LaunchBuilder::desktop()
        .with_cfg(
            Config::default().with_window(
                WindowBuilder::new()
                    .with_title("Emberchat")
                    .with_inner_size(LogicalSize::new(1200.0, 800.0)),
            ),
        )
        .launch(App);
}

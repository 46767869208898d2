//! Command-line front-end and HTTP wrapper for [`docrag`].

pub mod config;
pub mod logging;
pub mod output;
pub mod server;

pub use config::{Cli, Command, EmbedderKind, SynthesizerKind};
pub use logging::init_logging;
pub use server::{AppState, RagRequest, RagResponse, ServerConfig, app_router, run_server};

pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ClientConfig, LoggingConfig, ServerConfig};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{KeywardServer, ServerBuilder, build_app, build_state};

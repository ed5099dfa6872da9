//! DashLens Core Library
//!
//! Foundational utilities shared by every DashLens crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{
    AppConfig, ContextSettings, EmbeddingSettings, IndexSettings, ProviderSettings,
    RefreshSettings,
};
pub use error::{AppError, AppResult};
pub use logging::LogFormat;

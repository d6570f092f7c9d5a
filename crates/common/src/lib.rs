//! feedform Common Library
//!
//! Error taxonomy, remote service model and configuration shared by the
//! feedform crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use config::{LoggingConfig, ProviderConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use types::*;

/// feedform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration directory
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".feedform")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}

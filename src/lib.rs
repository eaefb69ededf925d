pub mod config;
pub mod core;
pub mod host;

// Re-export commonly used items for convenience
pub use config::ClientConfig;
pub use crate::core::*;

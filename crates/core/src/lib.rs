//! Core utilities shared by the renderer crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Start-up configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{AssetConfig, Config, RenderConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::Timer;

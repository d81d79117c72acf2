//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or human-pretty formatting, selected by `logging.format`
//! - Secret scrubbing of API keys, bearer tokens, and passwords
//! - Optional file output with daily/hourly/never rotation

pub mod config;
pub mod logger;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubbingLayer;

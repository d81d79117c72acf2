//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Dotted-key CLI overrides
//! - Configuration validation

pub mod loader;

pub use loader::ConfigLoader;

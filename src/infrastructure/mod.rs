//! Infrastructure layer
//!
//! Ambient engineering concerns that every process needs regardless of the
//! orchestrator's product scope (spec §1a, §1b): configuration loading and
//! structured logging.

pub mod config;
pub mod logging;

//! Domain layer: pure types, error taxonomy, and capability ports.
//!
//! Nothing in this module spawns a process, touches the filesystem, or opens
//! a socket — that belongs to `adapters` and `infrastructure`. The domain
//! layer only describes *what* the orchestrator works with and *what* its
//! collaborators must be able to do.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{
    ConfigError, DispatchError, IpcError, MergeError, OrchestratorError, WorkerError,
};

//! CLI command definitions and handlers.
//!
//! `init` and `run` are self-contained; `workers`/`merge`/`pause`/`resume`/
//! `cancel`/`kill-supervisor` are thin IPC clients against a running
//! `codex-swarm run` process.

pub mod control;
pub mod init;
pub mod run;

//! Codex Swarm — an orchestrator for a swarm of code-writing agents driven
//! by an external AI command-line binary.
//!
//! A long-lived supervisor process emits fenced tool-call blocks in its
//! streamed output; [`application::orchestrator::Orchestrator`] parses those
//! blocks, spawns short-lived worker processes inside isolated per-worker
//! repository checkouts, constrains each worker to a declared file scope,
//! captures its token usage and diff, auto-merges its branch back into the
//! main working copy when permitted, and writes structured responses back to
//! the supervisor via an append-only response file. A parallel IPC channel
//! broadcasts lifecycle events and accepts external control requests.
//!
//! Layering, outermost to innermost:
//! - [`cli`] — the `codex-swarm` binary's command surface
//! - [`application`] — dispatch parsing, worker lifecycle, strategies,
//!   merging, budget accounting, the event bus and IPC server, and the
//!   top-level orchestrator wiring them together
//! - [`adapters`] — concrete `git` and agent-binary process implementations
//!   of the `domain::ports` capability traits
//! - [`domain`] — pure types, error taxonomy, and capability ports
//! - [`infrastructure`] — configuration loading and structured logging

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

pub use domain::models::AppConfig;

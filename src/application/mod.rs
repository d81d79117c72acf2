//! Application layer
//!
//! Orchestrates the domain ports into the swarm's runtime use cases:
//! - Dispatch-block extraction from supervisor output
//! - Bounded-concurrency worker execution
//! - Fan-out / pipeline / map-reduce / debate scheduling strategies
//! - Serialized branch merging and the approval gate
//! - Token/cost budget accounting
//! - The in-process event bus and its Unix-socket IPC transport
//! - The top-level orchestrator wiring all of the above around one
//!   supervisor invocation
//!
//! Each submodule owns exactly one of these concerns and depends only on
//! `domain` ports and other application submodules — never on `adapters` or
//! `infrastructure` directly.

pub mod budget_tracker;
pub mod dispatch_parser;
pub mod event_bus;
pub mod ipc_server;
pub mod merge_coordinator;
pub mod orchestrator;
pub mod strategy_engine;
pub mod worker_manager;
pub mod worktree_allocator;

pub use budget_tracker::BudgetTracker;
pub use dispatch_parser::{extract_dispatches, ParsedDispatch};
pub use event_bus::EventBus;
pub use ipc_server::{IpcServer, RequestHandler};
pub use merge_coordinator::MergeCoordinator;
pub use orchestrator::Orchestrator;
pub use strategy_engine::StrategyEngine;
pub use worker_manager::{WorkerManager, WorkerManagerConfig};
pub use worktree_allocator::WorktreeAllocator;

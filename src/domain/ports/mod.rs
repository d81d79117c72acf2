//! Capability ports the application layer depends on. Concrete
//! implementations live under `adapters`; tests substitute in-memory fakes.

pub mod agent_runner;
pub mod vcs_driver;

pub use agent_runner::{AgentLine, AgentOutcome, AgentRunner, AgentSpawnRequest};
pub use vcs_driver::{MergeStrategy, VcsDriver};

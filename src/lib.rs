//! # forward-supervisor
//!
//! `forward-supervisor` keeps `kubectl port-forward` sessions alive.
//! Declare a set of named targets once; each one is resolved to its current
//! pod, forwarded to a local port, and restarted when the pod is replaced, the
//! tunnel drops, or the network goes away for a while.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use forward_supervisor::{SupervisorBuilder, TargetSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut supervisor = SupervisorBuilder::new()
//!         .with_target(TargetSpec::new("api", 8080))
//!         .with_target(TargetSpec::new("redis", 6379))
//!         .build()
//!         .run();
//!
//!     supervisor.wait().await?; // returns once nothing is left to forward
//!     Ok(())
//! }
//! ```
//!
//! ## Target lifecycle
//!
//! | From                     | Event                                   | To                  |
//! | ------------------------ | --------------------------------------- | ------------------- |
//! | `Resolving`              | pod found and `Running`                 | `Starting`          |
//! | `Resolving`              | pod missing, not ready, or ambiguous    | `PermanentlyFailed` |
//! | `Starting`               | `Forwarding from ...`                   | `Running`           |
//! | `Starting`               | unexpected output                       | `PermanentlyFailed` |
//! | `Running`                | forwarding error or failed health check | `Recovering`        |
//! | `Running`                | local port already in use               | `Excluded`          |
//! | any                      | `bind: permission denied`               | `PermanentlyFailed` |
//! | `Recovering`             | pod found again                         | `Starting`          |
//! | `Recovering`             | retry budget exhausted                  | `PermanentlyFailed` |
//!
//! Permission failures, initialization failures and exhausted recovery stop
//! the whole supervisor. A network outage suspends everything until the
//! cluster can be listed again.

pub use error::{ConfigError, ListingError, ResolveError, SpawnError, SupervisorError};
pub use listing::{KubectlLister, Lister};
pub use process::{ForwardProcess, KubectlSpawner, OutputSink, SpawnRequest, Spawner};
pub use recovery::RecoveryPolicy;
pub use supervisor::{
    builder::SupervisorBuilder,
    handle::{SupervisorHandle, SupervisorHandleError},
    Supervisor, SupervisorExit,
};
pub use target::{Lifecycle, TargetSpec, TargetStatus};

pub mod cli;
pub mod config;
pub mod outage;
pub mod resolver;

mod classifier;
mod error;
mod health;
mod listing;
mod messaging;
mod process;
mod recovery;
mod supervisor;
mod target;

pub type TargetName = String;

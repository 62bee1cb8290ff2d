//! Lifecycle management for Lumina's embedded database server.
//!
//! Lumina stores its photo catalog in a private, per-installation
//! MySQL/MariaDB instance instead of relying on a system-wide database
//! service. This crate owns everything needed to bring that instance
//! up and down: locating and validating the engine binaries, deriving
//! and initializing the on-disk layout, materializing the effective
//! server configuration, detecting pending storage-format upgrades
//! from the previous run's error log, launching and probing the server
//! process, and shutting it down again.
//!
//! Entry point for applications is [`DatabaseServerStarter`], which
//! serializes start/stop across independently launched Lumina
//! instances through a cross-process lock. [`DatabaseServer`] is the
//! per-instance supervisor underneath it.

mod config;
mod error;
mod error_log;
mod layout;
mod lifecycle;
mod lock;
mod port;
mod probe;
mod process;
mod run_state;
mod starter;
mod transport;
mod upgrade;

pub use config::ConfigReconciler;
pub use error::{ErrorKind, ServerError, ServerResult};
pub use layout::ServerLayout;
pub use lifecycle::DatabaseServer;
pub use lock::{CrossProcessLock, FileLock};
pub use port::{DEFAULT_SERVER_PORT, pick_server_port};
pub use probe::{ConnectionProbe, MysqlProbe};
pub use process::{
    CommandSpec, ProcessRunner, ServerHandle, TokioProcessRunner, ToolOutput,
};
pub use run_state::RunState;
pub use starter::DatabaseServerStarter;
pub use transport::ConnectTransport;
pub use upgrade::{AcceptUpgrades, UpgradeConfirmation, UpgradeDecision};

#[cfg(test)]
mod tests;

/// Name of the application database created on first start.
const DATABASE_NAME: &str = "lumina";

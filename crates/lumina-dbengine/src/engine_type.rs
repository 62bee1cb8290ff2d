use serde::{Deserialize, Serialize};

/// Which database engine backs the application storage.
///
/// Only `MysqlInternal` (a private, per-installation MySQL/MariaDB
/// instance managed by the lifecycle supervisor) is handled by this
/// workspace; the other variants are connected to directly by the
/// SQL layer and need no process management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineType {
    /// Private MySQL/MariaDB server started and stopped by Lumina.
    MysqlInternal,
    /// Externally administered MySQL server.
    MysqlExternal,
    /// File-local SQLite database.
    Sqlite,
}

impl EngineType {
    /// True for the engine kind that requires a managed server process.
    pub fn is_internal_server(self) -> bool {
        matches!(self, Self::MysqlInternal)
    }
}

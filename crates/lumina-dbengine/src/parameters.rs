use crate::{EngineType, PRIVATE_PATH_SUFFIX, UPGRADE_TOOL_NAME};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings describing the embedded database engine installation.
///
/// Built by the application's settings layer and handed to the server
/// supervisor, which treats it as immutable for its whole lifetime.
/// Paths to the three engine executables come from the installation
/// (or from user overrides in the database settings dialog); the
/// config templates are resolved by the application's resource lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParameters {
    /// Engine kind; the supervisor only accepts `MysqlInternal`.
    pub engine: EngineType,

    /// Root directory of the private server instance. An empty path
    /// means "use the per-user default location".
    pub root_dir: PathBuf,

    /// The server daemon executable (`mysqld`).
    pub server_cmd: PathBuf,

    /// The data-directory initializer (`mysql_install_db`).
    pub init_cmd: PathBuf,

    /// The admin client used for shutdown (`mysqladmin`).
    pub admin_cmd: PathBuf,

    /// Bundled default configuration template.
    pub default_config: PathBuf,

    /// Optional site-local configuration override, appended after the
    /// default template when materializing the effective config.
    pub local_config: Option<PathBuf>,
}

impl EngineParameters {
    /// Per-user default location for the private server instance.
    pub fn default_private_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(PRIVATE_PATH_SUFFIX)
    }

    /// The instance root, falling back to the per-user default when
    /// no explicit path was configured.
    pub fn resolved_root(&self) -> PathBuf {
        if self.root_dir.as_os_str().is_empty() {
            let root = Self::default_private_path();
            debug!("No instance root configured, using default {}", root.display());
            root
        } else {
            self.root_dir.clone()
        }
    }

    /// Path of the schema upgrade tool, expected to live next to the
    /// admin client binary.
    pub fn upgrade_cmd(&self) -> PathBuf {
        self.admin_cmd
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(UPGRADE_TOOL_NAME)
    }
}

use std::path::PathBuf;

use lumina_dbengine::EngineParameters;

const DATA_DIR: &str = "db_data";
const MISC_DIR: &str = "db_misc";
const FILE_DATA_DIR: &str = "file_db_data";
const ACTUAL_CONFIG: &str = "mysql.conf";
const SOCKET_NAME: &str = "mysql.socket";
const SYSTEM_TABLES_DIR: &str = "mysql";

/// On-disk layout of the private server instance, derived once from
/// the engine parameters and owned exclusively by the supervisor.
#[derive(Debug, Clone)]
pub struct ServerLayout {
    /// Persistent storage files of the server.
    pub data_dir: PathBuf,
    /// Runtime artifacts such as the connection socket.
    pub misc_dir: PathBuf,
    /// Auxiliary file-backed table storage.
    pub file_data_dir: PathBuf,
    /// The materialized effective configuration passed to the server.
    pub actual_config: PathBuf,
    /// Bundled default configuration template.
    pub default_config: PathBuf,
    /// Optional site-local configuration override.
    pub local_config: Option<PathBuf>,
}

impl ServerLayout {
    pub fn derive(params: &EngineParameters) -> Self {
        let root = params.resolved_root();

        Self {
            data_dir: root.join(DATA_DIR),
            misc_dir: root.join(MISC_DIR),
            file_data_dir: root.join(FILE_DATA_DIR),
            actual_config: root.join(ACTUAL_CONFIG),
            default_config: params.default_config.clone(),
            local_config: params.local_config.clone(),
        }
    }

    /// Unix domain socket the server listens on.
    pub fn socket_path(&self) -> PathBuf {
        self.misc_dir.join(SOCKET_NAME)
    }

    /// Directory holding the engine's system tables; its presence
    /// means the data directory has already been initialized.
    pub fn system_tables_dir(&self) -> PathBuf {
        self.data_dir.join(SYSTEM_TABLES_DIR)
    }
}

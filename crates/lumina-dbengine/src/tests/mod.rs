
use crate::{EngineParameters, EngineType};

use std::path::PathBuf;

/// Parameters for a typical internal-server installation.
pub(crate) fn internal_params() -> EngineParameters {
    EngineParameters {
        engine: EngineType::MysqlInternal,
        root_dir: PathBuf::from("/var/lib/lumina"),
        server_cmd: PathBuf::from("/usr/sbin/mysqld"),
        init_cmd: PathBuf::from("/usr/bin/mysql_install_db"),
        admin_cmd: PathBuf::from("/usr/bin/mysqladmin"),
        default_config: PathBuf::from("/usr/share/lumina/mysql-global.conf"),
        local_config: None,
    }
}

//! Rotation and inspection of the server's error log.
//!
//! The error log is the only channel through which the engine tells us
//! that its on-disk format predates the installed server version: a
//! fresh server writes an advisory naming the upgrade tool to run.
//! Each startup attempt moves the previous log out of the way (so the
//! new server instance starts with a clean file) and scans the rotated
//! content for those advisories.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

const ERROR_LOG: &str = "mysql.err";
const ROTATED_LOG: &str = "mysql.err.old";

/// Advisory substrings emitted by MariaDB and MySQL respectively.
const UPGRADE_MARKERS: [&str; 2] = ["run mariadb-upgrade", "run mysql_upgrade"];

/// Append the previous run's error log to the rolling archive and
/// report whether it flags a pending storage-format upgrade.
///
/// A missing log file simply means no upgrade is pending. Rotation
/// failures are logged and treated the same way.
pub fn rotate_and_scan(data_dir: &Path) -> bool {
    let log_path = data_dir.join(ERROR_LOG);

    if !log_path.exists() {
        return false;
    }

    let content = match std::fs::read(&log_path) {
        Ok(content) => content,
        Err(err) => {
            debug!("Failed to open the database error log: {err}");
            return false;
        }
    };

    let archived = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(data_dir.join(ROTATED_LOG))
        .and_then(|mut archive| archive.write_all(&content));

    if let Err(err) = archived {
        debug!("Failed to archive the database error log: {err}");
        return false;
    }

    if let Err(err) = std::fs::remove_file(&log_path) {
        debug!("Failed to remove the rotated database error log: {err}");
    }

    let text = String::from_utf8_lossy(&content);
    let needs_upgrade = UPGRADE_MARKERS.iter().any(|marker| text.contains(marker));

    if needs_upgrade {
        info!("Previous error log flags a pending database upgrade");
    }

    needs_upgrade
}

//! Cross-process exclusion for server initialization.
//!
//! Two independently launched Lumina instances must not race to
//! initialize the same data directory. The facade takes this lock
//! around every start/stop call; the second process blocks until the
//! first has finished and then observes the already-initialized tree.

use crate::{ServerError, ServerResult};

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};

use error_location::ErrorLocation;
use lumina_dbengine::EngineParameters;
use serde::{Deserialize, Serialize};
use tracing::debug;

const LOCK_FILENAME: &str = "lumina-dbserver.lock";

#[cfg(windows)]
const WINDOWS_RETRY_WAIT: std::time::Duration = std::time::Duration::from_millis(100);

/// System-wide mutual exclusion around server start/stop.
///
/// `acquire` blocks until the lock is held. Implementations must
/// release on drop so a crashed holder never wedges other instances.
pub trait CrossProcessLock: Send {
    fn acquire(&mut self) -> ServerResult<()>;
    fn release(&mut self);
}

/// Diagnostic payload written into the lock file by the holder.
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    started_at: String,
}

/// Advisory file lock: blocking `flock` on Unix, an exclusive-share
/// open with retry on Windows.
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    pub fn new(lock_dir: &Path) -> Self {
        Self {
            path: lock_dir.join(LOCK_FILENAME),
            file: None,
        }
    }

    /// Lock in the per-user private server location, shared by every
    /// Lumina instance of the same user.
    pub fn in_default_dir() -> Self {
        Self::new(&EngineParameters::default_private_path())
    }

    fn acquisition_error(&self, source: std::io::Error) -> ServerError {
        ServerError::LockAcquisition {
            path: self.path.clone(),
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[cfg(unix)]
    fn open_locked(&self) -> std::io::Result<File> {
        use std::os::fd::AsRawFd;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        loop {
            // SAFETY: locking an owned, open descriptor.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };

            if rc == 0 {
                return Ok(file);
            }

            let err = std::io::Error::last_os_error();

            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(windows)]
    fn open_locked(&self) -> std::io::Result<File> {
        use std::os::windows::fs::OpenOptionsExt;

        // Exclusive share mode: a second opener fails until the holder
        // closes its handle, so poll until the open succeeds.
        loop {
            match OpenOptions::new()
                .write(true)
                .create(true)
                .share_mode(0)
                .open(&self.path)
            {
                Ok(file) => return Ok(file),
                Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                    std::thread::sleep(WINDOWS_RETRY_WAIT);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn write_info(file: &mut File) -> std::io::Result<()> {
        let info = LockInfo {
            pid: std::process::id(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };

        let content = serde_json::to_string_pretty(&info).unwrap_or_default();

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }
}

impl CrossProcessLock for FileLock {
    fn acquire(&mut self) -> ServerResult<()> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|err| self.acquisition_error(err))?;
        }

        let mut file = self
            .open_locked()
            .map_err(|err| self.acquisition_error(err))?;

        if let Err(err) = Self::write_info(&mut file) {
            debug!("Failed to write lock file info: {err}");
        }

        self.file = Some(file);

        Ok(())
    }

    /// The lock file itself stays behind; the advisory lock is
    /// released with the descriptor.
    fn release(&mut self) {
        self.file.take();
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

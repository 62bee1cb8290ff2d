//! Application-facing facade over the supervisor.

use crate::lifecycle::DatabaseServer;
use crate::lock::{CrossProcessLock, FileLock};
use crate::{RunState, ServerResult};

use std::sync::{Arc, OnceLock};

use lumina_dbengine::EngineParameters;
use tokio::sync::Mutex;
use tracing::{info, warn};

static INSTANCE: OnceLock<DatabaseServerStarter> = OnceLock::new();

/// Process-wide entry point for bringing the embedded database server
/// up and down.
///
/// Every start and stop runs under a cross-process lock, so two Lumina
/// instances launched back to back never race to initialize the same
/// data directory; the second caller blocks until the first is done.
pub struct DatabaseServerStarter {
    lock: Mutex<Box<dyn CrossProcessLock>>,
    server: Mutex<Option<Arc<DatabaseServer>>>,
}

impl DatabaseServerStarter {
    /// The shared per-process instance, locking in the default private
    /// server directory.
    pub fn instance() -> &'static Self {
        INSTANCE.get_or_init(|| Self::with_lock(Box::new(FileLock::in_default_dir())))
    }

    /// Build a starter around a specific lock implementation.
    pub fn with_lock(lock: Box<dyn CrossProcessLock>) -> Self {
        Self {
            lock: Mutex::new(lock),
            server: Mutex::new(None),
        }
    }

    /// Start the internal server described by `params`. Succeeds
    /// without doing anything when this starter already runs one.
    pub async fn start_server_manager(&self, params: EngineParameters) -> ServerResult<()> {
        self.start_supervisor(Arc::new(DatabaseServer::new(params)))
            .await
    }

    /// Start a pre-built supervisor, used by frontends that attach
    /// their own confirmation handler or environment.
    pub async fn start_supervisor(&self, server: Arc<DatabaseServer>) -> ServerResult<()> {
        let mut slot = self.server.lock().await;

        if let Some(existing) = slot.as_ref()
            && existing.state() == RunState::Running
        {
            warn!("Database server manager is already running");
            return Ok(());
        }

        self.lock.lock().await.acquire()?;

        let result = server.start().await;

        self.lock.lock().await.release();

        result?;
        *slot = Some(server);

        Ok(())
    }

    /// Stop the managed server. A no-op when nothing was started.
    pub async fn stop_server_manager(&self) {
        let Some(server) = self.server.lock().await.take() else {
            return;
        };

        info!("Shutting down database server manager");

        if let Err(err) = self.lock.lock().await.acquire() {
            warn!("Proceeding with shutdown without the lock: {err}");
        }

        server.stop().await;

        self.lock.lock().await.release();
    }

    /// Whether this starter currently manages a running server.
    pub async fn is_running(&self) -> bool {
        match self.server.lock().await.as_ref() {
            Some(server) => server.is_running().await,
            None => false,
        }
    }
}

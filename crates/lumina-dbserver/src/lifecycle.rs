//! The database server supervisor.

use crate::config::ConfigReconciler;
use crate::error_log;
use crate::layout::ServerLayout;
use crate::probe::{ConnectionProbe, MysqlProbe};
use crate::process::{CommandSpec, ProcessRunner, ServerHandle, TokioProcessRunner};
use crate::run_state::RunState;
use crate::transport::ConnectTransport;
use crate::upgrade::{AcceptUpgrades, UpgradeConfirmation, UpgradeDecision};
use crate::{ServerError, ServerResult};

use std::ffi::OsString;
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use error_location::ErrorLocation;
use lumina_dbengine::{EngineParameters, EnvironmentAdjuster, InheritedEnvironment};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a freshly spawned server may take to die before we treat
/// the spawn as successful and move on to the connection probe.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Bounded wait for voluntary exit after the shutdown command, before
/// escalating to a hard kill.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

const MONITOR_TICK: Duration = Duration::from_secs(1);
const MONITOR_LOG_EVERY: u32 = 30;

/// Supervises one private database server process through a single
/// start/stop cycle.
///
/// `start()` runs the whole startup sequence synchronously on the
/// calling task and only returns once the server is confirmed
/// reachable (or a step failed); it can block for tens of seconds
/// while probing, or indefinitely during an upgrade. Callers that need
/// a responsive UI must not await it on their main thread.
///
/// The supervisor is single-use: construct, `start()`, eventually
/// `stop()`, then drop. Use [`crate::DatabaseServerStarter`] to get
/// cross-process exclusion on top.
pub struct DatabaseServer {
    params: EngineParameters,
    layout: ServerLayout,
    runner: Arc<dyn ProcessRunner>,
    probe: Arc<dyn ConnectionProbe>,
    confirmation: Arc<dyn UpgradeConfirmation>,
    environment: Arc<dyn EnvironmentAdjuster>,
    handle: Mutex<Option<Box<dyn ServerHandle>>>,
    transport: Mutex<Option<ConnectTransport>>,
    state_tx: watch::Sender<RunState>,
    state_rx: watch::Receiver<RunState>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseServer {
    pub fn new(params: EngineParameters) -> Self {
        Self::with_components(
            params,
            Arc::new(TokioProcessRunner),
            Arc::new(MysqlProbe::default()),
            Arc::new(AcceptUpgrades),
            Arc::new(InheritedEnvironment),
        )
    }

    /// Construct with explicit collaborators. The GUI shell uses this
    /// to attach its upgrade-confirmation dialog and bundle
    /// environment; tests use it to substitute fakes.
    pub fn with_components(
        params: EngineParameters,
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn ConnectionProbe>,
        confirmation: Arc<dyn UpgradeConfirmation>,
        environment: Arc<dyn EnvironmentAdjuster>,
    ) -> Self {
        let layout = ServerLayout::derive(&params);
        let (state_tx, state_rx) = watch::channel(RunState::Started);

        debug!("Server instance layout: {layout:?}");

        Self {
            params,
            layout,
            runner,
            probe,
            confirmation,
            environment,
            handle: Mutex::new(None),
            transport: Mutex::new(None),
            state_tx,
            state_rx,
            monitor: Mutex::new(None),
        }
    }

    pub fn layout(&self) -> &ServerLayout {
        &self.layout
    }

    pub fn state(&self) -> RunState {
        *self.state_rx.borrow()
    }

    /// Observe state transitions; the receiver sees `Stopped` once the
    /// monitoring loop has been told to finish.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_rx.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some() && self.state() == RunState::Running
    }

    /// Chosen connection transport, available once the server process
    /// has been launched.
    pub async fn transport(&self) -> Option<ConnectTransport> {
        self.transport.lock().await.clone()
    }

    /// Run the full startup sequence and, on success, the background
    /// monitoring loop.
    pub async fn start(&self) -> ServerResult<()> {
        if !self.params.engine.is_internal_server() {
            debug!("This database type is not supported");
            self.set_state(RunState::NotRunning);

            return Err(ServerError::NotSupported {
                location: ErrorLocation::from(Location::caller()),
            });
        }

        match self.start_sequence().await {
            Ok(()) => {
                self.set_state(RunState::Running);
                self.spawn_monitor().await;
                info!("Database server is up and running");
                Ok(())
            }
            Err(err) => {
                self.set_state(RunState::NotRunning);
                Err(err)
            }
        }
    }

    /// Shut the server process down, gracefully first, forcefully
    /// after [`SHUTDOWN_WAIT`]. A no-op when no process is running.
    pub async fn stop(&self) {
        if self.handle.lock().await.is_none() {
            return;
        }

        self.stop_server_process().await;
        self.set_state(RunState::Stopped);

        if let Some(task) = self.monitor.lock().await.take() {
            task.await.ok();
        }

        info!("Database server stopped");
    }

    /// The strictly ordered startup steps; each must fully succeed
    /// before the next begins.
    async fn start_sequence(&self) -> ServerResult<()> {
        self.check_prerequisites()?;

        ConfigReconciler::new(&self.layout).reconcile()?;

        let needs_upgrade = error_log::rotate_and_scan(&self.layout.data_dir);

        self.create_server_files().await?;
        self.start_server_process().await?;

        if needs_upgrade {
            self.upgrade_database().await?;
        }

        self.probe_connection().await
    }

    /// All executable paths must be configured and the instance
    /// directories must exist or be creatable.
    fn check_prerequisites(&self) -> ServerResult<()> {
        let commands = [
            ("server", &self.params.server_cmd),
            ("initialization", &self.params.init_cmd),
            ("administration", &self.params.admin_cmd),
        ];

        for (which, path) in commands {
            if path.as_os_str().is_empty() {
                debug!("No path to the database {which} command configured");

                return Err(ServerError::MissingCommand {
                    which,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        for dir in [
            &self.layout.data_dir,
            &self.layout.misc_dir,
            &self.layout.file_data_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|err| ServerError::DirectoryCreation {
                path: dir.clone(),
                source: err,
                location: ErrorLocation::from(Location::caller()),
            })?;
        }

        Ok(())
    }

    /// Initialize the data directory on first start.
    async fn create_server_files(&self) -> ServerResult<()> {
        if self.layout.system_tables_dir().exists() {
            return Ok(());
        }

        let mut args = Vec::new();

        // The Windows initializer refuses --defaults-file.
        #[cfg(not(windows))]
        args.push(path_arg("--defaults-file=", &self.layout.default_config));

        args.push(path_arg("--datadir=", &self.layout.data_dir));

        let spec = self.command(&self.params.init_cmd, args);
        info!("Database initializer: {}", spec.describe());

        let output = self.runner.run_tool(spec).await;

        if !output.success() {
            return Err(ServerError::ToolFailed {
                context: "Could not start the database initializer.",
                report: output.report(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }

    /// Launch the server daemon and verify it survives its first
    /// moments.
    async fn start_server_process(&self) -> ServerResult<()> {
        let transport = self.choose_transport()?;

        let mut args = vec![
            path_arg("--defaults-file=", &self.layout.actual_config),
            path_arg("--datadir=", &self.layout.data_dir),
        ];
        args.extend(transport.server_args());

        let spec = self.command(&self.params.server_cmd, args);
        info!("Database server: {}", spec.describe());

        let mut handle = self.runner.spawn_server(spec).await?;

        if let Some(output) = handle.wait_exit(STARTUP_GRACE).await {
            return Err(ServerError::ServerExited {
                context: "Could not start the database server.",
                report: output.report(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        debug!("Database server started with pid {:?}", handle.pid());

        *self.handle.lock().await = Some(handle);
        *self.transport.lock().await = Some(transport);

        Ok(())
    }

    #[cfg(not(windows))]
    fn choose_transport(&self) -> ServerResult<ConnectTransport> {
        Ok(ConnectTransport::Socket(self.layout.socket_path()))
    }

    #[cfg(windows)]
    fn choose_transport(&self) -> ServerResult<ConnectTransport> {
        let port = crate::port::pick_server_port(crate::port::DEFAULT_SERVER_PORT)?;

        Ok(ConnectTransport::Tcp(port))
    }

    /// Run the external upgrade tool, then restart the server so the
    /// upgraded instance comes up clean.
    async fn upgrade_database(&self) -> ServerResult<()> {
        if self.confirmation.confirm() == UpgradeDecision::Cancel {
            info!("Database upgrade declined; the server keeps running with the old schema");
            return Ok(());
        }

        let transport = self.current_transport().await;
        let spec = self.command(&self.params.upgrade_cmd(), vec![transport.client_arg()]);
        info!("Upgrade database: {}", spec.describe());

        // Upgrades rewrite every table; no timeout applies here.
        let output = self.runner.run_tool(spec).await;

        if !output.success() {
            return Err(ServerError::ToolFailed {
                context: "Could not upgrade the database.",
                report: output.report(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!("Database upgrade finished, restarting the server");

        self.stop_server_process().await;
        self.start_server_process().await
    }

    /// Wait for the server to accept connections and make sure the
    /// application database exists.
    async fn probe_connection(&self) -> ServerResult<()> {
        let transport = self.current_transport().await;
        let mut guard = self.handle.lock().await;

        let Some(handle) = guard.as_mut() else {
            // Unreachable in the fixed sequence; report rather than panic.
            return Err(ServerError::ServerExited {
                context: "Database process disappeared before the initial connection.",
                report: String::new(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        self.probe.wait_and_prepare(&transport, handle.as_mut()).await
    }

    /// Graceful shutdown through the admin client, hard kill fallback.
    async fn stop_server_process(&self) {
        if let Some(transport) = self.transport.lock().await.clone() {
            let args = vec![
                OsString::from("-u"),
                OsString::from("root"),
                OsString::from("shutdown"),
                transport.client_arg(),
            ];

            let spec = self.command(&self.params.admin_cmd, args);
            debug!("Database shutdown: {}", spec.describe());

            let output = self.runner.run_tool(spec).await;

            if !output.success() {
                warn!("Database shutdown command failed:\n{}", output.report());
            }
        }

        if let Some(mut handle) = self.handle.lock().await.take()
            && handle.wait_exit(SHUTDOWN_WAIT).await.is_none()
        {
            debug!("Database process will be killed now");
            handle.kill().await;
        }
    }

    /// Periodic liveness logging until the state becomes `Stopped`.
    async fn spawn_monitor(&self) {
        let mut state_rx = self.state_rx.clone();

        let task = tokio::spawn(async move {
            let mut running_secs: u64 = 0;
            let mut ticks_to_log: u32 = 0;

            loop {
                if *state_rx.borrow_and_update() == RunState::Stopped {
                    break;
                }

                if ticks_to_log == 0 {
                    debug!("Database server running for {running_secs} seconds");
                    ticks_to_log = MONITOR_LOG_EVERY;
                }

                if let Ok(changed) =
                    tokio::time::timeout(MONITOR_TICK, state_rx.changed()).await
                {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }

                running_secs += MONITOR_TICK.as_secs();
                ticks_to_log -= 1;
            }

            debug!("Shutting down database server monitor");
        });

        *self.monitor.lock().await = Some(task);
    }

    async fn current_transport(&self) -> ConnectTransport {
        self.transport
            .lock()
            .await
            .clone()
            .unwrap_or(ConnectTransport::Socket(self.layout.socket_path()))
    }

    fn command(&self, program: &Path, args: Vec<OsString>) -> CommandSpec {
        CommandSpec::new(program.to_path_buf(), args, self.environment.current())
    }

    fn set_state(&self, state: RunState) {
        let _ = self.state_tx.send(state);
    }
}

fn path_arg(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path);
    arg
}

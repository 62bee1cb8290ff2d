
use crate::lifecycle::DatabaseServer;
use crate::lock::CrossProcessLock;
use crate::probe::ConnectionProbe;
use crate::process::{CommandSpec, ProcessRunner, ServerHandle, ToolOutput};
use crate::transport::ConnectTransport;
use crate::upgrade::{UpgradeConfirmation, UpgradeDecision};
use crate::{ServerError, ServerResult};

use std::collections::VecDeque;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use error_location::ErrorLocation;
use lumina_dbengine::{EngineParameters, EngineType, InheritedEnvironment};

/// Parameters rooted in a test directory, with fabricated engine
/// binaries that only the fake runner ever "executes".
pub(crate) fn params_in(root: &Path) -> EngineParameters {
    EngineParameters {
        engine: EngineType::MysqlInternal,
        root_dir: root.to_path_buf(),
        server_cmd: PathBuf::from("/opt/engine/sbin/mysqld"),
        init_cmd: PathBuf::from("/opt/engine/bin/mysql_install_db"),
        admin_cmd: PathBuf::from("/opt/engine/bin/mysqladmin"),
        default_config: root.join("mysql-global.conf"),
        local_config: None,
    }
}

/// Write the bundled configuration template the reconciler expects.
pub(crate) fn seed_template(root: &Path) {
    std::fs::write(root.join("mysql-global.conf"), "[mysqld]\nkey=value\n").unwrap();
}

pub(crate) fn ok_output() -> ToolOutput {
    ToolOutput {
        exit_code: Some(0),
        ..ToolOutput::default()
    }
}

pub(crate) fn failed_output(stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(1),
        stderr: stderr.to_string(),
        ..ToolOutput::default()
    }
}

pub(crate) fn rendered_args(spec: &CommandSpec) -> Vec<String> {
    spec.args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

/// Records every invoked command; tools succeed unless results are
/// queued, spawned servers stay alive unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeRunner {
    pub tools: Mutex<Vec<CommandSpec>>,
    pub tool_results: Mutex<VecDeque<ToolOutput>>,
    pub spawned: Mutex<Vec<CommandSpec>>,
    pub exits_at_once: AtomicBool,
    pub kills: Arc<AtomicU32>,
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run_tool(&self, spec: CommandSpec) -> ToolOutput {
        self.tools.lock().unwrap().push(spec);

        self.tool_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ok_output)
    }

    async fn spawn_server(&self, spec: CommandSpec) -> ServerResult<Box<dyn ServerHandle>> {
        self.spawned.lock().unwrap().push(spec);

        Ok(Box::new(FakeHandle {
            alive: !self.exits_at_once.load(Ordering::SeqCst),
            kills: Arc::clone(&self.kills),
        }))
    }
}

pub(crate) struct FakeHandle {
    alive: bool,
    kills: Arc<AtomicU32>,
}

impl FakeHandle {
    pub(crate) fn alive() -> Self {
        Self {
            alive: true,
            kills: Arc::default(),
        }
    }

    pub(crate) fn exited() -> Self {
        Self {
            alive: false,
            kills: Arc::default(),
        }
    }
}

#[async_trait]
impl ServerHandle for FakeHandle {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn wait_exit(&mut self, _timeout: Duration) -> Option<ToolOutput> {
        if self.alive {
            None
        } else {
            Some(failed_output("server terminated"))
        }
    }

    async fn kill(&mut self) -> ToolOutput {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.alive = false;

        failed_output("killed")
    }
}

/// Probe that never opens a real connection.
#[derive(Default)]
pub(crate) struct FakeProbe {
    pub fail: AtomicBool,
    pub seen: Mutex<Vec<ConnectTransport>>,
}

#[async_trait]
impl ConnectionProbe for FakeProbe {
    async fn wait_and_prepare(
        &self,
        transport: &ConnectTransport,
        _handle: &mut dyn ServerHandle,
    ) -> ServerResult<()> {
        self.seen.lock().unwrap().push(transport.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(ServerError::ConnectTimeout {
                seconds: 1,
                last_error: String::from("connection refused"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }
}

pub(crate) struct FakePrompt {
    decision: UpgradeDecision,
    pub asked: AtomicU32,
}

impl FakePrompt {
    pub(crate) fn new(decision: UpgradeDecision) -> Self {
        Self {
            decision,
            asked: AtomicU32::new(0),
        }
    }
}

impl UpgradeConfirmation for FakePrompt {
    fn confirm(&self) -> UpgradeDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

/// Counting lock for facade tests.
pub(crate) struct FakeLock {
    pub acquired: Arc<AtomicU32>,
    pub released: Arc<AtomicU32>,
    pub fail_acquire: bool,
}

impl FakeLock {
    pub(crate) fn new() -> Self {
        Self {
            acquired: Arc::new(AtomicU32::new(0)),
            released: Arc::new(AtomicU32::new(0)),
            fail_acquire: false,
        }
    }
}

impl CrossProcessLock for FakeLock {
    fn acquire(&mut self) -> ServerResult<()> {
        if self.fail_acquire {
            return Err(ServerError::LockAcquisition {
                path: PathBuf::from("/nowhere/lumina-dbserver.lock"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct Harness {
    pub server: Arc<DatabaseServer>,
    pub runner: Arc<FakeRunner>,
    pub probe: Arc<FakeProbe>,
    pub prompt: Arc<FakePrompt>,
}

pub(crate) fn harness(params: EngineParameters, decision: UpgradeDecision) -> Harness {
    let runner = Arc::new(FakeRunner::default());
    let probe = Arc::new(FakeProbe::default());
    let prompt = Arc::new(FakePrompt::new(decision));

    let server = Arc::new(DatabaseServer::with_components(
        params,
        Arc::clone(&runner) as Arc<dyn ProcessRunner>,
        Arc::clone(&probe) as Arc<dyn ConnectionProbe>,
        Arc::clone(&prompt) as Arc<dyn UpgradeConfirmation>,
        Arc::new(InheritedEnvironment),
    ));

    Harness {
        server,
        runner,
        probe,
        prompt,
    }
}

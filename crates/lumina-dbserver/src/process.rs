//! Subprocess management behind a testable seam.
//!
//! The supervisor invokes three kinds of external programs: short
//! tools that run to completion (initializer, admin shutdown, upgrade
//! utility) and the long-running server daemon itself. Both go through
//! [`ProcessRunner`] so lifecycle logic can be exercised against fakes.

use crate::{ServerError, ServerResult};

use std::collections::HashMap;
use std::ffi::OsString;
use std::panic::Location;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use error_location::ErrorLocation;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::warn;

/// A fully resolved command line: program, arguments, and the already
/// adjusted environment the engine binaries run with.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: PathBuf, args: Vec<OsString>, env: HashMap<String, String>) -> Self {
        Self { program, args, env }
    }

    /// One-line rendering for logging.
    pub fn describe(&self) -> String {
        format!("{} {}", self.program.display(), join_args(&self.args, " "))
    }
}

/// Everything observed about a finished (or failed-to-launch) process,
/// surfaced verbatim in error reports.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub program: String,
    pub args: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub launch_error: Option<String>,
}

impl ToolOutput {
    fn for_spec(spec: &CommandSpec) -> Self {
        Self {
            program: spec.program.display().to_string(),
            args: join_args(&spec.args, ", "),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.launch_error.is_none() && self.exit_code == Some(0)
    }

    /// Multi-line failure report embedded in user-displayable errors.
    pub fn report(&self) -> String {
        format!(
            "Executable: {}\nArguments: {}\nStdout: {}\nStderr: {}\nExit code: {}\nProcess error: {}",
            self.program,
            self.args,
            self.stdout.trim_end(),
            self.stderr.trim_end(),
            self.exit_code
                .map_or_else(|| String::from("none"), |code| code.to_string()),
            self.launch_error.as_deref().unwrap_or("none"),
        )
    }
}

/// Launches the engine's external programs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a tool to completion, capturing its output. Launch failures
    /// are reported through [`ToolOutput::launch_error`] rather than an
    /// error, so callers have one place to inspect the outcome.
    async fn run_tool(&self, spec: CommandSpec) -> ToolOutput;

    /// Spawn the long-running server daemon.
    async fn spawn_server(&self, spec: CommandSpec) -> ServerResult<Box<dyn ServerHandle>>;
}

/// Owned handle to the spawned server daemon.
#[async_trait]
pub trait ServerHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Wait up to `timeout` for the process to exit. Returns the
    /// captured output once it has exited, `None` while still alive.
    async fn wait_exit(&mut self, timeout: Duration) -> Option<ToolOutput>;

    /// Force-kill the process and reap it, returning captured output.
    async fn kill(&mut self) -> ToolOutput;
}

/// Production runner on top of `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run_tool(&self, spec: CommandSpec) -> ToolOutput {
        let mut output = ToolOutput::for_spec(&spec);

        let result = Command::new(&spec.program)
            .args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(raw) => {
                output.stdout = String::from_utf8_lossy(&raw.stdout).into_owned();
                output.stderr = String::from_utf8_lossy(&raw.stderr).into_owned();
                output.exit_code = raw.status.code();
            }
            Err(err) => {
                output.launch_error = Some(err.to_string());
            }
        }

        output
    }

    async fn spawn_server(&self, spec: CommandSpec) -> ServerResult<Box<dyn ServerHandle>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ServerError::SpawnFailed {
                program: spec.program.clone(),
                source: err,
                location: ErrorLocation::from(Location::caller()),
            })?;

        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));

        if let Some(pipe) = child.stdout.take() {
            tokio::spawn(pump(pipe, Arc::clone(&stdout)));
        }

        if let Some(pipe) = child.stderr.take() {
            tokio::spawn(pump(pipe, Arc::clone(&stderr)));
        }

        Ok(Box::new(TokioServerHandle {
            program: spec.program.display().to_string(),
            args: join_args(&spec.args, ", "),
            child,
            stdout,
            stderr,
            exit: None,
        }))
    }
}

struct TokioServerHandle {
    program: String,
    args: String,
    child: Child,
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
    /// `Some(code)` once the process has been reaped.
    exit: Option<Option<i32>>,
}

impl TokioServerHandle {
    async fn output(&self) -> ToolOutput {
        ToolOutput {
            program: self.program.clone(),
            args: self.args.clone(),
            stdout: self.stdout.lock().await.clone(),
            stderr: self.stderr.lock().await.clone(),
            exit_code: self.exit.flatten(),
            launch_error: None,
        }
    }
}

#[async_trait]
impl ServerHandle for TokioServerHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait_exit(&mut self, timeout: Duration) -> Option<ToolOutput> {
        if self.exit.is_none() {
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(Ok(status)) => self.exit = Some(status.code()),
                Ok(Err(err)) => {
                    warn!("Failed waiting on the database server process: {err}");
                    self.exit = Some(None);
                }
                Err(_) => return None,
            }
        }

        Some(self.output().await)
    }

    async fn kill(&mut self) -> ToolOutput {
        if self.exit.is_none() {
            if let Err(err) = self.child.start_kill() {
                warn!("Failed to kill the database server process: {err}");
            }

            match self.child.wait().await {
                Ok(status) => self.exit = Some(status.code()),
                Err(err) => {
                    warn!("Failed to reap the database server process: {err}");
                    self.exit = Some(None);
                }
            }
        }

        self.output().await
    }
}

async fn pump(mut pipe: impl AsyncRead + Send + Unpin, buffer: Arc<Mutex<String>>) {
    let mut chunk = [0u8; 4096];

    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                let text = String::from_utf8_lossy(&chunk[..read]).into_owned();
                buffer.lock().await.push_str(&text);
            }
        }
    }
}

fn join_args(args: &[OsString], separator: &str) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Lifecycle state of the managed database server process.
///
/// A supervisor goes through exactly one start/stop cycle: `Started`
/// on construction, then either `Running` (startup succeeded) or
/// `NotRunning` (startup failed), and finally `Stopped` once the
/// process has been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Supervisor constructed; startup not attempted or in progress.
    Started,
    /// Server is reachable and the application database exists.
    Running,
    /// Startup failed.
    NotRunning,
    /// Server process has been torn down after a stop request.
    Stopped,
}

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Connection transport between the server process and its clients.
///
/// Chosen once when the server is launched and reused for the
/// connection probe, the upgrade tool, and the shutdown command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTransport {
    /// Unix domain socket inside the misc-artifacts directory.
    Socket(PathBuf),
    /// Local TCP port, used where Unix sockets are unavailable.
    Tcp(u16),
}

impl ConnectTransport {
    /// Arguments appended to the server daemon command line.
    pub fn server_args(&self) -> Vec<OsString> {
        match self {
            Self::Socket(path) => {
                let mut arg = OsString::from("--socket=");
                arg.push(path);
                vec![arg]
            }
            Self::Tcp(port) => vec![
                OsString::from("--skip-networking=0"),
                OsString::from(format!("--port={port}")),
            ],
        }
    }

    /// Argument passed to the admin and upgrade client tools.
    pub fn client_arg(&self) -> OsString {
        match self {
            Self::Socket(path) => {
                let mut arg = OsString::from("--socket=");
                arg.push(path);
                arg
            }
            Self::Tcp(port) => OsString::from(format!("--port={port}")),
        }
    }
}

impl fmt::Display for ConnectTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(path) => write!(f, "socket {}", path.display()),
            Self::Tcp(port) => write!(f, "port {port}"),
        }
    }
}

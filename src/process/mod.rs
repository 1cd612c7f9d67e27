//! Process self-identification for the announce payload.
//!
//! The host agent needs to bind a monitoring session to exactly this process,
//! even when the instrumented process runs in its own PID namespace and the
//! id it sees for itself is not the id the host sees.
//!
//! # Sources
//!
//! | Field        | Preferred source                    | Fallback                  |
//! |--------------|-------------------------------------|---------------------------|
//! | `pid`        | `/proc/<pid>/sched` header          | `std::process::id()`      |
//! | `name, args` | `/proc/<pid>/cmdline`               | `std::env::args()`        |
//! | `fd, inode`  | socket to the agent + `/proc/<pid>/fd` | omitted                |
//!
//! Socket correlation opens a TCP connection to the candidate host and reports
//! its descriptor number and the `socket:[inode]` link. The host agent checks
//! the inode against its own view of the process table. The connection must
//! stay open until the announce exchange completes, so [`ProcessIdentity`]
//! owns it.
//!
//! Introspection is best effort: every failure leaves fields at their fallback
//! values, and a panic on the blocking task is caught and logged.

mod procfs;

pub use procfs::ProcFs;

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kernel-exposed metadata about the current process.
pub trait ProcessMetadata: Send + Sync {
    /// Whether the metadata source exists at all
    fn available(&self) -> bool;

    /// Process id as seen from outside any PID namespace
    fn alternate_process_id(&self) -> Option<u32>;

    /// Program name and arguments as recorded by the kernel
    fn alternate_command_line(&self) -> Option<(String, Vec<String>)>;

    /// Link target of descriptor `fd`, e.g. `socket:[12345]`
    fn descriptor_link(&self, fd: i32) -> Option<String>;
}

/// Self-description submitted to the host agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    /// Process id
    pub pid: u32,

    /// Program name
    pub name: String,

    /// Program arguments, without the program name
    pub args: Vec<String>,

    /// Descriptor number of the correlation socket
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fd: Option<String>,

    /// Link target of the correlation socket descriptor
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inode: Option<String>,
}

impl DiscoveryInfo {
    /// Identity from runtime-reported values only
    pub fn from_runtime() -> Self {
        let (name, args) = runtime_command_line();
        Self {
            pid: std::process::id(),
            name,
            args,
            fd: None,
            inode: None,
        }
    }
}

/// Discovery info plus the socket it refers to.
#[derive(Debug)]
pub struct ProcessIdentity {
    /// Payload for the announce exchange
    pub info: DiscoveryInfo,
    socket: Option<TcpStream>,
}

impl ProcessIdentity {
    /// Whether a correlation socket is held open
    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }
}

struct Correlation {
    stream: TcpStream,
    fd: Option<String>,
    inode: Option<String>,
}

/// Assembles [`ProcessIdentity`] for each announce attempt.
#[derive(Clone)]
pub struct IdentityBuilder {
    metadata: Arc<dyn ProcessMetadata>,
    port: u16,
    connect_timeout: Duration,
}

impl IdentityBuilder {
    /// Builder correlating sockets against `port` on the candidate host
    pub fn new(metadata: Arc<dyn ProcessMetadata>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            metadata,
            port,
            connect_timeout,
        }
    }

    /// Build a fresh identity for an announce to `host`.
    ///
    /// Runs on the blocking pool. Never fails: kernel values and socket
    /// correlation are collected in separate steps, and a panic in either
    /// leaves only that step's fields at their fallback values.
    pub async fn build(&self, host: &str) -> ProcessIdentity {
        let builder = self.clone();
        let mut info = match tokio::task::spawn_blocking(move || builder.identify()).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("process introspection failed: {e}");
                DiscoveryInfo::from_runtime()
            },
        };

        let builder = self.clone();
        let host = host.to_string();
        let socket = match tokio::task::spawn_blocking(move || builder.correlate(&host)).await {
            Ok(Some(correlation)) => {
                info.fd = correlation.fd;
                info.inode = correlation.inode;
                Some(correlation.stream)
            },
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("socket correlation failed: {e}");
                None
            },
        };

        ProcessIdentity { info, socket }
    }

    fn identify(&self) -> DiscoveryInfo {
        let pid = self
            .metadata
            .alternate_process_id()
            .unwrap_or_else(std::process::id);

        let (name, args) = match self.metadata.alternate_command_line() {
            Some((name, args)) => {
                tracing::debug!("got cmdline from proc: {} {:?}", name, args);
                (name, args)
            },
            None => {
                tracing::debug!("no proc cmdline, using runtime-reported arguments");
                runtime_command_line()
            },
        };

        DiscoveryInfo {
            pid,
            name,
            args,
            fd: None,
            inode: None,
        }
    }

    fn correlate(&self, host: &str) -> Option<Correlation> {
        if !self.metadata.available() {
            return None;
        }
        let stream = self.connect(host)?;
        let (fd, inode) = match raw_fd(&stream) {
            Some(fd) => (Some(fd.to_string()), self.metadata.descriptor_link(fd)),
            None => (None, None),
        };

        Some(Correlation { stream, fd, inode })
    }

    fn connect(&self, host: &str) -> Option<TcpStream> {
        let addr = (host, self.port).to_socket_addrs().ok()?.next()?;
        match TcpStream::connect_timeout(&addr, self.connect_timeout) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::debug!("correlation connect to {} failed: {}", addr, e);
                None
            },
        }
    }
}

#[cfg(unix)]
fn raw_fd(stream: &TcpStream) -> Option<i32> {
    use std::os::fd::AsRawFd;
    Some(stream.as_raw_fd())
}

#[cfg(not(unix))]
fn raw_fd(_stream: &TcpStream) -> Option<i32> {
    None
}

fn runtime_command_line() -> (String, Vec<String>) {
    let mut args = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
    let name = args.next().unwrap_or_default();
    (name, args.collect())
}

//! `/proc` backed process metadata.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use super::ProcessMetadata;
use crate::error::{DiscoveryError, Result};

lazy_static! {
    /// First line of `/proc/<pid>/sched`: `app (31337, #threads: 4)`
    static ref SCHED_PID_REGEX: Option<Regex> = Regex::new(r"\((\d+),").ok();
}

/// Process metadata read from a proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    pid: u32,
}

impl ProcFs {
    /// Metadata for the current process under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::for_pid(root, std::process::id())
    }

    /// Metadata for `pid` under `root`
    pub fn for_pid(root: impl Into<PathBuf>, pid: u32) -> Self {
        Self {
            root: root.into(),
            pid,
        }
    }

    /// Root directory of the proc filesystem
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn process_dir(&self) -> PathBuf {
        self.root.join(self.pid.to_string())
    }

    /// Host-visible pid from the `sched` header
    pub fn sched_pid(&self) -> Result<u32> {
        let path = self.process_dir().join("sched");
        let content = std::fs::read_to_string(&path).map_err(|e| {
            DiscoveryError::Introspection(format!("Failed to read {}: {e}", path.display()))
        })?;

        content.lines().next().and_then(parse_sched_pid).ok_or_else(|| {
            DiscoveryError::Introspection(format!("No pid in {} header", path.display()))
        })
    }

    /// Program name and arguments from `cmdline`
    pub fn command_line(&self) -> Result<(String, Vec<String>)> {
        let path = self.process_dir().join("cmdline");
        let raw = std::fs::read(&path).map_err(|e| {
            DiscoveryError::Introspection(format!("Failed to read {}: {e}", path.display()))
        })?;

        parse_cmdline(&raw).ok_or_else(|| {
            DiscoveryError::Introspection(format!("Empty command line in {}", path.display()))
        })
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessMetadata for ProcFs {
    fn available(&self) -> bool {
        self.root.is_dir()
    }

    fn alternate_process_id(&self) -> Option<u32> {
        self.sched_pid()
            .map_err(|e| tracing::debug!("{e}"))
            .ok()
    }

    fn alternate_command_line(&self) -> Option<(String, Vec<String>)> {
        self.command_line()
            .map_err(|e| tracing::debug!("{e}"))
            .ok()
    }

    fn descriptor_link(&self, fd: i32) -> Option<String> {
        let link = self.process_dir().join("fd").join(fd.to_string());
        std::fs::read_link(link)
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    }
}

/// Extract the host-visible pid from the sched header line.
pub(crate) fn parse_sched_pid(line: &str) -> Option<u32> {
    SCHED_PID_REGEX
        .as_ref()?
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Split a NUL-separated cmdline into program name and arguments.
pub(crate) fn parse_cmdline(raw: &[u8]) -> Option<(String, Vec<String>)> {
    let text = String::from_utf8_lossy(raw);
    let mut parts = text.trim_end_matches('\0').split('\0').map(str::to_string);

    let name = parts.next().filter(|n| !n.is_empty())?;
    Some((name, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sched_pid() {
        assert_eq!(parse_sched_pid("app (31337, #threads: 4)"), Some(31337));
        assert_eq!(
            parse_sched_pid("my app (with parens) (12, #threads: 1)"),
            Some(12)
        );
        assert_eq!(parse_sched_pid("no pid here"), None);
        assert_eq!(parse_sched_pid(""), None);
    }

    #[test]
    fn test_parse_cmdline() {
        let (name, args) = parse_cmdline(b"/usr/bin/app\0--port\08080\0").unwrap();
        assert_eq!(name, "/usr/bin/app");
        assert_eq!(args, vec!["--port", "8080"]);

        let (name, args) = parse_cmdline(b"app").unwrap();
        assert_eq!(name, "app");
        assert!(args.is_empty());

        assert!(parse_cmdline(b"").is_none());
        assert!(parse_cmdline(b"\0").is_none());
    }

    fn fixture(pid: u32) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(pid.to_string());
        std::fs::create_dir_all(dir.join("fd")).unwrap();
        std::fs::write(dir.join("sched"), "app (4711, #threads: 3)\n-------\nse.exec_start : 1\n").unwrap();
        std::fs::write(dir.join("cmdline"), b"/srv/app\0--verbose\0").unwrap();
        root
    }

    #[test]
    fn test_procfs_fixture() {
        let root = fixture(99);
        let proc_fs = ProcFs::for_pid(root.path(), 99);

        assert!(proc_fs.available());
        assert_eq!(proc_fs.alternate_process_id(), Some(4711));
        assert_eq!(
            proc_fs.alternate_command_line(),
            Some(("/srv/app".to_string(), vec!["--verbose".to_string()]))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_descriptor_link() {
        let root = fixture(99);
        let fd_dir = root.path().join("99").join("fd");
        std::os::unix::fs::symlink("socket:[12345]", fd_dir.join("7")).unwrap();

        let proc_fs = ProcFs::for_pid(root.path(), 99);
        assert_eq!(proc_fs.descriptor_link(7).as_deref(), Some("socket:[12345]"));
        assert_eq!(proc_fs.descriptor_link(8), None);
    }

    #[test]
    fn test_missing_proc_root() {
        let proc_fs = ProcFs::for_pid("/nonexistent/proc", 1);
        assert!(!proc_fs.available());
        assert_eq!(proc_fs.alternate_process_id(), None);
        assert_eq!(proc_fs.alternate_command_line(), None);
        assert!(matches!(
            proc_fs.sched_pid(),
            Err(DiscoveryError::Introspection(_))
        ));
    }

    #[test]
    fn test_malformed_sched_header() {
        let root = fixture(99);
        std::fs::write(root.path().join("99").join("sched"), "garbage\n").unwrap();
        std::fs::write(root.path().join("99").join("cmdline"), b"").unwrap();

        let proc_fs = ProcFs::for_pid(root.path(), 99);
        assert!(matches!(
            proc_fs.sched_pid(),
            Err(DiscoveryError::Introspection(_))
        ));
        assert!(matches!(
            proc_fs.command_line(),
            Err(DiscoveryError::Introspection(_))
        ));
        assert_eq!(proc_fs.alternate_process_id(), None);
    }
}

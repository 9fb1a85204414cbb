//! External codec programs: discovery, bounded execution, scratch files.
//!
//! Every program is located through an injected [`ToolConfig`] instead of the
//! ambient environment, so tests can point adapters at stand-in tools.

use std::{
    ffi::{OsStr, OsString},
    fmt::Write as _,
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{ChildStdin, Command, ExitStatus, Stdio},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use crate::CodecError;

mod codec;
pub mod scratch;

pub use codec::{DecodeSink, EncodeSource, ProcessCodec, ToolProfile};

/// Environment variable overriding the default wait (seconds, `0` disables it).
pub const TIMEOUT_ENV: &str = "ROUNDTRIP_TOOL_TIMEOUT_SECS";

/// Wait applied to each spawned process unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Time left to collect output from a child that exited near its deadline.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Where and how long external programs run.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use roundtrip_codec::process::ToolConfig;
///
/// let cfg = ToolConfig::default()
///     .with_search_path(["/opt/libwebp/bin"])
///     .with_timeout(Some(Duration::from_secs(30)));
/// assert_eq!(cfg.search_path.len(), 1);
/// assert_eq!(cfg.timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolConfig {
    /// Directories searched for bare program names, in order.
    pub search_path: Vec<PathBuf>,
    /// Upper bound on each process; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Directory for temporary artifacts; the system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            search_path: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            scratch_dir: None,
        }
    }
}

impl ToolConfig {
    /// Search `PATH`; honour [`TIMEOUT_ENV`].
    pub fn from_env() -> Self {
        let search_path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        let timeout = match std::env::var(TIMEOUT_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    log::warn!("ignoring {TIMEOUT_ENV}={raw:?}: not a number of seconds");
                    Some(DEFAULT_TIMEOUT)
                }
            },
            Err(_) => Some(DEFAULT_TIMEOUT),
        };
        Self {
            search_path,
            timeout,
            scratch_dir: None,
        }
    }

    pub fn with_search_path<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_path = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Locate `program` on this configuration's search path.
    pub fn resolve(&self, program: impl AsRef<Path>) -> Option<PathBuf> {
        resolve_program(program.as_ref(), &self.search_path)
    }
}

/// Locate an executable. Names containing a path separator are checked as
/// given; bare names are looked up in `search_path`.
pub fn resolve_program(program: &Path, search_path: &[PathBuf]) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }
    search_path
        .iter()
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// A single program run: command line plus optional stdin payload.
///
/// # Example
/// ```rust
/// use roundtrip_codec::process::Invocation;
///
/// let inv = Invocation::new("cwebp").args(["-quiet", "-q", "80"]).arg("in.png");
/// assert_eq!(inv.display(), "cwebp -quiet -q 80 in.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    /// Command line as a single string for logs and errors.
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            let _ = write!(out, " {}", arg.to_string_lossy());
        }
        out
    }
}

/// Captured result of a successful run.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `invocation` to completion, killing it once the configured timeout
/// elapses. Non-zero exit maps to [`CodecError::Backend`].
///
/// Pipe threads are detached rather than joined, so a descendant that keeps
/// stdout or stderr open cannot hold the caller past the deadline.
pub fn run(invocation: &Invocation, config: &ToolConfig) -> Result<ProcessOutput, CodecError> {
    let command = invocation.display();
    log::debug!("spawning `{command}`");

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CodecError::io(&invocation.program, e))?;

    let started = Instant::now();
    let deadline = config.timeout.map(|limit| started + limit);
    let fed = feed(child.stdin.take(), invocation.stdin.clone());
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_bounded(&mut child, config.timeout, started) {
        Wait::Exited(status) => status,
        Wait::TimedOut(after) => {
            log::warn!("killed `{command}` after {after:?}");
            return Err(CodecError::Timeout { command, after });
        }
        Wait::Failed(e) => return Err(CodecError::io(&invocation.program, e)),
    };
    let pending = Pending {
        command: &command,
        program: &invocation.program,
        started,
        deadline: deadline.map(|at| at.max(Instant::now() + DRAIN_GRACE)),
    };
    let stderr = pending.collect(&stderr, "stderr")?;
    let stdout = pending.collect(&stdout, "stdout")?;
    let fed = pending.collect(&fed, "stdin")?;
    log::debug!(
        "`{command}` finished with {status} in {:?}",
        started.elapsed()
    );

    if !status.success() {
        return Err(CodecError::Backend {
            command,
            status: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    fed.map_err(|e| CodecError::io(&invocation.program, e))?;

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

/// Output threads of an exited child, awaited no later than the deadline.
struct Pending<'a> {
    command: &'a str,
    program: &'a Path,
    started: Instant,
    deadline: Option<Instant>,
}

impl Pending<'_> {
    fn collect<T>(&self, rx: &mpsc::Receiver<T>, what: &str) -> Result<T, CodecError> {
        let received = match self.deadline {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
        };
        received.map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => {
                log::warn!("`{}` exited but its {what} stayed open", self.command);
                CodecError::Timeout {
                    command: self.command.to_string(),
                    after: self.started.elapsed(),
                }
            }
            mpsc::RecvTimeoutError::Disconnected => CodecError::io(
                self.program,
                std::io::Error::other(format!("{what} thread panicked")),
            ),
        })
    }
}

fn feed(pipe: Option<ChildStdin>, bytes: Option<Vec<u8>>) -> mpsc::Receiver<std::io::Result<()>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = match (pipe, bytes) {
            (Some(mut pipe), Some(bytes)) => match pipe.write_all(&bytes) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            },
            _ => Ok(()),
        };
        let _ = tx.send(result);
    });
    rx
}

enum Wait {
    Exited(ExitStatus),
    TimedOut(Duration),
    Failed(std::io::Error),
}

fn wait_bounded(
    child: &mut std::process::Child,
    timeout: Option<Duration>,
    started: Instant,
) -> Wait {
    let Some(limit) = timeout else {
        return match child.wait() {
            Ok(status) => Wait::Exited(status),
            Err(e) => Wait::Failed(e),
        };
    };
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Wait::Exited(status),
            Ok(None) => {}
            Err(e) => return Wait::Failed(e),
        }
        let elapsed = started.elapsed();
        if elapsed >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Wait::TimedOut(elapsed);
        }
        thread::sleep(POLL_INTERVAL.min(limit - elapsed));
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buf)
        {
            log::warn!("failed to read child output: {e}");
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Shell stand-ins for codec programs.
#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::{
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
    };

    pub(crate) fn write_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let _ = env_logger::builder().is_test(true).try_init();
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

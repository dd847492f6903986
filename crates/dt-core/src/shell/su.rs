//! Elevated shell backed by a `su`-style binary.
//!
//! The binary must accept `-c <command>` for one-shot use, print a banner
//! for its version flag, and read a script from stdin when started with no
//! arguments. `/system/bin/sh` satisfies the same contract, which is how the
//! integration tests drive this type without root.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, trace, warn};

use dt_config::ShellSettings;

use super::{
    should_report, BatchOutcome, ShellError, ShellExecutor, ShellOutput,
    DEFAULT_MAX_OUTPUT_BYTES,
};

/// Grace period between SIGTERM and SIGKILL for one-shot commands.
const SIGTERM_GRACE_MS: u64 = 200;

/// Raw result of one subprocess run.
#[derive(Debug, Clone)]
struct RawRun {
    stdout: Vec<u8>,
    exit_code: Option<i32>,
    timed_out: bool,
}

enum BatchMessage {
    Progress(usize),
    Finished(Option<i32>),
}

/// Elevated shell using an external binary.
#[derive(Debug, Clone)]
pub struct SuShell {
    binary: String,
    version_flag: String,
    command_timeout: Duration,
    max_output: usize,
}

impl SuShell {
    pub fn new(binary: impl Into<String>) -> Self {
        SuShellBuilder::new().binary(binary).build()
    }

    pub fn from_settings(settings: &ShellSettings) -> Self {
        SuShellBuilder::new()
            .binary(settings.binary.clone())
            .version_flag(settings.version_flag.clone())
            .command_timeout(Duration::from_millis(settings.command_timeout_ms))
            .build()
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        // Stable, parseable output from coreutils/toybox.
        command.env("LC_ALL", "C");
        command.env("LANG", "C");
        command
    }

    /// Run the binary with `args`, capturing stdout under a deadline.
    #[instrument(level = "trace", skip(self), fields(binary = %self.binary))]
    fn run(&self, args: &[&str]) -> Result<RawRun, ShellError> {
        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        self.capture_with_timeout(&mut child)
    }

    fn capture_with_timeout(&self, child: &mut Child) -> Result<RawRun, ShellError> {
        let deadline = Instant::now() + self.command_timeout;
        let mut stdout_buf = Vec::new();
        let mut stdout = child.stdout.take();
        let mut chunk = vec![0u8; 8192];

        loop {
            if Instant::now() >= deadline {
                warn!(timeout = ?self.command_timeout, "one-shot command timed out");
                kill_with_grace(child);
                let exit_code = child.wait().ok().and_then(|s| s.code());
                return Ok(RawRun {
                    stdout: stdout_buf,
                    exit_code,
                    timed_out: true,
                });
            }

            let mut did_read = false;
            if let Some(ref mut out) = stdout {
                if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        let space = self.max_output.saturating_sub(stdout_buf.len());
                        stdout_buf.extend_from_slice(&chunk[..n.min(space)]);
                    }
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut out) = stdout {
                        drain_available(out, &mut stdout_buf, self.max_output);
                    }
                    trace!(exit_code = ?status.code(), "command exited");
                    return Ok(RawRun {
                        stdout: stdout_buf,
                        exit_code: status.code(),
                        timed_out: false,
                    });
                }
                Ok(None) => {
                    if !did_read {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    return Err(ShellError::Io(e));
                }
            }
        }
    }
}

impl ShellExecutor for SuShell {
    fn exec(&self, command: &str) -> ShellOutput {
        match self.run(&["-c", command]) {
            Ok(raw) => ShellOutput {
                success: raw.exit_code == Some(0) && !raw.timed_out,
                stdout: Some(String::from_utf8_lossy(&raw.stdout).into_owned()),
            },
            Err(e) => {
                debug!(error = %e, "shell exec failed");
                ShellOutput::failed()
            }
        }
    }

    fn version_banner(&self) -> Option<String> {
        let raw = self.run(&[self.version_flag.as_str()]).ok()?;
        let text = String::from_utf8_lossy(&raw.stdout).trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    #[instrument(skip(self, commands, on_progress), fields(binary = %self.binary, total = commands.len()))]
    fn exec_batch(
        &self,
        commands: &[String],
        timeout: Duration,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> BatchOutcome {
        let total = commands.len();
        if total == 0 {
            return BatchOutcome::Empty;
        }

        let deadline = Instant::now() + timeout;

        let mut child = match self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn batch shell");
                return BatchOutcome::SpawnFailed {
                    reason: e.to_string(),
                };
            }
        };

        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.kill();
            return BatchOutcome::SpawnFailed {
                reason: "stdin not captured".to_string(),
            };
        };

        let (tx, rx) = mpsc::channel();
        let script = commands.to_vec();

        // The writer owns the child. On timeout it is detached, not joined.
        let spawned = thread::Builder::new()
            .name("dt-batch-writer".to_string())
            .spawn(move || {
                for (index, line) in script.iter().enumerate() {
                    if writeln!(stdin, "{line}").is_err() {
                        debug!(index, "batch shell closed stdin early");
                        break;
                    }
                    if should_report(index, total) {
                        let _ = tx.send(BatchMessage::Progress(index));
                    }
                }
                let _ = stdin.write_all(b"exit\n");
                let _ = stdin.flush();
                drop(stdin);
                let code = child.wait().ok().and_then(|s| s.code());
                let _ = tx.send(BatchMessage::Finished(code));
            });

        if let Err(e) = spawned {
            return BatchOutcome::SpawnFailed {
                reason: e.to_string(),
            };
        }

        let mut last_reported = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(?timeout, ?last_reported, "batch deadline passed");
                return BatchOutcome::TimedOut { last_reported };
            }

            match rx.recv_timeout(remaining) {
                Ok(BatchMessage::Progress(index)) => {
                    last_reported = Some(index);
                    on_progress(index, total);
                }
                Ok(BatchMessage::Finished(exit_code)) => {
                    debug!(?exit_code, "batch shell exited");
                    return BatchOutcome::Completed { exit_code };
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(?timeout, ?last_reported, "batch deadline passed");
                    return BatchOutcome::TimedOut { last_reported };
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return BatchOutcome::Completed { exit_code: None };
                }
            }
        }
    }
}

/// Builder for [`SuShell`].
#[derive(Debug)]
pub struct SuShellBuilder {
    binary: String,
    version_flag: String,
    command_timeout: Duration,
    max_output: usize,
}

impl Default for SuShellBuilder {
    fn default() -> Self {
        let defaults = ShellSettings::default();
        Self {
            binary: defaults.binary,
            version_flag: defaults.version_flag,
            command_timeout: Duration::from_millis(defaults.command_timeout_ms),
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl SuShellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn version_flag(mut self, flag: impl Into<String>) -> Self {
        self.version_flag = flag.into();
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn max_output(mut self, max_bytes: usize) -> Self {
        self.max_output = max_bytes;
        self
    }

    pub fn build(self) -> SuShell {
        SuShell {
            binary: self.binary,
            version_flag: self.version_flag,
            command_timeout: self.command_timeout,
            max_output: self.max_output,
        }
    }
}

/// SIGTERM, then SIGKILL if the process outlives the grace period.
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // SAFETY: pid belongs to a child we spawned and have not reaped yet.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));
    if let Ok(None) = child.try_wait() {
        warn!(pid, "command ignored SIGTERM, sending SIGKILL");
        let _ = child.kill();
    }
}

fn drain_available<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) {
    let mut chunk = vec![0u8; 8192];
    while let Ok(n) = try_read_nonblocking(stream, &mut chunk) {
        if n == 0 {
            break;
        }
        let space = max.saturating_sub(buf.len());
        if space == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n.min(space)]);
    }
}

/// Read without blocking. `Ok(0)` means nothing is available right now.
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is a valid descriptor owned by `stream` for this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        // SAFETY: as above.
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        // SAFETY: restores the flags read above.
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

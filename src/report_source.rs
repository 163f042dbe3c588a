//! Producers of [`BackupReport`]s, by running the `kopia` (and `zfs`) binaries

use crate::kopia::{BackupReport, parse_reports};
use eyre::{Result, WrapErr as _, eyre};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of backup reports, separated from the metrics so they can be fed canned records
pub trait ReportSource {
    /// Latest snapshot of every source known to the repository
    ///
    /// # Errors
    ///
    /// Returns an error if the reports cannot be obtained or decoded
    fn list_latest(&self) -> Result<Vec<BackupReport>>;

    /// Creates a snapshot of `path`, returning its report
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot fails or its report cannot be decoded
    fn create_snapshot(&self, path: &Path, override_source: Option<&str>) -> Result<BackupReport>;
}

/// [`ReportSource`] running the `kopia` binary with `--json` output
#[derive(Clone, Debug)]
pub struct KopiaCommand {
    kopia_bin: String,
    config_file: Option<PathBuf>,
    timeout: Duration,
}
impl KopiaCommand {
    /// Timeout used unless [`Self::with_timeout`] is called
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Runs `kopia_bin` (a path, or a name looked up in `PATH`)
    #[must_use]
    pub fn new(kopia_bin: impl Into<String>) -> Self {
        Self {
            kopia_bin: kopia_bin.into(),
            config_file: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Passes `--config-file` to every invocation
    #[must_use]
    pub fn with_config_file(mut self, config_file: Option<PathBuf>) -> Self {
        self.config_file = config_file;
        self
    }

    /// Kills invocations running longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, mut args: Vec<OsString>, trailing: Option<&Path>) -> Result<Vec<BackupReport>> {
        if let Some(config_file) = &self.config_file {
            args.push("--config-file".into());
            args.push(config_file.into());
        }
        if let Some(trailing) = trailing {
            args.push(trailing.into());
        }
        let stdout = run_command(&self.kopia_bin, &args, self.timeout)?;
        decode_reports(&stdout)
    }
}
impl ReportSource for KopiaCommand {
    fn list_latest(&self) -> Result<Vec<BackupReport>> {
        let args = ["snapshot", "list", "-n", "1", "--json"]
            .map(OsString::from)
            .to_vec();
        self.run(args, None)
    }

    fn create_snapshot(&self, path: &Path, override_source: Option<&str>) -> Result<BackupReport> {
        let mut args = ["snapshot", "create", "--json"].map(OsString::from).to_vec();
        if let Some(override_source) = override_source {
            args.push("--override-source".into());
            args.push(override_source.into());
        }
        self.run(args, Some(path))?
            .pop()
            .ok_or_else(|| eyre!("kopia snapshot create printed no snapshot"))
    }
}

fn decode_reports(stdout: &[u8]) -> Result<Vec<BackupReport>> {
    let output = std::str::from_utf8(stdout).wrap_err("kopia output is not valid UTF-8")?;
    parse_reports(output).map_err(|e| {
        tracing::error!(%output, "failed to decode kopia JSON output");
        eyre::Report::new(e).wrap_err("failed to decode kopia JSON output")
    })
}

/// Wraps a `kopia` invocation in a temporary `zfs` snapshot
#[derive(Clone, Debug)]
pub struct ZfsCommand {
    zfs_bin: String,
    timeout: Duration,
}
impl ZfsCommand {
    /// Runs `zfs_bin` (a path, or a name looked up in `PATH`)
    #[must_use]
    pub fn new(zfs_bin: impl Into<String>) -> Self {
        Self {
            zfs_bin: zfs_bin.into(),
            timeout: KopiaCommand::DEFAULT_TIMEOUT,
        }
    }

    /// Kills invocations running longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `zfs snapshot <name>`, then `body`, then `zfs destroy <name>`
    ///
    /// The snapshot is destroyed even when `body` fails.
    ///
    /// # Errors
    ///
    /// Returns the error of `body`, or else an error if either `zfs` command fails
    pub fn with_snapshot<T>(&self, name: &str, body: impl FnOnce() -> Result<T>) -> Result<T> {
        run_command(&self.zfs_bin, &["snapshot", name], self.timeout)
            .wrap_err_with(|| format!("failed to create zfs snapshot {name:?}"))?;

        let result = body();

        let destroyed = run_command(&self.zfs_bin, &["destroy", name], self.timeout)
            .wrap_err_with(|| format!("failed to destroy zfs snapshot {name:?}"));

        match (result, destroyed) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(destroy_err)) => {
                tracing::error!("{destroy_err:?}");
                Err(e)
            }
        }
    }
}

/// Executes `bin` with `args`, returning its stdout.
///
/// # Errors
///
/// Returns an error if:
/// - The command fails to execute
/// - The command returns a non-zero exit code
/// - The command execution exceeds the specified timeout
fn run_command(bin: &str, args: &[impl AsRef<OsStr>], timeout: Duration) -> Result<Vec<u8>> {
    use std::io::Read;
    use std::process::{Command, Stdio};
    use std::sync::mpsc;
    use std::time::Instant;

    let command_line = std::iter::once(bin.to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!("Running command: {command_line}");

    let mut child = Command::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .wrap_err_with(|| format!("failed to execute {bin:?}"))?;

    // Take ownership of stdout and stderr pipes
    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| eyre!("Failed to capture stdout"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| eyre!("Failed to capture stderr"))?;

    // Drain both pipes on threads, so a chatty child never blocks on a full pipe
    let read_all = |mut pipe: Box<dyn Read + Send>| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            let _ = tx.send(buffer);
        });
        rx
    };
    let stdout_rx = read_all(Box::new(stdout_pipe));
    let stderr_rx = read_all(Box::new(stderr_pipe));

    let start = Instant::now();
    let poll_interval = Duration::from_millis(50);

    // Poll the child process until it completes or timeout is reached
    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = stdout_rx
                .recv()
                .map_err(|_| eyre!("Failed to receive stdout from thread"))?;
            let stderr = stderr_rx
                .recv()
                .map_err(|_| eyre!("Failed to receive stderr from thread"))?;

            if !status.success() {
                let stderr = String::from_utf8_lossy(&stderr);
                return Err(eyre!(
                    "{command_line:?} failed with exit code: {}\nstderr: {}",
                    status.code().unwrap_or(-1),
                    stderr
                ));
            }
            return Ok(stdout);
        }

        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();

            let seconds = timeout.as_secs_f64();
            let stdout = stdout_rx.recv().unwrap_or_default();
            let Ok(stderr) = stderr_rx.recv() else {
                return Err(eyre!(
                    "{command_line:?} timeout after {seconds} seconds\n<stderr is unknown>",
                ));
            };
            let stdout = String::from_utf8_lossy(&stdout);
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(eyre!(
                "{command_line:?} timeout after {seconds} seconds\nstdout: {stdout}\nstderr: {stderr}",
            ));
        }
        std::thread::sleep(poll_interval);
    }
}

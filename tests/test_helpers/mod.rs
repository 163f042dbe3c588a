//! Common helper functions for integration tests.

use eyre::Result;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const KOPIA_METRICS_BIN: &str = env!("CARGO_BIN_EXE_kopia-metrics");

/// Configuration for starting a `serve` process.
pub struct ServerConfig {
    command: Command,
    port: u16,
    capture_stderr: bool,
}

impl ServerConfig {
    /// Create a basic server configuration on a free port.
    pub fn new(fake_kopia_bin: &str) -> Result<Self> {
        Self::with_port(fake_kopia_bin, get_free_port()?)
    }

    /// Create a server configuration on the given port.
    pub fn with_port(fake_kopia_bin: &str, port: u16) -> Result<Self> {
        let mut command = Command::new(KOPIA_METRICS_BIN);
        command
            .args(["--kopia-bin", fake_kopia_bin, "serve", "--port"])
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        Ok(Self {
            command,
            port,
            capture_stderr: false,
        })
    }

    /// Enable stderr capture for this server.
    pub fn with_stderr_capture(mut self) -> Self {
        self.capture_stderr = true;
        self
    }

    /// Add additional command line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.command.args(args);
        self
    }

    /// Add environment variables.
    pub fn with_env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<std::ffi::OsStr>,
        V: AsRef<std::ffi::OsStr>,
    {
        self.command.env(key, val);
        self
    }
}

/// Helper for managing `serve` processes.
pub struct TestServer {
    process: Option<Child>,
    port: u16,
}

impl TestServer {
    /// Start a new test server with the given configuration.
    pub fn start(mut config: ServerConfig) -> Result<Self> {
        if config.capture_stderr {
            config.command.stderr(Stdio::piped());
        }

        let process = config.command.spawn()?;

        // Wait for server to start
        thread::sleep(Duration::from_millis(500));

        Ok(Self {
            process: Some(process),
            port: config.port,
        })
    }

    /// Kill the server and return its stderr output.
    ///
    /// Returns empty string if stderr wasn't captured.
    #[track_caller]
    pub fn kill_and_read_stderr(mut self) -> String {
        let mut process = self.process.take().expect("process running");
        let _ = process.kill();
        let output = process.wait_with_output().expect("process output");
        String::from_utf8_lossy(&output.stderr).to_string()
    }

    /// Make an HTTP GET request to the server.
    pub fn get(&self, path: &str) -> Result<minreq::Response> {
        let url = format!("http://127.0.0.1:{}{}", self.port, path);
        Ok(minreq::get(&url).send()?)
    }

    /// Polls `/metrics` until it contains `line`, returning the full body.
    ///
    /// The first poll may still be running when the endpoint comes up.
    pub fn wait_for_metrics_line(&self, line: &str) -> Result<String> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let body = self.get("/metrics")?.as_str()?.to_string();
            if body.lines().any(|l| l == line) || Instant::now() >= deadline {
                return Ok(body);
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(ref mut process) = self.process {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

/// Runs `kopia-metrics` to completion with the given arguments and environment.
pub fn run_kopia_metrics<'a>(
    args: &[&str],
    envs: impl IntoIterator<Item = (&'a str, &'a std::ffi::OsStr)>,
) -> Result<Output> {
    Ok(Command::new(KOPIA_METRICS_BIN)
        .args(args)
        .envs(envs)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?)
}

/// Get a random available port from the OS for testing.
pub fn get_free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Generate a unique log file path for testing.
///
/// # Panics
/// Panics if creating the temporary directory fails
pub fn get_test_log_path(suffix: &str) -> (tempfile::TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("test failed to create TempDir");
    let path = temp_dir.path().join(format!("fake-{suffix}.log"));
    (temp_dir, path)
}

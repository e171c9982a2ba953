//! # tapflow-adapter-adb
//!
//! Device adapter that drives an Android emulator through the `adb`
//! executable.
//!
//! ## How it works
//!
//! | Operation | Command | Notes |
//! |-----------|---------|-------|
//! | connect | `adb connect <ip>:<port>` | success only if the output says `connected to` |
//! | capture | `adb [-s id] exec-out screencap -p` | PNG on stdout, decoded to grayscale |
//! | tap | `adb [-s id] shell input tap <x> <y>` | spawned, never awaited |
//!
//! ## Dependency rule
//!
//! Depends on `tapflow-app` (port traits) and `tapflow-domain` only.

mod command;
mod error;

pub use error::AdbError;

use std::ffi::OsStr;
use std::future::Future;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use tapflow_app::frame::Frame;
use tapflow_app::ports::DeviceControl;
use tapflow_domain::error::TapflowError;
use tapflow_domain::geometry::Point;
use tapflow_domain::scenario::DeviceSettings;

/// Upper bound on a single `connect` or `screencap` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// An emulator reachable through `adb`.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: PathBuf,
    connect_addr: String,
    serial: Option<String>,
    command_timeout: Duration,
}

impl AdbDevice {
    #[must_use]
    pub fn new(settings: &DeviceSettings) -> Self {
        Self {
            adb_path: PathBuf::from(&settings.adb_path),
            connect_addr: settings.connect_addr(),
            serial: settings.device_id.clone(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Run `adb connect` against the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`AdbError::Connect`] when adb does not report a connection,
    /// or a launch/timeout error when adb itself could not run.
    #[tracing::instrument(skip(self), fields(addr = %self.connect_addr))]
    pub async fn connect(&self) -> Result<(), AdbError> {
        let output = self.run(&command::connect(&self.connect_addr)).await?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if command::is_connected(&text) {
            tracing::info!("adb connected");
            Ok(())
        } else {
            Err(AdbError::Connect {
                addr: self.connect_addr.clone(),
                output: text.trim().to_string(),
            })
        }
    }

    async fn capture(&self) -> Result<Frame, AdbError> {
        let args = command::screencap(self.serial.as_deref());
        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                command: args.join(" "),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(AdbError::EmptyCapture);
        }
        Frame::decode(&output.stdout).map_err(AdbError::Decode)
    }

    /// Start `input tap` and return without waiting for it.
    fn spawn_tap(&self, point: Point) -> Result<(), AdbError> {
        let args = command::tap(self.serial.as_deref(), point);
        tracing::debug!(%point, "spawning adb tap");
        self.command(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| self.spawn_error(source))
    }

    async fn run(&self, args: &[String]) -> Result<Output, AdbError> {
        let mut command = self.command(args);
        command.kill_on_drop(true);
        match tokio::time::timeout(self.command_timeout, command.output()).await {
            Ok(result) => result.map_err(|source| self.spawn_error(source)),
            Err(_) => Err(AdbError::TimedOut {
                command: args.join(" "),
                timeout: self.command_timeout,
            }),
        }
    }

    fn command<I: AsRef<OsStr>>(&self, args: &[I]) -> Command {
        let mut command = Command::new(&self.adb_path);
        command.args(args).stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> AdbError {
        AdbError::Spawn {
            program: self.adb_path.display().to_string(),
            source,
        }
    }
}

impl DeviceControl for AdbDevice {
    fn capture_screen(&self) -> impl Future<Output = Result<Frame, TapflowError>> + Send {
        async move { self.capture().await.map_err(AdbError::into_domain) }
    }

    fn tap(&self, point: Point) -> impl Future<Output = Result<(), TapflowError>> + Send {
        let spawned = self.spawn_tap(point).map_err(AdbError::into_domain);
        async move { spawned }
    }
}

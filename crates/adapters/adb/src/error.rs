//! adb adapter error types.

use std::process::ExitStatus;
use std::time::Duration;

use tapflow_domain::error::TapflowError;

/// Errors specific to the adb adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    /// The adb executable could not be started.
    #[error("failed to launch `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An adb invocation did not finish in time.
    #[error("`adb {command}` did not finish within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// An adb invocation exited unsuccessfully.
    #[error("`adb {command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// `adb connect` ran but did not report a connection.
    #[error("adb could not connect to {addr}: {output}")]
    Connect { addr: String, output: String },

    /// `screencap` produced no bytes.
    #[error("screen capture returned no data")]
    EmptyCapture,

    /// The captured bytes are not a decodable image.
    #[error("failed to decode screen capture")]
    Decode(#[source] image::ImageError),
}

impl AdbError {
    /// Convert into a [`TapflowError::Device`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> TapflowError {
        TapflowError::Device(Box::new(self))
    }
}

impl From<AdbError> for TapflowError {
    fn from(err: AdbError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_connect_error_with_output() {
        let err = AdbError::Connect {
            addr: "127.0.0.1:16384".to_string(),
            output: "cannot connect to 127.0.0.1:16384".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "adb could not connect to 127.0.0.1:16384: cannot connect to 127.0.0.1:16384"
        );
    }

    #[test]
    fn should_convert_into_device_error() {
        let err: TapflowError = AdbError::EmptyCapture.into();
        assert!(matches!(err, TapflowError::Device(_)));
    }

    #[test]
    fn should_keep_source_of_spawn_error() {
        let err = AdbError::Spawn {
            program: "adb".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}

//! Error types for wifictl

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WifiCtlError {
    /// Unrecoverable radio failure; the caller must abort
    #[error("Fatal radio error: {0}")]
    Fatal(String),
    /// Invalid caller input
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Driver refused a configuration, prior configuration still in effect
    #[error("Configuration rejected: {0}")]
    ConfigRejected(String),
    /// Generic driver failure
    #[error("Driver error: {0}")]
    Driver(String),
    /// Command execution failed
    #[error("Command '{cmd}' failed{}: {stderr}", code_suffix(.code))]
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },
    /// Raw frame capture/injection failure
    #[error("Capture error: {0}")]
    Capture(String),
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with code {}", c)).unwrap_or_default()
}

impl WifiCtlError {
    /// Whether the error belongs to the unrecoverable class
    pub fn is_fatal(&self) -> bool {
        matches!(self, WifiCtlError::Fatal(_))
    }
}

impl From<serde_json::Error> for WifiCtlError {
    fn from(error: serde_json::Error) -> Self {
        WifiCtlError::Driver(format!("Malformed tool output: {}", error))
    }
}

pub type WifiCtlResult<T> = Result<T, WifiCtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(WifiCtlError::Fatal("radio down".to_string()).is_fatal());
        assert!(!WifiCtlError::InvalidParameter("channel".to_string()).is_fatal());
        assert!(!WifiCtlError::ConfigRejected("ap".to_string()).is_fatal());
    }

    #[test]
    fn test_command_failed_display() {
        let err = WifiCtlError::CommandFailed {
            cmd: "iw dev wlan0 set channel 6".to_string(),
            code: Some(1),
            stderr: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Command 'iw dev wlan0 set channel 6' failed with code 1: busy");

        let err = WifiCtlError::CommandFailed {
            cmd: "iw".to_string(),
            code: None,
            stderr: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Command 'iw' failed: not found");
    }
}

//! Error taxonomy and process exit codes.
//!
//! Only the session loop decides fatal policy; everything below it returns
//! typed errors and lets the caller choose between counting, degrading, and
//! exiting.

use thiserror::Error;

/// Configuration failures. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config field {field} out of range: got {value}, expected {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Process exit codes surfaced by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    BadConfig = 2,
    UdpBindFailure = 3,
    SidecarUnavailable = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_match_contract() {
        assert_eq!(ExitCode::Ok.code(), 0);
        assert_eq!(ExitCode::BadConfig.code(), 2);
        assert_eq!(ExitCode::UdpBindFailure.code(), 3);
        assert_eq!(ExitCode::SidecarUnavailable.code(), 4);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::OutOfRange {
            field: "expo",
            value: "1.5".into(),
            expected: "0.0..=1.0",
        };
        let msg = err.to_string();
        assert!(msg.contains("expo"));
        assert!(msg.contains("1.5"));
    }
}

use std::io;
use std::time;

use thiserror::Error;

/// Exit status used when the configuration cannot be turned into a launch plan (`EX_CONFIG`).
pub const EXIT_INVALID_CONFIGURATION: i32 = 78;
/// Exit status used when the dependency never became ready in time (`EX_UNAVAILABLE`).
pub const EXIT_DEPENDENCY_TIMEOUT: i32 = 69;
/// Exit status used when the preparation command did not succeed (`EX_SOFTWARE`).
pub const EXIT_PREPARATION_FAILED: i32 = 70;
/// Exit status used when the target program does not exist, same as a shell.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;
/// Exit status used when the target program exists but cannot be executed, same as a shell.
pub const EXIT_COMMAND_NOT_EXECUTABLE: i32 = 126;

/// Enumeration of fatal errors that end a launch without handing off.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("dependency {endpoint} was not ready after {elapsed:?} ({attempts} attempts)")]
    DependencyTimeout {
        endpoint: String,
        attempts: u32,
        elapsed: time::Duration,
    },
    #[error("preparation command `{command}` failed: {reason}")]
    PreparationFailed { command: String, reason: String },
    #[error("failed to hand off to `{command}`: {error}")]
    HandoffFailed { command: String, error: io::Error },
    #[error("interrupted by signal {0} before handing off")]
    Interrupted(i32),
}

impl LaunchError {
    /// The process exit status the launcher reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::InvalidConfiguration(_) => EXIT_INVALID_CONFIGURATION,
            LaunchError::DependencyTimeout { .. } => EXIT_DEPENDENCY_TIMEOUT,
            LaunchError::PreparationFailed { .. } => EXIT_PREPARATION_FAILED,
            LaunchError::HandoffFailed { error, .. } => match error.kind() {
                io::ErrorKind::NotFound => EXIT_COMMAND_NOT_FOUND,
                _ => EXIT_COMMAND_NOT_EXECUTABLE,
            },
            LaunchError::Interrupted(signal) => 128 + signal,
        }
    }
}

/// Enumeration of reasons a single readiness probe attempt did not succeed.
/// All but `Rejected` are transient: the wait loop logs them and tries again.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("connection failed with: {0}")]
    Connection(sqlx::Error),
    #[error("server rejected the connection: {0}")]
    Rejected(sqlx::Error),
    #[error("readiness query failed with: {0}")]
    Query(sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("probe command exited with {0}")]
    Status(std::process::ExitStatus),
    #[error("probe timed out after {0:?}")]
    TimedOut(time::Duration),
}

impl ProbeError {
    /// Whether retrying cannot help. The dependency answered, but refuses our settings.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_non_zero() {
        let errors = [
            LaunchError::InvalidConfiguration("empty".to_owned()),
            LaunchError::DependencyTimeout {
                endpoint: "db:5432".to_owned(),
                attempts: 3,
                elapsed: time::Duration::from_secs(3),
            },
            LaunchError::PreparationFailed {
                command: "alembic upgrade head".to_owned(),
                reason: "exit status: 1".to_owned(),
            },
            LaunchError::HandoffFailed {
                command: "nope".to_owned(),
                error: io::Error::from(io::ErrorKind::NotFound),
            },
            LaunchError::HandoffFailed {
                command: "/etc/passwd".to_owned(),
                error: io::Error::from(io::ErrorKind::PermissionDenied),
            },
            LaunchError::Interrupted(15),
        ];

        let codes: Vec<i32> = errors.iter().map(LaunchError::exit_code).collect();
        assert_eq!(codes, vec![78, 69, 70, 127, 126, 143]);
    }
}

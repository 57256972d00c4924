use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::Command;

use crate::error::LaunchError;

/// The application command the launcher turns into, exactly as it was given to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCommand {
    argv: Vec<OsString>,
}

impl TargetCommand {
    pub fn new(argv: Vec<OsString>) -> Result<Self, LaunchError> {
        match argv.first() {
            Some(program) if !program.is_empty() => Ok(Self { argv }),
            _ => Err(LaunchError::InvalidConfiguration(
                "a target command is required, e.g. `launcher -- uvicorn main:app`".to_owned(),
            )),
        }
    }

    /// Build from the launcher's own arguments (program name excluded). A single leading
    /// `--` separator is dropped; anything after it is passed through untouched.
    pub fn from_args<I>(args: I) -> Result<Self, LaunchError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut argv: Vec<OsString> = args.into_iter().collect();
        if argv.first().is_some_and(|first| first == "--") {
            argv.remove(0);
        }
        Self::new(argv)
    }

    pub fn program(&self) -> &OsStr {
        &self.argv[0]
    }

    pub fn args(&self) -> &[OsString] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }
}

impl fmt::Display for TargetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argv: Vec<_> = self.argv.iter().map(|arg| arg.to_string_lossy()).collect();
        write!(f, "{}", argv.join(" "))
    }
}

/// The final, one-way transfer of control to the target command.
pub trait Handoff: Send + Sync {
    /// Hand the process over to `target`. Implementations that really replace the process
    /// never return on success.
    fn handoff(&self, target: &TargetCommand) -> Result<(), LaunchError>;
}

/// Replaces the current process image with the target command. The working directory,
/// environment and standard streams are inherited, and the new program keeps our pid.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecHandoff;

impl Handoff for ExecHandoff {
    #[cfg(unix)]
    fn handoff(&self, target: &TargetCommand) -> Result<(), LaunchError> {
        use std::os::unix::process::CommandExt;

        // exec only returns when it failed.
        let error = Command::new(target.program()).args(target.args()).exec();

        Err(LaunchError::HandoffFailed {
            command: target.to_string(),
            error,
        })
    }

    /// Without exec, run the target as a child sharing our streams and exit with its status.
    /// Console control events reach the whole process group, so the child sees them directly.
    #[cfg(not(unix))]
    fn handoff(&self, target: &TargetCommand) -> Result<(), LaunchError> {
        let status = Command::new(target.program())
            .args(target.args())
            .status()
            .map_err(|error| LaunchError::HandoffFailed {
                command: target.to_string(),
                error,
            })?;

        std::process::exit(status.code().unwrap_or(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_empty_target_is_invalid() {
        assert!(matches!(
            TargetCommand::from_args(os_args(&[])),
            Err(LaunchError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            TargetCommand::from_args(os_args(&["--"])),
            Err(LaunchError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            TargetCommand::from_args(os_args(&[""])),
            Err(LaunchError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_arguments_are_preserved() {
        let target =
            TargetCommand::from_args(os_args(&["--", "uvicorn", "main:app", "--", "--port=8000"]))
                .unwrap();

        assert_eq!(target.program(), "uvicorn");
        assert_eq!(target.args(), os_args(&["main:app", "--", "--port=8000"]).as_slice());
        assert_eq!(target.to_string(), "uvicorn main:app -- --port=8000");
    }

    #[test]
    fn test_only_one_separator_is_dropped() {
        let target = TargetCommand::from_args(os_args(&["--", "--", "echo"])).unwrap();
        assert_eq!(target.argv(), os_args(&["--", "echo"]).as_slice());
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_of_missing_program_fails() {
        let target = TargetCommand::new(os_args(&["/definitely/not/an/app"])).unwrap();

        let error = ExecHandoff
            .handoff(&target)
            .expect_err("exec of a missing program must return");
        assert!(matches!(error, LaunchError::HandoffFailed { .. }));
        assert_eq!(error.exit_code(), 127);
    }
}

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::LaunchError;

/// The setup step (schema migrations, typically) that runs once the dependency is ready.
#[async_trait]
pub trait Preparer: Send + Sync {
    async fn prepare(&self) -> Result<(), LaunchError>;
}

/// `None` stands for "nothing configured", which is only acceptable when preparation is skipped.
#[async_trait]
impl<T: Preparer> Preparer for Option<T> {
    async fn prepare(&self) -> Result<(), LaunchError> {
        match self {
            Some(preparer) => preparer.prepare().await,
            None => Err(LaunchError::InvalidConfiguration(
                "no preparation command configured".to_owned(),
            )),
        }
    }
}

/// Runs an external preparation tool to completion, with its output passed through.
#[derive(Debug, Clone)]
pub struct CommandPreparer {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl CommandPreparer {
    pub fn new(command: Vec<String>, workdir: Option<PathBuf>) -> Result<Self, LaunchError> {
        let mut argv = command.into_iter();
        let program = argv.next().filter(|program| !program.is_empty()).ok_or_else(|| {
            LaunchError::InvalidConfiguration("preparation command must not be empty".to_owned())
        })?;

        Ok(Self {
            program,
            args: argv.collect(),
            workdir,
        })
    }

    /// The command line as it would be typed in a shell, for logs and errors.
    pub fn command_line(&self) -> String {
        let mut command = vec![self.program.as_str()];
        command.extend(self.args.iter().map(String::as_str));
        command.join(" ")
    }

    fn failed(&self, reason: String) -> LaunchError {
        LaunchError::PreparationFailed {
            command: self.command_line(),
            reason,
        }
    }
}

#[async_trait]
impl Preparer for CommandPreparer {
    async fn prepare(&self) -> Result<(), LaunchError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            // Migrations must not outlive a launcher that was told to stop.
            .kill_on_drop(true);
        if let Some(ref workdir) = self.workdir {
            command.current_dir(workdir);
        }

        info!("running preparation command `{}`", self.command_line());

        let status = command
            .status()
            .await
            .map_err(|error| self.failed(format!("could not be started: {}", error)))?;

        if status.success() {
            Ok(())
        } else {
            Err(self.failed(status.to_string()))
        }
    }
}

//! Readiness probes: the checks the launcher repeats until its dependency accepts connections.
//!
//! Three kinds are supported, selected with `PROBE_MODE`:
//! - postgres: open a real connection and run `SELECT 1`
//! - tcp: open a TCP connection to the dependency port
//! - command: run an external tool such as `pg_isready` and look at its exit status
//!
//! A probe attempt answers ready or not-ready. Errors are transient from the launcher's point
//! of view, except a PostgreSQL server refusing our credentials or database, which no amount of
//! waiting fixes. Per-attempt timeouts are applied by the caller.
use std::process::Stdio;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::endpoint::DependencyEndpoint;
use crate::error::{LaunchError, ProbeError};

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Run one probe attempt. `Ok(())` means the dependency is ready.
    async fn probe(&self) -> Result<(), ProbeError>;

    /// A short human readable description of what is being probed, for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: ReadinessProbe + ?Sized> ReadinessProbe for Box<T> {
    async fn probe(&self) -> Result<(), ProbeError> {
        (**self).probe().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// Mode names, used by config/environment parsing to verify the mode is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Postgres,
    Tcp,
    Command,
}

impl FromStr for ProbeMode {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(ProbeMode::Postgres),
            "tcp" => Ok(ProbeMode::Tcp),
            "command" | "exec" => Ok(ProbeMode::Command),
            invalid => Err(LaunchError::InvalidConfiguration(format!(
                "{} is not a valid probe mode",
                invalid
            ))),
        }
    }
}

/// Build the probe for `mode`. `command` is only used in `ProbeMode::Command`.
pub fn build_probe(
    mode: ProbeMode,
    endpoint: &DependencyEndpoint,
    command: &[String],
) -> Result<Box<dyn ReadinessProbe>, LaunchError> {
    let probe: Box<dyn ReadinessProbe> = match mode {
        ProbeMode::Postgres => Box::new(PostgresProbe::new(endpoint.clone())),
        ProbeMode::Tcp => Box::new(TcpProbe::new(endpoint.clone())),
        ProbeMode::Command => Box::new(CommandProbe::new(command.to_vec(), endpoint.clone())?),
    };

    Ok(probe)
}

/// Connects to PostgreSQL and runs a trivial query.
pub struct PostgresProbe {
    endpoint: DependencyEndpoint,
}

impl PostgresProbe {
    pub fn new(endpoint: DependencyEndpoint) -> Self {
        Self { endpoint }
    }

    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.endpoint.host)
            .port(self.endpoint.port)
            .username(&self.endpoint.user)
            .database(&self.endpoint.database)
            .application_name("launcher");

        match self.endpoint.password {
            Some(ref password) => options.password(password),
            None => options,
        }
    }
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        let mut connection = PgConnection::connect_with(&self.connect_options())
            .await
            .map_err(connection_error)?;

        sqlx::query("SELECT 1")
            .execute(&mut connection)
            .await
            .map_err(ProbeError::Query)?;

        if let Err(error) = connection.close().await {
            tracing::debug!("failed to close probe connection cleanly: {}", error);
        }

        Ok(())
    }

    fn describe(&self) -> String {
        format!("postgres {}", self.endpoint)
    }
}

/// SQLSTATE codes a server answers with when it is up but refuses the login: class 28 (invalid
/// authorization) and 3D000 (unknown database). 57P03, still starting up, is not one of them.
fn is_rejection(code: &str) -> bool {
    code.starts_with("28") || code == "3D000"
}

fn connection_error(error: sqlx::Error) -> ProbeError {
    let rejected = match error {
        sqlx::Error::Database(ref database_error) => {
            database_error.code().is_some_and(|code| is_rejection(&code))
        }
        _ => false,
    };

    if rejected {
        ProbeError::Rejected(error)
    } else {
        ProbeError::Connection(error)
    }
}

/// Attempts a TCP connection to the dependency port.
pub struct TcpProbe {
    endpoint: DependencyEndpoint,
}

impl TcpProbe {
    pub fn new(endpoint: DependencyEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        TcpStream::connect(self.endpoint.address()).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.endpoint.address())
    }
}

/// Runs an external readiness tool. Only its exit status is inspected.
///
/// The endpoint is exported through the libpq environment variables, so tools like
/// `pg_isready` or `psql` need no extra arguments.
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    endpoint: DependencyEndpoint,
}

impl CommandProbe {
    pub fn new(command: Vec<String>, endpoint: DependencyEndpoint) -> Result<Self, LaunchError> {
        let mut argv = command.into_iter();
        let program = argv.next().filter(|program| !program.is_empty()).ok_or_else(|| {
            LaunchError::InvalidConfiguration("probe command must not be empty".to_owned())
        })?;

        Ok(Self {
            program,
            args: argv.collect(),
            endpoint,
        })
    }

    fn libpq_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("PGHOST", self.endpoint.host.clone()),
            ("PGPORT", self.endpoint.port.to_string()),
            ("PGUSER", self.endpoint.user.clone()),
            ("PGDATABASE", self.endpoint.database.clone()),
        ];
        if let Some(ref password) = self.endpoint.password {
            env.push(("PGPASSWORD", password.clone()));
        }
        env
    }
}

#[async_trait]
impl ReadinessProbe for CommandProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .envs(self.libpq_env())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }

    fn describe(&self) -> String {
        let mut command = vec![self.program.as_str()];
        command.extend(self.args.iter().map(String::as_str));
        format!("`{}` against {}", command.join(" "), self.endpoint)
    }
}

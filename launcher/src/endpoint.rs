use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::LaunchError;

/// The service the launcher waits for before doing anything else.
#[derive(Clone, PartialEq, Eq)]
pub struct DependencyEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl DependencyEndpoint {
    pub fn new(
        host: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: &str,
    ) -> Result<Self, LaunchError> {
        if host.is_empty() {
            return Err(LaunchError::InvalidConfiguration(
                "dependency host must not be empty".to_owned(),
            ));
        }
        if port == 0 {
            return Err(LaunchError::InvalidConfiguration(
                "dependency port must not be 0".to_owned(),
            ));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            user: user.to_owned(),
            password: password.map(str::to_owned),
            database: database.to_owned(),
        })
    }

    /// Parse a connection URL such as `postgresql+asyncpg://user:pass@db:5432/db`.
    ///
    /// The scheme is not interpreted, so driver-suffixed schemes used by application
    /// frameworks are accepted as-is. Any part missing from the URL is taken from `fallback`.
    pub fn from_url(raw: &str, fallback: &DependencyEndpoint) -> Result<Self, LaunchError> {
        let url = Url::parse(raw).map_err(|error| {
            LaunchError::InvalidConfiguration(format!("malformed DATABASE_URL: {}", error))
        })?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.trim_start_matches('[').trim_end_matches(']'),
            _ => {
                return Err(LaunchError::InvalidConfiguration(
                    "DATABASE_URL has no host".to_owned(),
                ))
            }
        };

        let user = match url.username() {
            "" => fallback.user.clone(),
            encoded => decode(encoded)?,
        };
        let password = match url.password() {
            Some(encoded) => Some(decode(encoded)?),
            None => fallback.password.clone(),
        };
        let database = match url.path().trim_start_matches('/') {
            "" => fallback.database.clone(),
            encoded => decode(encoded)?,
        };

        Self::new(
            host,
            url.port().unwrap_or(fallback.port),
            &user,
            password.as_deref(),
            &database,
        )
    }

    /// Produce a host:port address for connecting a TcpStream.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn decode(encoded: &str) -> Result<String, LaunchError> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| {
            LaunchError::InvalidConfiguration("DATABASE_URL is not valid UTF-8".to_owned())
        })
}

// Passwords must never reach the logs, so both impls leave them out.
impl fmt::Display for DependencyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for DependencyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

//! PostgreSQL connection descriptor.
//!
//! The descriptor is resolved once by the driver and handed by reference to
//! every export. Each export opens its own connection from it and closes that
//! connection before returning.
//!
//! # Security
//! - The password is held in a `Zeroizing` buffer and cleared on drop
//! - `Debug` and `Display` never render the password

use crate::{Result, error::UnlockError};
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use std::fmt;
use zeroize::Zeroizing;

pub use sqlx::postgres::PgSslMode as SslMode;

/// Application name reported to the server when none is configured.
pub const DEFAULT_APPLICATION_NAME: &str = "unlock-postgres";

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Immutable connection parameters for one snapshot run.
///
/// # Example
/// ```rust
/// use unlock_core::connection::ConnectionDescriptor;
///
/// let descriptor = ConnectionDescriptor::new("db.internal", "monitor")
///     .with_port(5433)
///     .with_password("secret")
///     .with_database("postgres");
///
/// assert!(descriptor.validate().is_ok());
/// assert!(!descriptor.to_string().contains("secret"));
/// ```
#[derive(Clone)]
pub struct ConnectionDescriptor {
    /// Server host name, address, or socket directory
    pub host: String,
    /// Server port
    pub port: u16,
    /// Role used to log in
    pub username: String,
    password: Option<Zeroizing<String>>,
    /// Database name; the server falls back to the role name when unset
    pub database: Option<String>,
    /// `application_name` reported to the server
    pub application_name: String,
    /// TLS negotiation mode
    pub ssl_mode: SslMode,
}

impl ConnectionDescriptor {
    /// Creates a descriptor with the default port, application name, and
    /// TLS disabled.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: None,
            database: None,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            ssl_mode: SslMode::Disable,
        }
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Builder method to set the application name.
    pub fn with_application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = application_name.into();
        self
    }

    /// Builder method to set the TLS mode.
    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// Checks if a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Validates connection parameters.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(UnlockError::configuration("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(UnlockError::configuration("port must be greater than 0"));
        }
        if self.username.trim().is_empty() {
            return Err(UnlockError::configuration("username cannot be empty"));
        }
        if self.database.as_deref().is_some_and(|db| db.trim().is_empty()) {
            return Err(UnlockError::configuration("database name cannot be empty"));
        }
        if self.application_name.trim().is_empty() {
            return Err(UnlockError::configuration(
                "application name cannot be empty",
            ));
        }
        Ok(())
    }

    /// Builds sqlx connect options from the descriptor.
    ///
    /// `DateStyle` is pinned to ISO so temporal values render the same way
    /// regardless of server configuration.
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .application_name(&self.application_name)
            .ssl_mode(self.ssl_mode)
            .options([("DateStyle", "ISO")]);

        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }

        options
    }

    /// Opens a single connection to the server.
    ///
    /// # Errors
    /// Returns `UnlockError::Connection` if the server cannot be reached or
    /// rejects the login.
    pub async fn connect(&self) -> Result<PgConnection> {
        tracing::debug!("Opening connection to {}", self);
        self.connect_options().connect().await.map_err(|e| {
            UnlockError::connection_failed(format!("Unable to connect to {}", self), e)
        })
    }

    /// Connection URL with the password masked, for logs.
    ///
    /// Hosts a URL cannot carry, such as a socket directory, fall back to
    /// the keyword/value form with the same masking.
    pub fn redacted_url(&self) -> String {
        self.masked_url().map_or_else(
            || {
                let password = if self.has_password() { " password=****" } else { "" };
                format!(
                    "host={} port={} user={}{} dbname={} application_name={}",
                    self.host,
                    self.port,
                    self.username,
                    password,
                    self.database.as_deref().unwrap_or(""),
                    self.application_name
                )
            },
            |url| url.to_string(),
        )
    }

    fn masked_url(&self) -> Option<url::Url> {
        if self.host.starts_with('/') {
            return None;
        }
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let mut url = url::Url::parse(&format!("postgres://{}:{}", host, self.port)).ok()?;
        if url.host_str().is_none_or(str::is_empty) {
            return None;
        }
        url.set_username(&self.username).ok()?;
        if self.has_password() {
            url.set_password(Some("****")).ok()?;
        }
        url.set_path(&format!("/{}", self.database.as_deref().unwrap_or("")));
        url.query_pairs_mut()
            .append_pair("application_name", &self.application_name);
        Some(url)
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_url())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .field("application_name", &self.application_name)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

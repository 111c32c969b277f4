//! Per-request connection string assembly.

use std::{fmt, sync::Arc};

use crate::config::{CONNECTION_STRING_BASE_KEY, ConfigProvider, DATABASE_PASSWORD_KEY};
use crate::errors::{Error, Result};

/// Placeholder in the configured template that receives the database password.
pub const PASSWORD_PLACEHOLDER: &str = "{PASSWORD}";

/// A fully resolved connection string. It carries a credential, so `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString(String);

impl ConnectionString {
    pub fn new(resolved: String) -> Self {
        Self(resolved)
    }

    /// The raw string, for handing to the driver only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionString(<redacted>)")
    }
}

/// Builds a [`ConnectionString`] from the configured template and password, looking both up on
/// every call.
#[derive(Clone)]
pub struct ConnectionStringBuilder {
    provider: Arc<dyn ConfigProvider>,
}

impl ConnectionStringBuilder {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        Self { provider }
    }

    pub fn build(&self) -> Result<ConnectionString> {
        let template = self.require(CONNECTION_STRING_BASE_KEY)?;
        let password = self.require(DATABASE_PASSWORD_KEY)?;
        Ok(ConnectionString(template.replace(PASSWORD_PLACEHOLDER, &password)))
    }

    fn require(&self, key: &str) -> Result<String> {
        match self.provider.lookup(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::ConfigurationMissing { key: key.to_string() }),
        }
    }
}

//! Transport configuration.
//!
//! The SMTP endpoint is fixed when a sender is constructed and read-only
//! afterwards. A missing host is accepted here; sends fail later with a
//! configuration error instead.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{MailError, MailResult};

/// Default SMTP port.
pub const DEFAULT_PORT: u16 = 25;

/// Default timeout for connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default name announced in EHLO/HELO.
pub const DEFAULT_HELO_NAME: &str = "localhost";

/// Environment variable holding the SMTP host.
pub const ENV_SMTP_HOST: &str = "MAILSENDER_SMTP_HOST";

/// Environment variable holding the SMTP port.
pub const ENV_SMTP_PORT: &str = "MAILSENDER_SMTP_PORT";

/// Environment variable holding the envelope sender override.
pub const ENV_ENVELOPE_FROM: &str = "MAILSENDER_ENVELOPE_FROM";

/// SMTP endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// SMTP server hostname.
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// SMTP server port.
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    /// Envelope sender used instead of the From address.
    #[serde(default)]
    pub envelope_from_override: Option<String>,
    /// Name announced in EHLO/HELO.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,
    /// Connect timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Command timeout.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_helo_name() -> String {
    DEFAULT_HELO_NAME.to_string()
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: DEFAULT_PORT,
            envelope_from_override: None,
            helo_name: default_helo_name(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Loads the configuration from process environment variables.
    pub fn from_env() -> MailResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from any key/value source.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> MailResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let smtp_port = match get(ENV_SMTP_PORT) {
            Some(port) => parse_port(&port)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            smtp_host: get(ENV_SMTP_HOST),
            smtp_port,
            envelope_from_override: get(ENV_ENVELOPE_FROM),
            ..Self::default()
        })
    }

    /// Returns the configured host, if any.
    pub fn host(&self) -> Option<&str> {
        self.smtp_host.as_deref().filter(|h| !h.is_empty())
    }

    /// Returns the host or the missing-configuration error.
    pub fn require_host(&self) -> MailResult<&str> {
        self.host().ok_or_else(MailError::configuration_missing)
    }

    /// Returns the full server address.
    pub fn address(&self) -> MailResult<String> {
        Ok(format!("{}:{}", self.require_host()?, self.smtp_port))
    }
}

fn parse_port(value: &str) -> MailResult<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(MailError::configuration(format!(
            "smtp port is invalid: '{}'",
            value
        ))),
    }
}

/// Builder for transport configuration.
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    host: Option<String>,
    port: u16,
    envelope_from: Option<String>,
    helo_name: Option<String>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl TransportConfigBuilder {
    /// Sets the SMTP host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the SMTP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the envelope sender override.
    pub fn envelope_from(mut self, address: impl Into<String>) -> Self {
        self.envelope_from = Some(address.into());
        self
    }

    /// Sets the name announced in EHLO/HELO.
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = Some(name.into());
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TransportConfig {
        TransportConfig {
            smtp_host: self.host,
            smtp_port: if self.port == 0 { DEFAULT_PORT } else { self.port },
            envelope_from_override: self.envelope_from,
            helo_name: self.helo_name.unwrap_or_else(default_helo_name),
            connect_timeout: if self.connect_timeout == Duration::ZERO {
                DEFAULT_CONNECT_TIMEOUT
            } else {
                self.connect_timeout
            },
            command_timeout: if self.command_timeout == Duration::ZERO {
                DEFAULT_COMMAND_TIMEOUT
            } else {
                self.command_timeout
            },
        }
    }
}

// Humantime serde support
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

//! SMTP protocol implementation.
//!
//! The subset of RFC 5321 commands and replies needed to submit a single
//! plain text message without authentication.

use std::fmt;

use crate::errors::{MailError, MailResult};

/// SMTP commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// Extended HELLO with client identity.
    Ehlo(String),
    /// Basic HELLO.
    Helo(String),
    /// MAIL FROM command.
    MailFrom {
        /// Sender address, angle brackets included.
        address: String,
        /// SIZE parameter (optional).
        size: Option<usize>,
    },
    /// RCPT TO command.
    RcptTo {
        /// Recipient address, angle brackets included.
        address: String,
    },
    /// DATA command.
    Data,
    /// Reset transaction.
    Rset,
    /// Quit connection.
    Quit,
}

impl SmtpCommand {
    /// Formats the command for sending.
    pub fn to_smtp_string(&self) -> String {
        match self {
            SmtpCommand::Ehlo(domain) => format!("EHLO {}", domain),
            SmtpCommand::Helo(domain) => format!("HELO {}", domain),
            SmtpCommand::MailFrom { address, size } => match size {
                Some(s) => format!("MAIL FROM:{} SIZE={}", address, s),
                None => format!("MAIL FROM:{}", address),
            },
            SmtpCommand::RcptTo { address } => format!("RCPT TO:{}", address),
            SmtpCommand::Data => "DATA".to_string(),
            SmtpCommand::Rset => "RSET".to_string(),
            SmtpCommand::Quit => "QUIT".to_string(),
        }
    }
}

impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_smtp_string())
    }
}

/// SMTP response from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// Status code (e.g., 250, 354, 550).
    pub code: u16,
    /// Response message lines.
    pub message: Vec<String>,
}

impl SmtpResponse {
    /// Creates a new response.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: vec![message.into()],
        }
    }

    /// Parses a response from raw lines.
    pub fn parse(lines: &[String]) -> MailResult<Self> {
        if lines.is_empty() {
            return Err(MailError::delivery("Empty response"));
        }

        let mut messages = Vec::with_capacity(lines.len());
        let mut code = 0u16;

        for (i, line) in lines.iter().enumerate() {
            let parsed_code: u16 = line
                .get(..3)
                .and_then(|c| c.parse().ok())
                .ok_or_else(|| MailError::delivery(format!("Invalid status code: {}", line)))?;

            if i == 0 {
                code = parsed_code;
            } else if parsed_code != code {
                return Err(MailError::delivery(
                    "Inconsistent status codes in multiline response",
                ));
            }

            messages.push(line.get(4..).unwrap_or_default().to_string());
        }

        Ok(Self {
            code,
            message: messages,
        })
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Returns the first message line.
    pub fn first_message(&self) -> &str {
        self.message.first().map(|s| s.as_str()).unwrap_or("")
    }

    /// Converts the reply into a delivery error carrying its code.
    pub fn to_error(&self) -> MailError {
        MailError::delivery(self).with_smtp_code(self.code)
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.first_message())
    }
}

/// ESMTP server capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EsmtpCapabilities {
    /// Maximum message size advertised through SIZE.
    pub size: Option<usize>,
}

impl EsmtpCapabilities {
    /// Parses capabilities from EHLO response.
    ///
    /// The first line is the server greeting and carries no capability.
    pub fn from_ehlo_response(response: &SmtpResponse) -> Self {
        let mut caps = Self::default();

        for line in response.message.iter().skip(1) {
            let line = line.trim().to_uppercase();
            let mut parts = line.splitn(2, ' ');
            let capability = parts.next().unwrap_or_default();
            let params = parts.next().unwrap_or_default();

            if capability == "SIZE" {
                caps.size = params.parse().ok().filter(|s| *s > 0);
            }
        }

        caps
    }
}

/// Response codes for common SMTP operations.
pub mod codes {
    /// Service ready.
    pub const SERVICE_READY: u16 = 220;
    /// Start mail input.
    pub const START_MAIL_INPUT: u16 = 354;
    /// Message too big.
    pub const MESSAGE_TOO_BIG: u16 = 552;
}

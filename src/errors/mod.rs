//! Error types for the mail sender.
//!
//! Every failure reaches the caller as a single [`MailError`] whose display
//! text is the diagnostic message. The [`MailErrorKind`] stays available as a
//! structured code and drives the logging severity.

use std::fmt;
use thiserror::Error;

/// Result type for mail sender operations.
pub type MailResult<T> = Result<T, MailError>;

/// Kinds of failure a send can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailErrorKind {
    // Configuration errors
    /// SMTP host is not configured.
    ConfigurationMissing,
    /// A configuration value could not be interpreted.
    ConfigurationInvalid,

    // Request errors
    /// Request is absent or a field holds a value of the wrong type.
    InvalidRequest,
    /// Mailbox syntax is invalid or the display name cannot be encoded.
    InvalidAddress,

    // Policy errors
    /// More than the permitted number of to/cc/bcc recipients.
    RecipientLimitExceeded,
    /// No to/cc/bcc recipient at all.
    NoRecipients,
    /// No reply-to address.
    MissingReplyTo,
    /// More than the permitted number of reply-to addresses.
    ReplyToLimitExceeded,
    /// From address is absent.
    MissingFrom,
    /// Subject is absent or empty.
    EmptySubject,
    /// Body is absent or empty.
    EmptyBody,

    // Assembly errors
    /// Message could not be assembled from the validated request.
    InvalidMessageContent,

    // Transport errors
    /// Server rejected one or more recipients.
    PartialDeliveryFailure,
    /// Any other failure once the transport is involved.
    DeliveryFailure,
}

impl MailErrorKind {
    /// Returns the severity level of this error kind.
    ///
    /// Everything detected before talking to the SMTP server is a caller
    /// input problem and logged at info; transport failures are warnings.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MailErrorKind::PartialDeliveryFailure | MailErrorKind::DeliveryFailure => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Info,
        }
    }

    /// Returns true if the failure happened at the transport stage.
    pub fn is_transport(&self) -> bool {
        self.severity() == ErrorSeverity::Warning
    }
}

impl fmt::Display for MailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailErrorKind::ConfigurationMissing => write!(f, "Configuration missing"),
            MailErrorKind::ConfigurationInvalid => write!(f, "Invalid configuration"),
            MailErrorKind::InvalidRequest => write!(f, "Invalid request"),
            MailErrorKind::InvalidAddress => write!(f, "Invalid address"),
            MailErrorKind::RecipientLimitExceeded => write!(f, "Recipient limit exceeded"),
            MailErrorKind::NoRecipients => write!(f, "No recipients"),
            MailErrorKind::MissingReplyTo => write!(f, "Missing reply-to"),
            MailErrorKind::ReplyToLimitExceeded => write!(f, "Reply-to limit exceeded"),
            MailErrorKind::MissingFrom => write!(f, "Missing from"),
            MailErrorKind::EmptySubject => write!(f, "Empty subject"),
            MailErrorKind::EmptyBody => write!(f, "Empty body"),
            MailErrorKind::InvalidMessageContent => write!(f, "Invalid message content"),
            MailErrorKind::PartialDeliveryFailure => write!(f, "Partial delivery failure"),
            MailErrorKind::DeliveryFailure => write!(f, "Delivery failure"),
        }
    }
}

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational - rejected input, nothing left the process.
    Info,
    /// Warning - live operational problem after contacting the server.
    Warning,
}

/// Mail sender error with detailed information.
#[derive(Error, Debug)]
pub struct MailError {
    /// Error kind.
    kind: MailErrorKind,
    /// Human-readable message.
    message: String,
    /// SMTP reply code if the server produced one.
    smtp_code: Option<u16>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailError {
    /// Creates a new error.
    pub fn new(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP reply code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> MailErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP reply code if available.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        self.kind.severity()
    }

    // Convenience constructors

    /// Creates the error raised when no SMTP host is configured.
    pub fn configuration_missing() -> Self {
        Self::new(
            MailErrorKind::ConfigurationMissing,
            "smtp host is not specified in configuration.",
        )
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConfigurationInvalid, message)
    }

    /// Creates a request error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidRequest, message)
    }

    /// Creates an error for a request key holding a value of the wrong type.
    pub fn wrong_type(key: &str) -> Self {
        Self::request(format!(
            "Invalid JSON. Object associated with key '{}' does not have required type.",
            key
        ))
    }

    /// Creates an error for a nested value that cannot be cast to `type_name`.
    pub fn cast_failed(type_name: &str) -> Self {
        Self::request(format!(
            "Invalid JSON. Failed to cast an object to required type ({}).",
            type_name
        ))
    }

    /// Creates an address error.
    pub fn address(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidAddress, message)
    }

    /// Creates a policy error of the given kind.
    pub fn policy(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }

    /// Creates a message assembly error.
    pub fn message_content(cause: impl fmt::Display) -> Self {
        Self::new(
            MailErrorKind::InvalidMessageContent,
            format!(
                "Invalid message content/configuration were detected. Cause: [{}]",
                cause
            ),
        )
    }

    /// Creates the error raised when the server rejects some recipients.
    pub fn partial_delivery(cause: impl fmt::Display) -> Self {
        Self::new(
            MailErrorKind::PartialDeliveryFailure,
            format!("Message could not be sent to some recipients. Cause: [{}]", cause),
        )
    }

    /// Creates a generic delivery error.
    pub fn delivery(cause: impl fmt::Display) -> Self {
        Self::new(
            MailErrorKind::DeliveryFailure,
            format!("Failed to send message. Cause: [{}]", cause),
        )
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<serde_json::Error> for MailError {
    fn from(error: serde_json::Error) -> Self {
        MailError::request(format!("Invalid JSON. {}", error)).with_cause(error)
    }
}

impl From<std::io::Error> for MailError {
    fn from(error: std::io::Error) -> Self {
        MailError::delivery(&error).with_cause(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        assert_eq!(MailErrorKind::InvalidAddress.severity(), ErrorSeverity::Info);
        assert_eq!(MailErrorKind::ConfigurationMissing.severity(), ErrorSeverity::Info);
        assert_eq!(MailErrorKind::InvalidMessageContent.severity(), ErrorSeverity::Info);
        assert_eq!(
            MailErrorKind::PartialDeliveryFailure.severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(MailErrorKind::DeliveryFailure.severity(), ErrorSeverity::Warning);
        assert!(MailErrorKind::DeliveryFailure.is_transport());
        assert!(!MailErrorKind::NoRecipients.is_transport());
    }

    #[test]
    fn test_display_is_message_only() {
        let err = MailError::configuration_missing();
        assert_eq!(err.to_string(), "smtp host is not specified in configuration.");
        assert_eq!(err.kind(), MailErrorKind::ConfigurationMissing);
    }

    #[test]
    fn test_wrapped_messages() {
        let err = MailError::wrong_type("to");
        assert_eq!(
            err.message(),
            "Invalid JSON. Object associated with key 'to' does not have required type."
        );

        let err = MailError::partial_delivery("550 no such user").with_smtp_code(550);
        assert_eq!(
            err.to_string(),
            "Message could not be sent to some recipients. Cause: [550 no such user]"
        );
        assert_eq!(err.smtp_code(), Some(550));

        let err = MailError::message_content("bad header");
        assert!(err.message().ends_with("Cause: [bad header]"));
    }

    #[test]
    fn test_io_error_is_delivery_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: MailError = io.into();
        assert_eq!(err.kind(), MailErrorKind::DeliveryFailure);
        assert!(std::error::Error::source(&err).is_some());
    }
}

//! # Mail Sender
//!
//! Composes plain text mail from an untyped JSON request and hands it to a
//! fixed SMTP relay:
//! - Request parsing with typed accessors over `serde_json::Value`
//! - RFC 5322 address validation and RFC 2047 display names
//! - Recipient and Reply-To policy checks
//! - Charset-aware message assembly (ISO-2022-JP by default)
//! - Synchronous SMTP delivery without authentication
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mail_sender::{MailSender, TransportConfig};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TransportConfig::builder()
//!         .host("smtp.example.com")
//!         .port(25)
//!         .build();
//!
//!     let sender = MailSender::new(config)?;
//!
//!     sender.send(&json!({
//!         "to": [{"address": "taro@example.com", "name": "Taro Yamada"}],
//!         "from": {"address": "john@example.com"},
//!         "reply-to": [{"address": "john@example.com"}],
//!         "subject": "Hello",
//!         "text": "This is a test email.",
//!         "charset": "UTF-8"
//!     }))?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Request handling
pub mod policy;
pub mod request;
pub mod resolver;

// Encoding and assembly
pub mod charset;
pub mod message;
pub mod mime;

// Protocol layer
pub mod protocol;

// Transport layer
pub mod transport;

// Observability
pub mod observability;

// Sender
pub mod sender;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use charset::{Charset, CharsetError};
pub use config::{TransportConfig, TransportConfigBuilder};
pub use errors::{ErrorSeverity, MailError, MailErrorKind, MailResult};
pub use message::{MessageDraft, OutboundMessage, RecipientType};
pub use mime::TransferEncoding;
pub use observability::MetricsSnapshot;
pub use protocol::{EsmtpCapabilities, SmtpCommand, SmtpResponse};
pub use sender::MailSender;
pub use transport::{SmtpTransport, Transport};
pub use types::{AddressRecord, AddressSet, Envelope, MailRequest, ResolvedAddress};

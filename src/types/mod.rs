//! Core types for the mail sender.
//!
//! This module provides:
//! - Raw address records as they arrive in a request
//! - Resolved addresses ready for header rendering
//! - The typed send request and the SMTP envelope

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::charset::{Charset, CharsetError};
use crate::mime;

/// Raw address record, `{address, name}`, as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Mailbox address (e.g., "taro@example.com").
    #[serde(default)]
    pub address: Option<String>,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl AddressRecord {
    /// Creates a record with just an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            name: None,
        }
    }

    /// Creates a record with an address and display name.
    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            name: Some(name.into()),
        }
    }
}

/// Display name together with the charset it is rendered in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName {
    /// Name text as supplied.
    pub text: String,
    /// Charset used for encoded-word rendering.
    pub charset: Charset,
}

impl DisplayName {
    /// Renders the name for a header, encoding it if required.
    pub fn render(&self) -> Result<String, CharsetError> {
        mime::encode_display_name(&self.text, self.charset)
    }
}

/// Address that passed mailbox validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    email: String,
    display_name: Option<DisplayName>,
}

impl ResolvedAddress {
    /// Creates a resolved address. Callers are expected to have validated
    /// the mailbox already.
    pub(crate) fn new(email: impl Into<String>, display_name: Option<DisplayName>) -> Self {
        Self {
            email: email.into(),
            display_name,
        }
    }

    /// Returns the mailbox address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name if present.
    pub fn display_name(&self) -> Option<&DisplayName> {
        self.display_name.as_ref()
    }

    /// Returns the domain part of the mailbox.
    pub fn domain(&self) -> &str {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or_default()
    }

    /// Formats the address for email headers.
    pub fn to_header(&self) -> Result<String, CharsetError> {
        match &self.display_name {
            Some(name) => Ok(format!("{} <{}>", name.render()?, self.email)),
            None => Ok(self.email.clone()),
        }
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} <{}>", name.text, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// Typed send request.
///
/// Built either by the request parser from untyped JSON or directly by Rust
/// callers through the chainable setters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailRequest {
    /// To recipients.
    pub to: Option<Vec<AddressRecord>>,
    /// Cc recipients.
    pub cc: Option<Vec<AddressRecord>>,
    /// Bcc recipients.
    pub bcc: Option<Vec<AddressRecord>>,
    /// Reply-To addresses.
    pub reply_to: Option<Vec<AddressRecord>>,
    /// From address.
    pub from: Option<AddressRecord>,
    /// Subject text.
    pub subject: Option<String>,
    /// Plain text body.
    pub text: Option<String>,
    /// Charset label.
    pub charset: Option<String>,
    /// Envelope sender override for this send.
    pub envelope_from: Option<String>,
    /// Custom headers; entries with no value are skipped at assembly.
    pub headers: Option<Vec<(String, Option<String>)>>,
}

impl MailRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a To recipient.
    pub fn to(mut self, record: AddressRecord) -> Self {
        self.to.get_or_insert_with(Vec::new).push(record);
        self
    }

    /// Adds a Cc recipient.
    pub fn cc(mut self, record: AddressRecord) -> Self {
        self.cc.get_or_insert_with(Vec::new).push(record);
        self
    }

    /// Adds a Bcc recipient.
    pub fn bcc(mut self, record: AddressRecord) -> Self {
        self.bcc.get_or_insert_with(Vec::new).push(record);
        self
    }

    /// Adds a Reply-To address.
    pub fn reply_to(mut self, record: AddressRecord) -> Self {
        self.reply_to.get_or_insert_with(Vec::new).push(record);
        self
    }

    /// Sets the From address.
    pub fn from(mut self, record: AddressRecord) -> Self {
        self.from = Some(record);
        self
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the body text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the charset label.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the envelope sender override.
    pub fn envelope_from(mut self, address: impl Into<String>) -> Self {
        self.envelope_from = Some(address.into());
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), Some(value.into())));
        self
    }
}

/// Resolved address lists of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    /// To recipients.
    pub to: Option<Vec<ResolvedAddress>>,
    /// Cc recipients.
    pub cc: Option<Vec<ResolvedAddress>>,
    /// Bcc recipients.
    pub bcc: Option<Vec<ResolvedAddress>>,
    /// Reply-To addresses.
    pub reply_to: Option<Vec<ResolvedAddress>>,
    /// From address.
    pub from: Option<ResolvedAddress>,
}

impl AddressSet {
    /// Total number of To, Cc and Bcc recipients.
    pub fn recipient_count(&self) -> usize {
        [&self.to, &self.cc, &self.bcc]
            .iter()
            .map(|list| list.as_ref().map_or(0, Vec::len))
            .sum()
    }

    /// Number of Reply-To addresses.
    pub fn reply_to_count(&self) -> usize {
        self.reply_to.as_ref().map_or(0, Vec::len)
    }
}

/// SMTP envelope: the sender and recipients used on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// MAIL FROM address.
    pub sender: String,
    /// RCPT TO addresses.
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(sender: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(email: &str, name: Option<&str>, charset: Charset) -> ResolvedAddress {
        ResolvedAddress::new(
            email,
            name.map(|text| DisplayName {
                text: text.to_string(),
                charset,
            }),
        )
    }

    #[test]
    fn test_address_record_deserializes_without_name() {
        let record: AddressRecord =
            serde_json::from_str(r#"{"address": "taro@example.com"}"#).unwrap();
        assert_eq!(record, AddressRecord::new("taro@example.com"));
    }

    #[test]
    fn test_resolved_address_formatting() {
        let addr = resolved("taro@example.com", None, Charset::Utf8);
        assert_eq!(addr.to_header().unwrap(), "taro@example.com");
        assert_eq!(addr.domain(), "example.com");

        let addr = resolved("taro@example.com", Some("Taro Yamada"), Charset::Utf8);
        assert_eq!(addr.to_header().unwrap(), "Taro Yamada <taro@example.com>");
        assert_eq!(addr.to_string(), "Taro Yamada <taro@example.com>");
    }

    #[test]
    fn test_resolved_address_encodes_name() {
        let addr = resolved("taro@example.com", Some("山田太郎"), Charset::Iso2022Jp);
        let header = addr.to_header().unwrap();
        assert!(header.starts_with("=?ISO-2022-JP?B?"));
        assert!(header.ends_with(" <taro@example.com>"));
    }

    #[test]
    fn test_request_builder() {
        let request = MailRequest::new()
            .to(AddressRecord::new("a@example.com"))
            .to(AddressRecord::new("b@example.com"))
            .from(AddressRecord::with_name("john@example.com", "John"))
            .subject("Hi")
            .header("X-Mailer", "test");

        assert_eq!(request.to.as_ref().map(Vec::len), Some(2));
        assert!(request.cc.is_none());
        assert_eq!(
            request.headers,
            Some(vec![("X-Mailer".to_string(), Some("test".to_string()))])
        );
    }

    #[test]
    fn test_address_set_counts() {
        let one = || Some(vec![resolved("a@example.com", None, Charset::Utf8)]);
        let set = AddressSet {
            to: one(),
            cc: Some(Vec::new()),
            bcc: one(),
            reply_to: None,
            from: None,
        };
        assert_eq!(set.recipient_count(), 2);
        assert_eq!(set.reply_to_count(), 0);
    }
}

//! Message assembly.
//!
//! A [`MessageDraft`] collects headers and the body text. Calling
//! [`MessageDraft::finalize`] consumes the draft, encodes the body and brings
//! the MIME headers in line with it, yielding an immutable
//! [`OutboundMessage`]. Because finalize takes the draft by value it runs
//! exactly once and nothing can be changed afterwards.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::charset::Charset;
use crate::errors::{MailError, MailResult};
use crate::mime::{self, TransferEncoding};
use crate::policy::ValidatedFields;
use crate::resolver;
use crate::types::{AddressSet, Envelope, ResolvedAddress};

/// Date header format (RFC 5322).
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Header names managed by finalize.
pub mod names {
    /// `From`
    pub const FROM: &str = "From";
    /// `Reply-To`
    pub const REPLY_TO: &str = "Reply-To";
    /// `To`
    pub const TO: &str = "To";
    /// `Cc`
    pub const CC: &str = "Cc";
    /// `Bcc`
    pub const BCC: &str = "Bcc";
    /// `Subject`
    pub const SUBJECT: &str = "Subject";
    /// `Date`
    pub const DATE: &str = "Date";
    /// `Message-ID`
    pub const MESSAGE_ID: &str = "Message-ID";
    /// `MIME-Version`
    pub const MIME_VERSION: &str = "MIME-Version";
    /// `Content-Type`
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// `Content-Transfer-Encoding`
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
}

/// Recipient header types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    /// To.
    To,
    /// Cc.
    Cc,
    /// Bcc, never rendered into the message text.
    Bcc,
}

impl RecipientType {
    /// Returns the header name.
    pub fn header_name(&self) -> &'static str {
        match self {
            RecipientType::To => names::TO,
            RecipientType::Cc => names::CC,
            RecipientType::Bcc => names::BCC,
        }
    }
}

/// A single header with its already encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value, header-safe ASCII.
    pub value: String,
}

/// Message under construction.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    charset: Charset,
    headers: Vec<Header>,
    from: Option<ResolvedAddress>,
    to: Vec<ResolvedAddress>,
    cc: Vec<ResolvedAddress>,
    bcc: Vec<ResolvedAddress>,
    reply_to: Vec<ResolvedAddress>,
    text: Option<String>,
    sent_at: Option<DateTime<Utc>>,
}

impl MessageDraft {
    /// Creates an empty draft composed in `charset`.
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            headers: Vec::new(),
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            text: None,
            sent_at: None,
        }
    }

    /// Sets a header, replacing any header of the same name.
    ///
    /// Non-ASCII values are encoded as words in the draft charset.
    pub fn set_header(&mut self, name: &str, value: &str) -> MailResult<()> {
        validate_header_name(name)?;
        if value.contains(['\r', '\n']) {
            return Err(MailError::message_content(format!(
                "header '{}' contains a line break",
                name
            )));
        }
        let value = mime::encode_text(value, self.charset).map_err(MailError::message_content)?;
        if !mime::fits_line_limit(name, &value) {
            return Err(MailError::message_content(format!(
                "header '{}' exceeds the line length limit",
                name
            )));
        }
        self.put_header(name, value);
        Ok(())
    }

    fn put_header(&mut self, name: &str, value: String) {
        match self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value,
            None => self.headers.push(Header {
                name: name.to_string(),
                value,
            }),
        }
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Sets the From address.
    pub fn set_from(&mut self, from: &ResolvedAddress) -> MailResult<()> {
        let value = render_addresses(std::slice::from_ref(from))?;
        self.put_header(names::FROM, value);
        self.from = Some(from.clone());
        Ok(())
    }

    /// Sets the Reply-To addresses. An empty list leaves the header unset.
    pub fn set_reply_to(&mut self, addresses: &[ResolvedAddress]) -> MailResult<()> {
        if addresses.is_empty() {
            return Ok(());
        }
        let value = render_addresses(addresses)?;
        self.put_header(names::REPLY_TO, value);
        self.reply_to = addresses.to_vec();
        Ok(())
    }

    /// Sets the recipients of one type. An empty list leaves the header unset.
    pub fn set_recipients(
        &mut self,
        kind: RecipientType,
        addresses: &[ResolvedAddress],
    ) -> MailResult<()> {
        if addresses.is_empty() {
            return Ok(());
        }
        let value = render_addresses(addresses)?;
        self.put_header(kind.header_name(), value);
        let list = match kind {
            RecipientType::To => &mut self.to,
            RecipientType::Cc => &mut self.cc,
            RecipientType::Bcc => &mut self.bcc,
        };
        *list = addresses.to_vec();
        Ok(())
    }

    /// Sets the subject, encoded in the draft charset.
    pub fn set_subject(&mut self, subject: &str) -> MailResult<()> {
        self.set_header(names::SUBJECT, subject)
    }

    /// Sets the plain text body.
    pub fn set_text(&mut self, text: &str) -> MailResult<()> {
        self.charset
            .encode(text)
            .map_err(MailError::message_content)?;
        self.text = Some(text.to_string());
        Ok(())
    }

    /// Stamps the send timestamp.
    pub fn set_sent_date(&mut self, sent_at: DateTime<Utc>) {
        self.put_header(names::DATE, sent_at.format(DATE_FORMAT).to_string());
        self.sent_at = Some(sent_at);
    }

    /// Encodes the body and reconciles the MIME headers with it.
    pub fn finalize(mut self) -> MailResult<OutboundMessage> {
        let from = self
            .from
            .take()
            .ok_or_else(|| MailError::message_content("from address is not set"))?;
        let text = self
            .text
            .take()
            .ok_or_else(|| MailError::message_content("message body is not set"))?;
        let sent_at = match self.sent_at {
            Some(sent_at) => sent_at,
            None => {
                let now = Utc::now();
                self.set_sent_date(now);
                now
            }
        };

        let transfer_encoding = self.charset.policy().body_encoding;
        let raw = self
            .charset
            .encode(&mime::normalize_line_breaks(&text))
            .map_err(MailError::message_content)?;
        let body = transfer_encoding.encode(&raw);

        self.put_header(names::MIME_VERSION, "1.0".to_string());
        self.put_header(names::CONTENT_TYPE, mime::text_content_type(self.charset));
        self.put_header(
            names::CONTENT_TRANSFER_ENCODING,
            transfer_encoding.header_value().to_string(),
        );
        if !self.has_header(names::MESSAGE_ID) {
            self.put_header(names::MESSAGE_ID, message_id(&from, &sent_at));
        }

        Ok(OutboundMessage {
            charset: self.charset,
            transfer_encoding,
            headers: self.headers,
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            body,
            sent_at,
        })
    }
}

fn validate_header_name(name: &str) -> MailResult<()> {
    let valid = !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':');
    if valid {
        Ok(())
    } else {
        Err(MailError::message_content(format!(
            "invalid header name '{}'",
            name
        )))
    }
}

fn render_addresses(addresses: &[ResolvedAddress]) -> MailResult<String> {
    addresses
        .iter()
        .map(|a| a.to_header().map_err(MailError::message_content))
        .collect::<MailResult<Vec<_>>>()
        .map(|rendered| rendered.join(", "))
}

fn message_id(from: &ResolvedAddress, sent_at: &DateTime<Utc>) -> String {
    format!(
        "<{}.{}@{}>",
        Uuid::new_v4().simple(),
        sent_at.timestamp_millis(),
        from.domain()
    )
}

/// Finalized message, ready for transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    charset: Charset,
    transfer_encoding: TransferEncoding,
    headers: Vec<Header>,
    from: ResolvedAddress,
    to: Vec<ResolvedAddress>,
    cc: Vec<ResolvedAddress>,
    bcc: Vec<ResolvedAddress>,
    reply_to: Vec<ResolvedAddress>,
    body: Vec<u8>,
    sent_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Returns the value of the named header, as rendered.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns all headers in order.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Returns the recipients of one type.
    pub fn recipients(&self, kind: RecipientType) -> &[ResolvedAddress] {
        match kind {
            RecipientType::To => &self.to,
            RecipientType::Cc => &self.cc,
            RecipientType::Bcc => &self.bcc,
        }
    }

    /// Returns the Reply-To addresses.
    pub fn reply_to(&self) -> &[ResolvedAddress] {
        &self.reply_to
    }

    /// Returns the From address.
    pub fn from(&self) -> &ResolvedAddress {
        &self.from
    }

    /// Returns the charset the message is composed in.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Returns the body transfer encoding.
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.transfer_encoding
    }

    /// Returns the encoded body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the send timestamp.
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    /// Returns the Message-ID header value.
    pub fn message_id(&self) -> Option<&str> {
        self.header(names::MESSAGE_ID)
    }

    /// Decodes the body back to text.
    pub fn decoded_body(&self) -> MailResult<String> {
        let raw = match self.transfer_encoding {
            TransferEncoding::QuotedPrintable => {
                quoted_printable::decode(&self.body, quoted_printable::ParseMode::Robust)
                    .map_err(MailError::message_content)?
            }
            TransferEncoding::Base64 => {
                let compact: Vec<u8> = self
                    .body
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                BASE64.decode(compact).map_err(MailError::message_content)?
            }
        };
        self.charset.decode(&raw).map_err(MailError::message_content)
    }

    /// Builds the SMTP envelope.
    ///
    /// `sender_override` replaces the From address as envelope sender when
    /// present and non-empty.
    pub fn envelope(&self, sender_override: Option<&str>) -> MailResult<Envelope> {
        let sender = match sender_override {
            Some(sender) if !sender.is_empty() => {
                resolver::validate_mailbox(sender).map_err(|e| {
                    MailError::message_content(format!("envelope sender: {}", e))
                })?;
                sender.to_string()
            }
            _ => self.from.email().to_string(),
        };

        let recipients = [&self.to, &self.cc, &self.bcc]
            .into_iter()
            .flatten()
            .map(|a| a.email().to_string())
            .collect();

        Ok(Envelope::new(sender, recipients))
    }

    /// Renders the message as RFC 5322 text with CRLF line endings.
    ///
    /// Bcc is left out.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.body.len() + 1024);

        for header in &self.headers {
            if header.name.eq_ignore_ascii_case(names::BCC) {
                continue;
            }
            let line = mime::fold_header(&format!("{}: {}", header.name, header.value));
            output.extend_from_slice(line.as_bytes());
            output.extend_from_slice(b"\r\n");
        }

        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);
        if !output.ends_with(b"\r\n") {
            output.extend_from_slice(b"\r\n");
        }

        output
    }
}

/// Assembles the outbound message from validated request parts.
///
/// Core headers go first; custom headers are applied afterwards and may
/// replace them. Entries without a value are skipped.
pub fn assemble(
    addresses: &AddressSet,
    fields: &ValidatedFields<'_>,
    charset_label: &str,
    custom_headers: Option<&[(String, Option<String>)]>,
) -> MailResult<OutboundMessage> {
    let charset = Charset::lookup(charset_label).map_err(MailError::message_content)?;
    let mut draft = MessageDraft::new(charset);

    draft.set_from(fields.from)?;
    draft.set_reply_to(addresses.reply_to.as_deref().unwrap_or_default())?;
    for (kind, list) in [
        (RecipientType::To, &addresses.to),
        (RecipientType::Cc, &addresses.cc),
        (RecipientType::Bcc, &addresses.bcc),
    ] {
        draft.set_recipients(kind, list.as_deref().unwrap_or_default())?;
    }
    draft.set_subject(fields.subject)?;
    draft.set_text(fields.body)?;
    draft.set_sent_date(Utc::now());

    for (name, value) in custom_headers.unwrap_or_default() {
        if let Some(value) = value {
            draft.set_header(name, value)?;
        }
    }

    draft.finalize()
}

//! Mock implementations for testing.
//!
//! Provides a recording transport and request fixtures.

use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard};

use crate::charset::Charset;
use crate::config::TransportConfig;
use crate::errors::{MailError, MailResult};
use crate::message::{MessageDraft, OutboundMessage, RecipientType};
use crate::transport::Transport;
use crate::types::{AddressRecord, Envelope, MailRequest, ResolvedAddress};

/// A send captured by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Configuration the send was made with.
    pub config: TransportConfig,
    /// Envelope handed to the transport.
    pub envelope: Envelope,
    /// Finalized message.
    pub message: OutboundMessage,
}

/// Transport that records every message instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    fail_next: Mutex<Option<MailError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingTransport {
    /// Creates a new recording transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next send fail with `error`.
    pub fn fail_next_with(&self, error: MailError) -> &Self {
        *lock(&self.fail_next) = Some(error);
        self
    }

    /// Returns every recorded send.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    /// Returns the most recent send.
    pub fn last(&self) -> Option<SentMessage> {
        lock(&self.sent).last().cloned()
    }

    /// Returns the number of recorded sends.
    pub fn count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Clears recorded sends and any queued failure.
    pub fn clear(&self) {
        lock(&self.sent).clear();
        *lock(&self.fail_next) = None;
    }
}

impl Transport for RecordingTransport {
    fn send(
        &self,
        config: &TransportConfig,
        envelope: &Envelope,
        message: &OutboundMessage,
    ) -> MailResult<()> {
        if let Some(error) = lock(&self.fail_next).take() {
            return Err(error);
        }

        lock(&self.sent).push(SentMessage {
            config: config.clone(),
            envelope: envelope.clone(),
            message: message.clone(),
        });
        Ok(())
    }
}

/// Configuration pointing at a host that is never contacted.
pub fn test_config() -> TransportConfig {
    TransportConfig::builder().host("smtp.example.com").build()
}

/// Generates `count` distinct recipient records.
pub fn recipients(count: usize) -> Vec<AddressRecord> {
    (0..count)
        .map(|i| AddressRecord::new(format!("user{}@example.com", i)))
        .collect()
}

/// A valid request: one To recipient, From and Reply-To set, Japanese
/// subject and body in ISO-2022-JP.
pub fn test_request() -> MailRequest {
    let from = AddressRecord::with_name("john999@example.com", "John Smith");
    MailRequest::new()
        .to(AddressRecord::with_name("taro1@example.com", "Taro Yamada"))
        .from(from.clone())
        .reply_to(from)
        .subject("メール件名")
        .text("メール本文\n本文だよ。")
        .charset("ISO-2022-JP")
}

/// [`test_request`] as untyped JSON.
pub fn test_request_json() -> Value {
    json!({
        "to": [{"address": "taro1@example.com", "name": "Taro Yamada"}],
        "from": {"address": "john999@example.com", "name": "John Smith"},
        "reply-to": [{"address": "john999@example.com", "name": "John Smith"}],
        "subject": "メール件名",
        "text": "メール本文\n本文だよ。",
        "charset": "ISO-2022-JP"
    })
}

/// A finalized US-ASCII message with the given body.
pub fn outbound_message(body: &str) -> MailResult<OutboundMessage> {
    let mut draft = MessageDraft::new(Charset::UsAscii);
    draft.set_from(&ResolvedAddress::new("john999@example.com", None))?;
    draft.set_recipients(
        RecipientType::To,
        &[ResolvedAddress::new("taro1@example.com", None)],
    )?;
    draft.set_subject("Test message")?;
    draft.set_text(body)?;
    draft.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailErrorKind;

    #[test]
    fn test_recording_transport() {
        let transport = RecordingTransport::new();
        let message = outbound_message("hello").unwrap();
        let envelope = message.envelope(None).unwrap();

        transport.send(&test_config(), &envelope, &message).unwrap();

        assert_eq!(transport.count(), 1);
        let sent = transport.last().unwrap();
        assert_eq!(sent.envelope.recipients, vec!["taro1@example.com"]);
        assert_eq!(sent.message.header("Subject"), Some("Test message"));
    }

    #[test]
    fn test_recording_transport_failure() {
        let transport = RecordingTransport::new();
        transport.fail_next_with(MailError::partial_delivery("550 rejected"));
        let message = outbound_message("hello").unwrap();
        let envelope = message.envelope(None).unwrap();

        let err = transport.send(&test_config(), &envelope, &message).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::PartialDeliveryFailure);
        assert_eq!(transport.count(), 0);

        // Only the next send fails
        transport.send(&test_config(), &envelope, &message).unwrap();
        assert_eq!(transport.count(), 1);

        transport.clear();
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_fixtures() {
        let records = recipients(3);
        assert_eq!(records.len(), 3);
        assert_ne!(records[0], records[1]);

        let parsed = crate::request::parse_request(&test_request_json()).unwrap();
        assert_eq!(parsed, test_request());
    }
}

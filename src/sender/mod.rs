//! Mail sender.
//!
//! [`MailSender`] runs the whole pipeline synchronously on the calling
//! thread: parse, resolve, validate, assemble, then hand off to the
//! transport. The first failing stage ends the call, and the error is logged
//! once at the severity of its kind.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::charset::Charset;
use crate::config::TransportConfig;
use crate::errors::{MailError, MailResult};
use crate::message::{self, OutboundMessage};
use crate::observability::{self, MetricsSnapshot, SendMetrics, Timer};
use crate::policy;
use crate::request;
use crate::resolver;
use crate::transport::{SmtpTransport, Transport};
use crate::types::MailRequest;

/// Composes and sends mail through a fixed SMTP endpoint.
pub struct MailSender {
    /// Configuration.
    config: TransportConfig,
    /// Delivery backend.
    transport: Arc<dyn Transport>,
    /// Metrics collector.
    metrics: Arc<SendMetrics>,
}

impl fmt::Debug for MailSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSender")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

impl MailSender {
    /// Creates a sender delivering over SMTP.
    ///
    /// A missing host is accepted; every send then fails with a
    /// configuration error.
    pub fn new(config: TransportConfig) -> MailResult<Self> {
        let transport = SmtpTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a sender with a custom transport.
    pub fn with_transport(config: TransportConfig, transport: Arc<dyn Transport>) -> Self {
        #[cfg(feature = "tracing")]
        if config.host().is_none() {
            tracing::warn!("smtp host is not specified in configuration; sends will fail");
        }

        Self {
            config,
            transport,
            metrics: Arc::new(SendMetrics::new()),
        }
    }

    /// Creates a sender configured from environment variables.
    pub fn from_env() -> MailResult<Self> {
        Self::new(TransportConfig::from_env()?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns a snapshot of the send metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Sends a message described by an untyped request.
    pub fn send(&self, request: &Value) -> MailResult<()> {
        self.record(self.send_value(request).map(|_| ()))
    }

    /// Sends a message described by a JSON document.
    pub fn send_json(&self, json: &str) -> MailResult<()> {
        let parsed = serde_json::from_str::<Value>(json).map_err(MailError::from);
        self.record(parsed.and_then(|value| self.send_value(&value)).map(|_| ()))
    }

    /// Sends a typed request, returning the message handed to the transport.
    pub fn send_request(&self, request: &MailRequest) -> MailResult<OutboundMessage> {
        self.record(self.config.require_host().and_then(|_| self.dispatch(request)))
    }

    fn send_value(&self, value: &Value) -> MailResult<OutboundMessage> {
        self.config.require_host()?;
        if value.is_null() {
            return Err(MailError::request("Invalid argument for send method.: null."));
        }
        let request = request::parse_request(value)?;
        self.dispatch(&request)
    }

    /// Runs resolve, validate, assemble and transport for one request.
    fn dispatch(&self, request: &MailRequest) -> MailResult<OutboundMessage> {
        let timer = Timer::start("mail_send");
        let charset = Charset::effective_label(request.charset.as_deref());

        let addresses = resolver::resolve_request(request, charset)?;
        let fields = policy::validate(
            &addresses,
            request.subject.as_deref(),
            request.text.as_deref(),
        )?;
        let message = message::assemble(&addresses, &fields, charset, request.headers.as_deref())?;

        let sender_override = request
            .envelope_from
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.config.envelope_from_override.as_deref());
        let envelope = message.envelope(sender_override)?;

        self.transport.send(&self.config, &envelope, &message)?;
        timer.stop();

        Ok(message)
    }

    fn record<T>(&self, result: MailResult<T>) -> MailResult<T> {
        match &result {
            Ok(_) => self.metrics.record_sent(),
            Err(error) => {
                observability::log_failure(error);
                self.metrics.record_failure(error);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailErrorKind;
    use crate::message::RecipientType;
    use crate::mime::{decode_encoded_words, TransferEncoding};
    use crate::mocks::{self, RecordingTransport};
    use crate::transport::MockTransport;
    use crate::types::AddressRecord;
    use rstest::rstest;
    use serde_json::json;

    fn sender() -> (MailSender, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let sender = MailSender::with_transport(mocks::test_config(), transport.clone());
        (sender, transport)
    }

    fn base_request() -> MailRequest {
        MailRequest::new()
            .from(AddressRecord::with_name("john999@example.com", "John Smith"))
            .reply_to(AddressRecord::new("john999@example.com"))
            .subject("Subject")
            .text("Body")
    }

    fn with_recipients(to: usize, cc: usize, bcc: usize) -> MailRequest {
        let mut request = base_request();
        request.to = Some(mocks::recipients(to));
        request.cc = Some(mocks::recipients(cc));
        request.bcc = Some(mocks::recipients(bcc));
        request
    }

    #[test]
    fn test_end_to_end_iso_2022_jp() {
        let (sender, transport) = sender();
        sender.send(&mocks::test_request_json()).unwrap();

        let sent = transport.last().unwrap();
        let message = &sent.message;
        assert_eq!(message.recipients(RecipientType::To).len(), 1);
        assert_eq!(sent.envelope.recipients, vec!["taro1@example.com"]);
        assert_eq!(sent.envelope.sender, "john999@example.com");

        let subject = message.header("Subject").unwrap();
        assert!(subject.starts_with("=?ISO-2022-JP?B?"));
        assert_eq!(decode_encoded_words(subject).unwrap(), "メール件名");

        let from = message.header("From").unwrap();
        assert!(from.starts_with("=?ISO-2022-JP?B?"));
        assert_eq!(
            message.header("Content-Transfer-Encoding"),
            Some("quoted-printable")
        );
        assert_eq!(sender.metrics().sent, 1);
    }

    #[rstest]
    #[case(0, 0, 0, Some(MailErrorKind::NoRecipients))]
    #[case(1, 0, 0, None)]
    #[case(50, 0, 0, None)]
    #[case(20, 20, 10, None)]
    #[case(51, 0, 0, Some(MailErrorKind::RecipientLimitExceeded))]
    #[case(0, 26, 25, Some(MailErrorKind::RecipientLimitExceeded))]
    fn test_recipient_cardinality(
        #[case] to: usize,
        #[case] cc: usize,
        #[case] bcc: usize,
        #[case] expected: Option<MailErrorKind>,
    ) {
        let (sender, transport) = sender();
        let result = sender.send_request(&with_recipients(to, cc, bcc));

        match expected {
            None => {
                assert!(result.is_ok());
                assert_eq!(transport.last().unwrap().envelope.recipients.len(), to + cc + bcc);
            }
            Some(kind) => {
                assert_eq!(result.unwrap_err().kind(), kind);
                assert_eq!(transport.count(), 0);
            }
        }
    }

    #[test]
    fn test_absent_and_empty_lists_are_equivalent() {
        let (sender, _) = sender();

        let absent = sender.send_request(&base_request()).unwrap_err();
        let empty = sender.send_request(&with_recipients(0, 0, 0)).unwrap_err();
        assert_eq!(absent.kind(), MailErrorKind::NoRecipients);
        assert_eq!(empty.kind(), MailErrorKind::NoRecipients);

        let err = sender
            .send(&json!({
                "to": [], "cc": [], "bcc": [],
                "from": {"address": "john999@example.com"},
                "reply-to": [{"address": "john999@example.com"}],
                "subject": "s", "text": "b"
            }))
            .unwrap_err();
        assert_eq!(err.message(), "No mail recipients are specified in request.");
    }

    #[rstest]
    #[case(0, Some(MailErrorKind::MissingReplyTo))]
    #[case(1, None)]
    #[case(50, None)]
    #[case(51, Some(MailErrorKind::ReplyToLimitExceeded))]
    fn test_reply_to_cardinality(#[case] count: usize, #[case] expected: Option<MailErrorKind>) {
        let (sender, _) = sender();
        let mut request = with_recipients(1, 0, 0);
        request.reply_to = Some(mocks::recipients(count));

        let result = sender.send_request(&request);
        match expected {
            None => assert_eq!(result.unwrap().reply_to().len(), count),
            Some(kind) => assert_eq!(result.unwrap_err().kind(), kind),
        }
    }

    #[rstest]
    #[case("to")]
    #[case("cc")]
    #[case("bcc")]
    #[case("from")]
    #[case("reply-to")]
    fn test_invalid_address_in_any_field(#[case] field: &str) {
        for bad in ["MailTest1010", "メール@example.com"] {
            let (sender, transport) = sender();
            let mut request = mocks::test_request_json();
            let record = json!({"address": bad});
            request[field] = if field == "from" { record } else { json!([record]) };

            let err = sender.send(&request).unwrap_err();
            assert_eq!(err.kind(), MailErrorKind::InvalidAddress, "{field}: {bad}");
            assert_eq!(err.message(), "Invalid mail address is detected.");
            assert_eq!(transport.count(), 0);
        }
    }

    #[test]
    fn test_name_omitted_or_empty() {
        let (sender, transport) = sender();
        let mut request = mocks::test_request_json();
        request["to"] = json!([
            {"address": "a@example.com"},
            {"address": "b@example.com", "name": ""},
            {"address": "c@example.com", "name": null}
        ]);
        sender.send(&request).unwrap();

        let message = transport.last().unwrap().message;
        assert_eq!(
            message.header("To"),
            Some("a@example.com, b@example.com, c@example.com")
        );
    }

    #[test]
    fn test_default_charset_and_utf8() {
        let (sender, transport) = sender();

        let mut request = mocks::test_request_json();
        request.as_object_mut().unwrap().remove("charset");
        sender.send(&request).unwrap();
        let default = transport.last().unwrap().message;
        assert_eq!(default.charset(), Charset::Iso2022Jp);
        assert!(default.header("Subject").unwrap().starts_with("=?ISO-2022-JP?B?"));
        assert_eq!(default.transfer_encoding(), TransferEncoding::QuotedPrintable);

        request["charset"] = json!("UTF-8");
        sender.send(&request).unwrap();
        let utf8 = transport.last().unwrap().message;
        assert_eq!(utf8.transfer_encoding(), TransferEncoding::Base64);
        assert_eq!(utf8.header("Content-Transfer-Encoding"), Some("base64"));

        assert_eq!(default.decoded_body().unwrap(), utf8.decoded_body().unwrap());
        assert_eq!(
            decode_encoded_words(default.header("Subject").unwrap()).unwrap(),
            decode_encoded_words(utf8.header("Subject").unwrap()).unwrap()
        );
    }

    #[test]
    fn test_display_name_round_trip() {
        let (sender, transport) = sender();
        let request = with_recipients(0, 0, 0)
            .to(AddressRecord::with_name("taro@example.com", "Taro Yamada"))
            .to(AddressRecord::with_name("hanako@example.com", "山田花子"))
            .charset("UTF-8");
        sender.send_request(&request).unwrap();

        let to = transport.last().unwrap().message.header("To").unwrap().to_string();
        assert!(to.starts_with("Taro Yamada <taro@example.com>, "));
        assert_eq!(
            decode_encoded_words(&to).unwrap(),
            "Taro Yamada <taro@example.com>, 山田花子 <hanako@example.com>"
        );
    }

    #[test]
    fn test_custom_header_overrides_subject() {
        let (sender, transport) = sender();
        let mut request = mocks::test_request_json();
        request["headers"] = json!({"Subject": "Overridden", "X-Mailer": "mail-sender"});
        sender.send(&request).unwrap();

        let message = transport.last().unwrap().message;
        assert_eq!(message.header("Subject"), Some("Overridden"));
        assert_eq!(message.header("X-Mailer"), Some("mail-sender"));
    }

    #[rstest]
    #[case("from", MailErrorKind::MissingFrom, "From address is not specified.")]
    #[case("subject", MailErrorKind::EmptySubject, "Empty subject is not permitted.")]
    #[case("text", MailErrorKind::EmptyBody, "Empty mail body is not permitted.")]
    fn test_required_fields(
        #[case] field: &str,
        #[case] kind: MailErrorKind,
        #[case] message: &str,
    ) {
        let (sender, _) = sender();
        let mut request = mocks::test_request_json();
        request.as_object_mut().unwrap().remove(field);

        let err = sender.send(&request).unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(err.to_string(), message);
        assert_eq!(sender.metrics().rejected, 1);
    }

    #[test]
    fn test_missing_host_fails_first() {
        let transport = Arc::new(RecordingTransport::new());
        let sender = MailSender::with_transport(TransportConfig::default(), transport.clone());

        let err = sender.send(&Value::Null).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationMissing);
        assert_eq!(err.to_string(), "smtp host is not specified in configuration.");

        let err = sender.send_request(&mocks::test_request()).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationMissing);
        assert_eq!(transport.count(), 0);
    }

    #[test]
    fn test_invalid_requests() {
        let (sender, _) = sender();

        let err = sender.send(&Value::Null).unwrap_err();
        assert_eq!(err.message(), "Invalid argument for send method.: null.");

        let err = sender.send(&json!({"to": "taro@example.com"})).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::InvalidRequest);

        let err = sender.send_json("{not json").unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::InvalidRequest);

        sender.send_json(&mocks::test_request_json().to_string()).unwrap();
    }

    #[test]
    fn test_envelope_sender_precedence() {
        let transport = Arc::new(RecordingTransport::new());
        let config = TransportConfig::builder()
            .host("smtp.example.com")
            .envelope_from("config-bounce@example.com")
            .build();
        let sender = MailSender::with_transport(config, transport.clone());

        sender.send_request(&mocks::test_request()).unwrap();
        assert_eq!(
            transport.last().unwrap().envelope.sender,
            "config-bounce@example.com"
        );

        let request = mocks::test_request().envelope_from("bounce@example.com");
        sender.send_request(&request).unwrap();
        assert_eq!(transport.last().unwrap().envelope.sender, "bounce@example.com");

        let request = mocks::test_request().envelope_from("not an address");
        let err = sender.send_request(&request).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::InvalidMessageContent);
    }

    #[test]
    fn test_bcc_only_in_envelope() {
        let (sender, transport) = sender();
        let request = mocks::test_request().bcc(AddressRecord::new("hidden@example.com"));
        sender.send_request(&request).unwrap();

        let sent = transport.last().unwrap();
        assert_eq!(
            sent.envelope.recipients,
            vec!["taro1@example.com", "hidden@example.com"]
        );
        let text = String::from_utf8(sent.message.to_bytes()).unwrap();
        assert!(!text.contains("hidden@example.com"));
    }

    #[rstest]
    #[case(MailError::partial_delivery("550 No such user"), MailErrorKind::PartialDeliveryFailure)]
    #[case(MailError::delivery("Connection refused"), MailErrorKind::DeliveryFailure)]
    fn test_transport_failures_propagate(#[case] error: MailError, #[case] kind: MailErrorKind) {
        let (sender, transport) = sender();
        transport.fail_next_with(error);

        let err = sender.send(&mocks::test_request_json()).unwrap_err();
        assert_eq!(err.kind(), kind);

        let metrics = sender.metrics();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.rejected, 0);
    }

    #[test]
    fn test_transport_called_once_with_config() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|config, envelope, message| {
                config.host() == Some("smtp.example.com")
                    && envelope.recipients == vec!["taro1@example.com".to_string()]
                    && message.header("MIME-Version") == Some("1.0")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let sender = MailSender::with_transport(mocks::test_config(), Arc::new(transport));
        sender.send(&mocks::test_request_json()).unwrap();
    }

    #[test]
    fn test_validation_failure_never_reaches_transport() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let sender = MailSender::with_transport(mocks::test_config(), Arc::new(transport));
        let mut request = mocks::test_request_json();
        request["subject"] = json!("");
        assert!(sender.send(&request).is_err());
    }

    #[rstest]
    #[case(json!({"address": "Taro Yamada <taro1@example.com>"}), Some("Taro Yamada"))]
    #[case(json!({"address": " taro1@example.com "}), None)]
    #[case(json!({"address": "Taro <taro1@example.com>", "name": "Taro Yamada"}), Some("Taro Yamada"))]
    fn test_mailbox_forms_in_address(#[case] record: Value, #[case] name: Option<&str>) {
        let (sender, transport) = sender();
        let mut request = mocks::test_request_json();
        request["to"] = json!([record]);
        request["charset"] = json!("UTF-8");
        sender.send(&request).unwrap();

        let sent = transport.last().unwrap();
        assert_eq!(sent.envelope.recipients, vec!["taro1@example.com"]);
        let to = &sent.message.recipients(RecipientType::To)[0];
        assert_eq!(to.display_name().map(|n| n.text.as_str()), name);
        let expected = match name {
            Some(name) => format!("{} <taro1@example.com>", name),
            None => "taro1@example.com".to_string(),
        };
        assert_eq!(sent.message.header("To"), Some(expected.as_str()));
    }

    #[test]
    fn test_overlong_custom_header_is_request_side_failure() {
        let (sender, transport) = sender();
        let mut request = mocks::test_request_json();
        request["headers"] = json!({"X-Long": "a".repeat(1200)});

        let err = sender.send(&request).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::InvalidMessageContent);
        assert_eq!(transport.count(), 0);
        assert_eq!(sender.metrics().rejected, 1);
    }

    #[test]
    fn test_sender_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MailSender>();
        assert_send_sync::<Arc<MailSender>>();
    }

    #[test]
    fn test_shared_across_threads() {
        let (sender, transport) = sender();
        let sender = Arc::new(sender);

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let sender = Arc::clone(&sender);
                std::thread::spawn(move || {
                    let request = mocks::test_request()
                        .subject(format!("Message {}", i));
                    sender.send_request(&request).map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(transport.count(), 2);
        assert_eq!(sender.metrics().sent, 2);
        let mut subjects: Vec<String> = transport
            .sent()
            .iter()
            .filter_map(|s| s.message.header("Subject").map(str::to_string))
            .collect();
        subjects.sort();
        assert_eq!(subjects, vec!["Message 0", "Message 1"]);
    }
}

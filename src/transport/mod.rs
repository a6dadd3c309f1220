//! Transport layer for SMTP delivery.
//!
//! [`Transport`] is the boundary the sender hands finished messages to.
//! [`SmtpTransport`] implements it over plain TCP, driving an async session
//! on its own single-threaded runtime so callers stay synchronous.

use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;

use crate::config::TransportConfig;
use crate::errors::{MailError, MailResult};
use crate::message::OutboundMessage;
use crate::mime;
use crate::protocol::{codes, EsmtpCapabilities, SmtpCommand, SmtpResponse};
use crate::types::Envelope;

/// Delivers finished messages.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Delivers `message` to the envelope recipients.
    ///
    /// Fails with `PartialDeliveryFailure` when the server rejects any
    /// recipient and `DeliveryFailure` for every other problem.
    fn send(
        &self,
        config: &TransportConfig,
        envelope: &Envelope,
        message: &OutboundMessage,
    ) -> MailResult<()>;
}

/// Blocking SMTP transport over plain TCP.
///
/// Each send opens a fresh connection. `send` must not be called from inside
/// another async runtime.
pub struct SmtpTransport {
    runtime: Runtime,
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport").finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// Creates the transport and its runtime.
    pub fn new() -> MailResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| {
                MailError::configuration(format!("Failed to start transport runtime: {}", e))
                    .with_cause(e)
            })?;
        Ok(Self { runtime })
    }
}

impl Transport for SmtpTransport {
    fn send(
        &self,
        config: &TransportConfig,
        envelope: &Envelope,
        message: &OutboundMessage,
    ) -> MailResult<()> {
        let address = config.address()?;
        let data = mime::prepare_data_content(&message.to_bytes());

        self.runtime.block_on(async {
            let mut session = SmtpSession::connect(&address, config).await?;
            let result = match session.hello(&config.helo_name).await {
                Ok(()) => session.deliver(envelope, &data).await,
                Err(e) => Err(e),
            };
            session.quit().await;
            result
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            message_id = message.message_id().unwrap_or_default(),
            recipients = envelope.recipients.len(),
            "Message delivered"
        );

        Ok(())
    }
}

/// One SMTP connection.
struct SmtpSession {
    stream: BufReader<TcpStream>,
    command_timeout: Duration,
    capabilities: EsmtpCapabilities,
}

impl SmtpSession {
    /// Connects and reads the server greeting.
    async fn connect(address: &str, config: &TransportConfig) -> MailResult<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| MailError::delivery(format!("Connect to {} timed out", address)))?
            .map_err(|e| Self::map_io_error(e, address))?;

        stream.set_nodelay(true).ok();

        let mut session = Self {
            stream: BufReader::new(stream),
            command_timeout: config.command_timeout,
            capabilities: EsmtpCapabilities::default(),
        };

        let greeting = session.read_response().await?;
        if greeting.code != codes::SERVICE_READY {
            return Err(greeting.to_error());
        }

        Ok(session)
    }

    /// Maps IO errors to delivery errors.
    fn map_io_error(error: io::Error, address: &str) -> MailError {
        let message = match error.kind() {
            io::ErrorKind::ConnectionRefused => format!("Connection refused to {}", address),
            io::ErrorKind::TimedOut => format!("Connect to {} timed out", address),
            io::ErrorKind::ConnectionReset => "Connection reset by server".to_string(),
            _ => format!("Connection error: {}", error),
        };
        MailError::delivery(message).with_cause(error)
    }

    /// Sends EHLO, falling back to HELO.
    async fn hello(&mut self, helo_name: &str) -> MailResult<()> {
        let response = self
            .send_command(&SmtpCommand::Ehlo(helo_name.to_string()))
            .await?;

        if response.is_success() {
            self.capabilities = EsmtpCapabilities::from_ehlo_response(&response);
            return Ok(());
        }

        let response = self
            .send_command(&SmtpCommand::Helo(helo_name.to_string()))
            .await?;
        if !response.is_success() {
            return Err(response.to_error());
        }
        Ok(())
    }

    /// Runs one mail transaction.
    async fn deliver(&mut self, envelope: &Envelope, data: &[u8]) -> MailResult<()> {
        if let Some(limit) = self.capabilities.size {
            if data.len() > limit {
                return Err(MailError::delivery(format!(
                    "Message size {} exceeds server limit {}",
                    data.len(),
                    limit
                ))
                .with_smtp_code(codes::MESSAGE_TOO_BIG));
            }
        }

        let mail_from = SmtpCommand::MailFrom {
            address: format!("<{}>", envelope.sender),
            size: self.capabilities.size.map(|_| data.len()),
        };
        let response = self.send_command(&mail_from).await?;
        if !response.is_success() {
            return Err(response.to_error());
        }

        let mut rejected = Vec::new();
        for recipient in &envelope.recipients {
            let rcpt_to = SmtpCommand::RcptTo {
                address: format!("<{}>", recipient),
            };
            let response = self.send_command(&rcpt_to).await?;
            if !response.is_success() {
                rejected.push((recipient.as_str(), response));
            }
        }

        if let Some((_, first)) = rejected.first() {
            let code = first.code;
            let cause = rejected
                .iter()
                .map(|(address, response)| format!("{}: {}", address, response))
                .collect::<Vec<_>>()
                .join("; ");

            // Nothing is delivered when any recipient fails
            self.send_command(&SmtpCommand::Rset).await.ok();
            return Err(MailError::partial_delivery(cause).with_smtp_code(code));
        }

        let response = self.send_command(&SmtpCommand::Data).await?;
        if response.code != codes::START_MAIL_INPUT {
            return Err(response.to_error());
        }

        Self::write_all(self.stream.get_mut(), data, self.command_timeout).await?;

        let response = self.read_response().await?;
        if !response.is_success() {
            return Err(response.to_error());
        }

        Ok(())
    }

    /// Ends the session, ignoring failures.
    async fn quit(&mut self) {
        self.send_command(&SmtpCommand::Quit).await.ok();
    }

    /// Sends a command and reads the response.
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        let cmd_str = format!("{}\r\n", command.to_smtp_string());

        #[cfg(feature = "tracing")]
        tracing::debug!(command = %command, "Sending SMTP command");

        Self::write_all(self.stream.get_mut(), cmd_str.as_bytes(), self.command_timeout).await?;
        self.read_response().await
    }

    /// Reads lines until we have a complete response.
    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();

            let result = timeout(self.command_timeout, self.stream.read_line(&mut line))
                .await
                .map_err(|_| MailError::delivery("Read timed out"))?
                .map_err(|e| MailError::delivery(format!("Read error: {}", e)).with_cause(e))?;

            if result == 0 {
                return Err(MailError::delivery("Server closed connection"));
            }

            let line = line.trim_end().to_string();

            // Check for continuation (code-hyphen)
            let is_continuation = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line);

            if !is_continuation {
                break;
            }
        }

        let response = SmtpResponse::parse(&lines)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(code = response.code, message = %response.first_message(), "Received SMTP response");

        Ok(response)
    }

    /// Writes data to the stream.
    async fn write_all<W: AsyncWrite + Unpin>(
        writer: &mut W,
        data: &[u8],
        timeout_duration: Duration,
    ) -> MailResult<()> {
        timeout(timeout_duration, writer.write_all(data))
            .await
            .map_err(|_| MailError::delivery("Write timed out"))?
            .map_err(|e| MailError::delivery(format!("Write error: {}", e)).with_cause(e))?;

        timeout(timeout_duration, writer.flush())
            .await
            .map_err(|_| MailError::delivery("Flush timed out"))?
            .map_err(|e| MailError::delivery(format!("Flush error: {}", e)).with_cause(e))?;

        Ok(())
    }
}

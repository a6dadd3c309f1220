//! Basic Mail Sending Example
//!
//! Reads the relay from `MAILSENDER_SMTP_HOST` / `MAILSENDER_SMTP_PORT` and
//! sends one Japanese message in the default charset.

use mail_sender::{MailError, MailSender};
use serde_json::json;

fn main() -> Result<(), MailError> {
    println!("Creating mail sender...");
    let sender = MailSender::from_env()?;

    let request = json!({
        "to": [{"address": "taro1@example.com", "name": "Taro Yamada"}],
        "from": {"address": "john999@example.com", "name": "John Smith"},
        "reply-to": [{"address": "john999@example.com"}],
        "subject": "メール件名",
        "text": "メール本文\n本文だよ。"
    });

    println!("Sending mail via {:?}...", sender.config().host());

    match sender.send(&request) {
        Ok(()) => println!("Mail sent successfully!"),
        Err(e) => {
            eprintln!("Failed to send mail: {} ({})", e, e.kind());
            return Err(e);
        }
    }

    println!("  Metrics: {:?}", sender.metrics());
    Ok(())
}

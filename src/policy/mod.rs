//! Cardinality and required-field policy.
//!
//! Rules run in a fixed order and the first failing rule decides the error,
//! so a request with several problems always reports the same one.

use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::types::{AddressSet, ResolvedAddress};

/// Maximum number of To, Cc and Bcc recipients combined.
pub const MAX_RECIPIENTS: usize = 50;

/// Maximum number of Reply-To addresses.
pub const MAX_REPLY_TO: usize = 50;

/// Fields that passed validation, borrowed from the request.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedFields<'a> {
    /// From address.
    pub from: &'a ResolvedAddress,
    /// Non-empty subject.
    pub subject: &'a str,
    /// Non-empty body.
    pub body: &'a str,
}

/// Validates the resolved addresses and required fields.
pub fn validate<'a>(
    addresses: &'a AddressSet,
    subject: Option<&'a str>,
    body: Option<&'a str>,
) -> MailResult<ValidatedFields<'a>> {
    let recipients = addresses.recipient_count();
    if recipients > MAX_RECIPIENTS {
        return Err(MailError::policy(
            MailErrorKind::RecipientLimitExceeded,
            format!("Number of recipients exceeds the limit({}).", MAX_RECIPIENTS),
        ));
    }
    if recipients == 0 {
        return Err(MailError::policy(
            MailErrorKind::NoRecipients,
            "No mail recipients are specified in request.",
        ));
    }

    let reply_to = addresses.reply_to_count();
    if reply_to == 0 {
        return Err(MailError::policy(
            MailErrorKind::MissingReplyTo,
            "At least one reply-to address is required.",
        ));
    }
    if reply_to > MAX_REPLY_TO {
        return Err(MailError::policy(
            MailErrorKind::ReplyToLimitExceeded,
            format!("Number of reply-to addresses exceeds the limitation({})", MAX_REPLY_TO),
        ));
    }

    let from = addresses.from.as_ref().ok_or_else(|| {
        MailError::policy(MailErrorKind::MissingFrom, "From address is not specified.")
    })?;

    let subject = non_empty(subject).ok_or_else(|| {
        MailError::policy(MailErrorKind::EmptySubject, "Empty subject is not permitted.")
    })?;

    let body = non_empty(body).ok_or_else(|| {
        MailError::policy(MailErrorKind::EmptyBody, "Empty mail body is not permitted.")
    })?;

    Ok(ValidatedFields { from, subject, body })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

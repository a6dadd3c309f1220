//! Address resolution.
//!
//! Turns raw `{address, name}` records into [`ResolvedAddress`] values after
//! strict RFC 5322 mailbox validation. The address may be a bare addr-spec or
//! the `display-name <addr-spec>` form. Display names are checked against the
//! requested charset here so an unencodable name is reported as an address
//! problem rather than surfacing later during assembly.

use crate::charset::Charset;
use crate::errors::{MailError, MailResult};
use crate::types::{AddressRecord, AddressSet, DisplayName, MailRequest, ResolvedAddress};

const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_LABEL_LEN: usize = 63;

/// Characters allowed in an unquoted local part besides alphanumerics.
const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// Resolves a single address record.
///
/// `charset_label` is the effective charset label of the request. It is only
/// consulted when the record carries a display name.
pub fn resolve(record: &AddressRecord, charset_label: &str) -> MailResult<ResolvedAddress> {
    let address = match record.address.as_deref() {
        Some(address) if !address.is_empty() => address,
        _ => {
            return Err(MailError::address(
                "'address' field is not specified or empty.",
            ))
        }
    };

    let mailbox = parse_mailbox(address)?;

    // An explicit name wins over one embedded in the address
    let name = match record.name.as_deref() {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        _ => mailbox.name,
    };
    let display_name = name
        .map(|name| resolve_name(&name, charset_label))
        .transpose()?;

    Ok(ResolvedAddress::new(mailbox.address, display_name))
}

/// A parsed RFC 5322 mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox<'a> {
    /// Bare addr-spec.
    pub address: &'a str,
    /// Display name of the `name-addr` form, unquoted.
    pub name: Option<String>,
}

/// Parses a mailbox in either `addr-spec` or `[display-name] <addr-spec>`
/// form. Surrounding whitespace is ignored.
pub fn parse_mailbox(input: &str) -> MailResult<Mailbox<'_>> {
    let invalid = || MailError::address("Invalid mail address is detected.");
    let input = input.trim();

    let (address, name) = match input.strip_suffix('>') {
        Some(rest) => {
            let open = rest.rfind('<').ok_or_else(invalid)?;
            let name = parse_phrase(rest[..open].trim()).ok_or_else(invalid)?;
            (&rest[open + 1..], name)
        }
        None => (input, None),
    };

    validate_mailbox(address)?;
    Ok(Mailbox { address, name })
}

/// Parses a display-name phrase. Returns `None` when the phrase is invalid
/// and `Some(None)` when it is empty.
fn parse_phrase(phrase: &str) -> Option<Option<String>> {
    if phrase.is_empty() {
        return Some(None);
    }

    let text = if phrase.starts_with('"') {
        if quoted_string_end(phrase)? != phrase.len() - 1 {
            return None;
        }
        let mut text = String::new();
        let mut escaped = false;
        for c in phrase[1..phrase.len() - 1].chars() {
            if c == '\\' && !escaped {
                escaped = true;
            } else {
                text.push(c);
                escaped = false;
            }
        }
        if !text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
            return None;
        }
        text.trim().to_string()
    } else {
        if !phrase.chars().all(|c| is_atext(c) || c == ' ' || c == '.') {
            return None;
        }
        phrase.split_whitespace().collect::<Vec<_>>().join(" ")
    };

    Some(Some(text).filter(|t| !t.is_empty()))
}

fn resolve_name(name: &str, charset_label: &str) -> MailResult<DisplayName> {
    let unsupported =
        || MailError::address("Unsupported encoding is specified for mail display name.");

    let charset = Charset::lookup(charset_label).map_err(|e| unsupported().with_cause(e))?;
    if !charset.can_encode(name) {
        return Err(unsupported());
    }

    Ok(DisplayName {
        text: name.to_string(),
        charset,
    })
}

/// Resolves a list of records, keeping order. Absent and empty lists both
/// resolve to `None`.
pub fn resolve_all(
    records: Option<&[AddressRecord]>,
    charset_label: &str,
) -> MailResult<Option<Vec<ResolvedAddress>>> {
    match records {
        Some(records) if !records.is_empty() => records
            .iter()
            .map(|record| resolve(record, charset_label))
            .collect::<MailResult<Vec<_>>>()
            .map(Some),
        _ => Ok(None),
    }
}

/// Resolves every address field of a request.
pub fn resolve_request(request: &MailRequest, charset_label: &str) -> MailResult<AddressSet> {
    Ok(AddressSet {
        to: resolve_all(request.to.as_deref(), charset_label)?,
        cc: resolve_all(request.cc.as_deref(), charset_label)?,
        bcc: resolve_all(request.bcc.as_deref(), charset_label)?,
        reply_to: resolve_all(request.reply_to.as_deref(), charset_label)?,
        from: request
            .from
            .as_ref()
            .map(|record| resolve(record, charset_label))
            .transpose()?,
    })
}

/// Validates a bare RFC 5322 addr-spec.
pub fn validate_mailbox(address: &str) -> MailResult<()> {
    if is_valid_mailbox(address) {
        Ok(())
    } else {
        Err(MailError::address("Invalid mail address is detected."))
    }
}

/// Returns true if `address` is a syntactically valid addr-spec.
pub fn is_valid_mailbox(address: &str) -> bool {
    if address.is_empty() || address.len() > MAX_ADDRESS_LEN {
        return false;
    }
    if !address.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return false;
    }

    let Some((local, domain)) = split_addr_spec(address) else {
        return false;
    };

    is_valid_local_part(local) && is_valid_domain(domain)
}

/// Splits at the `@` separating local part and domain, honouring a quoted
/// local part that may itself contain `@`.
fn split_addr_spec(address: &str) -> Option<(&str, &str)> {
    if address.starts_with('"') {
        let close = quoted_string_end(address)?;
        let rest = &address[close + 1..];
        let domain = rest.strip_prefix('@')?;
        return Some((&address[..=close], domain));
    }

    let mut parts = address.split('@');
    let local = parts.next()?;
    let domain = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((local, domain))
}

/// Returns the index of the closing quote of a quoted string starting at 0.
fn quoted_string_end(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || ATEXT_SPECIALS.contains(c)
}

fn is_dot_atom(text: &str) -> bool {
    !text.is_empty()
        && text
            .split('.')
            .all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

fn is_valid_local_part(local: &str) -> bool {
    if local.is_empty() || local.len() > MAX_LOCAL_PART_LEN {
        return false;
    }
    if local.starts_with('"') {
        return quoted_string_end(local) == Some(local.len() - 1) && local.len() >= 2;
    }
    is_dot_atom(local)
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }

    if let Some(literal) = domain.strip_prefix('[') {
        return literal
            .strip_suffix(']')
            .map(|inner| {
                !inner.is_empty()
                    && inner
                        .chars()
                        .all(|c| c.is_ascii_graphic() && !matches!(c, '[' | ']' | '\\'))
            })
            .unwrap_or(false);
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

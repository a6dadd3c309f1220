//! MIME encoding for outbound messages.
//!
//! Provides RFC 5322 compliant formatting with:
//! - Header encoding (RFC 2047 encoded words, B and Q)
//! - Quoted-printable and Base64 body encoding
//! - Header folding and SMTP dot-stuffing

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;

use crate::charset::{is_header_safe_ascii, Charset, CharsetError, HeaderEncodingStyle, WordEncoding};

/// Longest encoded word permitted by RFC 2047.
const MAX_ENCODED_WORD_LEN: usize = 75;

/// Hard limit on a header line, CRLF excluded (RFC 5322 section 2.1.1).
pub const MAX_LINE_LEN: usize = 998;

/// Line length used for base64 bodies.
const BASE64_LINE_LEN: usize = 76;

/// Characters that force a display name into a quoted string.
const PHRASE_SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// Quoted-printable encoding.
    #[default]
    QuotedPrintable,
    /// Base64 encoding.
    Base64,
}

impl TransferEncoding {
    /// Returns the header value.
    pub fn header_value(&self) -> &'static str {
        match self {
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
        }
    }

    /// Encodes body bytes (already in the target charset, CRLF line breaks).
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        match self {
            TransferEncoding::QuotedPrintable => encode_quoted_printable(data),
            TransferEncoding::Base64 => encode_base64_lines(data),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header_value())
    }
}

/// Returns the Content-Type value for a plain text body.
pub fn text_content_type(charset: Charset) -> String {
    format!("{}; charset={}", ::mime::TEXT_PLAIN, charset.name())
}

/// Encodes header text, leaving plain printable ASCII untouched.
pub fn encode_text(text: &str, charset: Charset) -> Result<String, CharsetError> {
    if is_header_safe_ascii(text) {
        return Ok(text.to_string());
    }
    encode_words(text, charset)
}

/// Encodes a display name according to the charset's header style.
///
/// Names left unencoded are quoted when they contain RFC 5322 specials.
pub fn encode_display_name(name: &str, charset: Charset) -> Result<String, CharsetError> {
    let policy = charset.policy();
    if policy.header_style == HeaderEncodingStyle::WhenNeeded && is_header_safe_ascii(name) {
        return Ok(quote_phrase(name));
    }
    encode_words(name, charset)
}

/// Encodes text as one or more RFC 2047 encoded words separated by spaces.
///
/// Every word is encoded on its own so stateful charsets (ISO-2022-JP) return
/// to ASCII inside each word.
pub fn encode_words(text: &str, charset: Charset) -> Result<String, CharsetError> {
    let encoding = charset.policy().word_encoding;
    let overhead = charset.name().len() + 7;
    let budget = MAX_ENCODED_WORD_LEN.saturating_sub(overhead);

    let mut words = Vec::new();
    let mut chunk = String::new();

    for c in text.chars() {
        let mut candidate = chunk.clone();
        candidate.push(c);
        let encoded = encode_payload(&charset.encode(&candidate)?, encoding);

        if encoded.len() > budget && !chunk.is_empty() {
            words.push(encode_payload(&charset.encode(&chunk)?, encoding));
            chunk = c.to_string();
        } else {
            chunk = candidate;
        }
    }

    if !chunk.is_empty() || words.is_empty() {
        words.push(encode_payload(&charset.encode(&chunk)?, encoding));
    }

    Ok(words
        .into_iter()
        .map(|payload| format!("=?{}?{}?{}?=", charset.name(), encoding.letter(), payload))
        .collect::<Vec<_>>()
        .join(" "))
}

fn encode_payload(bytes: &[u8], encoding: WordEncoding) -> String {
    match encoding {
        WordEncoding::Base64 => BASE64.encode(bytes),
        WordEncoding::Quoted => {
            let mut out = String::with_capacity(bytes.len() * 3);
            for &b in bytes {
                match b {
                    b' ' => out.push('_'),
                    b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/' => {
                        out.push(char::from(b))
                    }
                    _ => out.push_str(&format!("={:02X}", b)),
                }
            }
            out
        }
    }
}

/// Quotes a display name if it contains specials.
fn quote_phrase(name: &str) -> String {
    if name.contains(PHRASE_SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        name.to_string()
    }
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped; other text is
/// kept as is.
pub fn decode_encoded_words(value: &str) -> Result<String, CharsetError> {
    let mut output = String::new();
    let mut rest = value;
    let mut pending_space = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        match parse_encoded_word(rest)? {
            Some((decoded, consumed)) => {
                if !last_was_word {
                    output.push_str(&pending_space);
                }
                pending_space.clear();
                output.push_str(&decoded);
                rest = &rest[consumed..];
                last_was_word = true;
            }
            None => {
                let mut chars = rest.chars();
                let c = chars.next().unwrap_or_default();
                if c.is_whitespace() {
                    pending_space.push(c);
                } else {
                    output.push_str(&pending_space);
                    pending_space.clear();
                    output.push(c);
                    last_was_word = false;
                }
                rest = chars.as_str();
            }
        }
    }

    output.push_str(&pending_space);
    Ok(output)
}

/// Parses one encoded word at the start of `input`, returning the decoded
/// text and the number of bytes consumed.
fn parse_encoded_word(input: &str) -> Result<Option<(String, usize)>, CharsetError> {
    let Some(body) = input.strip_prefix("=?") else {
        return Ok(None);
    };
    let mut parts = body.splitn(3, '?');
    let (Some(label), Some(kind), Some(tail)) = (parts.next(), parts.next(), parts.next()) else {
        return Ok(None);
    };
    let Some(end) = tail.find("?=") else {
        return Ok(None);
    };
    let payload = &tail[..end];
    let consumed = 2 + label.len() + 1 + kind.len() + 1 + end + 2;

    let charset = Charset::lookup(label)?;
    let bytes = match kind {
        "B" | "b" => BASE64
            .decode(payload)
            .map_err(|e| CharsetError::Malformed(e.to_string()))?,
        "Q" | "q" => decode_q_payload(payload)?,
        _ => return Ok(None),
    };

    Ok(Some((charset.decode(&bytes)?, consumed)))
}

fn decode_q_payload(payload: &str) -> Result<Vec<u8>, CharsetError> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = payload
                    .get(i + 1..i + 3)
                    .ok_or_else(|| CharsetError::Malformed(payload.to_string()))?;
                let value = u8::from_str_radix(hex, 16)
                    .map_err(|_| CharsetError::Malformed(payload.to_string()))?;
                out.push(value);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Ok(out)
}

/// Normalizes line breaks to CRLF.
pub fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n")
}

/// Encodes text using quoted-printable, one line at a time so hard line
/// breaks stay CRLF.
fn encode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut lines = split_crlf(data).peekable();
    while let Some(line) = lines.next() {
        output.extend_from_slice(&quoted_printable::encode(line));
        if lines.peek().is_some() {
            output.extend_from_slice(b"\r\n");
        }
    }
    output
}

fn split_crlf(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(data);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                rest = Some(&current[pos + 2..]);
                Some(&current[..pos])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// Base64 encodes with line wrapping.
fn encode_base64_lines(data: &[u8]) -> Vec<u8> {
    let encoded = BASE64.encode(data);
    let mut output = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2);
    for (i, chunk) in encoded.as_bytes().chunks(BASE64_LINE_LEN).enumerate() {
        if i > 0 {
            output.extend_from_slice(b"\r\n");
        }
        output.extend_from_slice(chunk);
    }
    output
}

/// Returns true if `name: value` can be folded into lines within
/// [`MAX_LINE_LEN`]. Folding only happens at spaces, so every token must fit.
pub fn fits_line_limit(name: &str, value: &str) -> bool {
    let mut tokens = value.split(' ');
    let first = tokens.next().unwrap_or_default();
    name.len() + 2 + first.len() <= MAX_LINE_LEN
        && tokens.all(|token| 1 + token.len() <= MAX_LINE_LEN)
}

/// Folds a header line at 78 characters.
pub fn fold_header(header: &str) -> String {
    if header.len() <= 78 {
        return header.to_string();
    }

    let mut result = String::new();
    let mut current_line = String::new();

    for word in header.split(' ') {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= 76 {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push_str(&current_line);
            result.push_str("\r\n ");
            current_line = word.to_string();
        }
    }

    result.push_str(&current_line);
    result
}

/// Prepares the DATA content with dot-stuffing.
pub fn prepare_data_content(encoded_email: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(encoded_email.len() + 100);
    let mut at_line_start = true;

    for &byte in encoded_email {
        if at_line_start && byte == b'.' {
            // Dot-stuffing: double dots at start of line
            output.push(b'.');
        }

        output.push(byte);
        at_line_start = byte == b'\n';
    }

    // Ensure CRLF at end
    if !output.ends_with(b"\r\n") {
        if output.ends_with(b"\n") {
            output.pop();
        }
        output.extend_from_slice(b"\r\n");
    }

    // End with <CRLF>.<CRLF>
    output.extend_from_slice(b".\r\n");

    output
}

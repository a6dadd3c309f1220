//! Charset lookup and the per-charset encoding policy.
//!
//! Everything that varies with the requested charset (how header words are
//! encoded, whether ASCII display names are encoded anyway, and which
//! Content-Transfer-Encoding the body gets) comes from one table lookup
//! instead of branches spread through message assembly.

use std::fmt;
use thiserror::Error;

use crate::mime::TransferEncoding;

/// Charset applied when a request does not name one.
pub const DEFAULT_CHARSET: &str = "ISO-2022-JP";

/// Errors raised while transcoding text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharsetError {
    /// The charset label is not one we can produce.
    #[error("Unsupported charset: {0}")]
    Unsupported(String),
    /// The text contains characters the charset cannot represent.
    #[error("Text cannot be represented in {0}")]
    Unmappable(&'static str),
    /// An encoded word or byte sequence could not be decoded.
    #[error("Malformed encoded text: {0}")]
    Malformed(String),
}

/// RFC 2047 encoded-word flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoding {
    /// "B" encoding (base64 payload).
    Base64,
    /// "Q" encoding (quoted-printable-like payload).
    Quoted,
}

impl WordEncoding {
    /// Returns the encoding letter used inside the encoded word.
    pub fn letter(&self) -> char {
        match self {
            WordEncoding::Base64 => 'B',
            WordEncoding::Quoted => 'Q',
        }
    }
}

/// When display names are turned into encoded words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncodingStyle {
    /// Every display name is encoded, ASCII or not.
    Always,
    /// Only names that are not plain printable ASCII are encoded.
    WhenNeeded,
}

/// Encoding decisions attached to a charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingPolicy {
    /// Encoded-word flavour for header text.
    pub word_encoding: WordEncoding,
    /// Display-name encoding style.
    pub header_style: HeaderEncodingStyle,
    /// Content-Transfer-Encoding for the body.
    pub body_encoding: TransferEncoding,
}

/// Charsets messages can be composed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    /// 7-bit ASCII.
    UsAscii,
    /// Latin-1.
    Iso8859_1,
    /// 7-bit Japanese (JIS).
    #[default]
    Iso2022Jp,
    /// Shift_JIS.
    ShiftJis,
    /// EUC-JP.
    EucJp,
    /// UTF-8.
    Utf8,
}

impl Charset {
    /// Looks up a charset by label, ignoring case and surrounding whitespace.
    pub fn lookup(label: &str) -> Result<Self, CharsetError> {
        let normalized = label.trim().to_ascii_lowercase();
        let charset = match normalized.as_str() {
            "us-ascii" | "ascii" | "us_ascii" => Charset::UsAscii,
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" => Charset::Iso8859_1,
            "iso-2022-jp" | "csiso2022jp" => Charset::Iso2022Jp,
            "shift_jis" | "shift-jis" | "sjis" | "ms_kanji" => Charset::ShiftJis,
            "euc-jp" | "eucjp" | "x-euc-jp" => Charset::EucJp,
            "utf-8" | "utf8" => Charset::Utf8,
            _ => return Err(CharsetError::Unsupported(label.to_string())),
        };
        Ok(charset)
    }

    /// Returns the effective charset label: the requested one, or the default
    /// when absent or empty.
    pub fn effective_label(requested: Option<&str>) -> &str {
        match requested {
            Some(label) if !label.is_empty() => label,
            _ => DEFAULT_CHARSET,
        }
    }

    /// Returns the canonical MIME name.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Iso2022Jp => "ISO-2022-JP",
            Charset::ShiftJis => "Shift_JIS",
            Charset::EucJp => "EUC-JP",
            Charset::Utf8 => "UTF-8",
        }
    }

    /// Returns the encoding policy for this charset.
    pub fn policy(&self) -> EncodingPolicy {
        use HeaderEncodingStyle::{Always, WhenNeeded};
        use TransferEncoding::{Base64, QuotedPrintable};
        use WordEncoding::{Base64 as B, Quoted as Q};

        let (word_encoding, header_style, body_encoding) = match self {
            Charset::Iso2022Jp => (B, Always, QuotedPrintable),
            Charset::UsAscii => (Q, WhenNeeded, QuotedPrintable),
            Charset::Iso8859_1 => (Q, WhenNeeded, QuotedPrintable),
            Charset::Utf8 => (B, WhenNeeded, Base64),
            Charset::ShiftJis => (B, WhenNeeded, Base64),
            Charset::EucJp => (B, WhenNeeded, Base64),
        };

        EncodingPolicy {
            word_encoding,
            header_style,
            body_encoding,
        }
    }

    /// Encodes text into this charset.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, CharsetError> {
        if let Some(codec) = self.legacy_codec() {
            let (bytes, _, had_errors) = codec.encode(text);
            return if had_errors {
                Err(CharsetError::Unmappable(self.name()))
            } else {
                Ok(bytes.into_owned())
            };
        }

        match self {
            Charset::UsAscii if !text.is_ascii() => Err(CharsetError::Unmappable(self.name())),
            Charset::Iso8859_1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| CharsetError::Unmappable(self.name())))
                .collect(),
            _ => Ok(text.as_bytes().to_vec()),
        }
    }

    /// Decodes bytes produced in this charset.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, CharsetError> {
        let malformed = || CharsetError::Malformed(format!("invalid {} sequence", self.name()));

        if let Some(codec) = self.legacy_codec() {
            return codec
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
                .ok_or_else(malformed);
        }

        match self {
            Charset::UsAscii if !bytes.is_ascii() => Err(malformed()),
            Charset::UsAscii | Charset::Iso8859_1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            _ => String::from_utf8(bytes.to_vec()).map_err(|_| malformed()),
        }
    }

    /// Returns true if the text can be represented in this charset.
    pub fn can_encode(&self, text: &str) -> bool {
        self.encode(text).is_ok()
    }

    /// Multi-byte Japanese charsets go through `encoding_rs`.
    fn legacy_codec(&self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            Charset::Iso2022Jp => Some(encoding_rs::ISO_2022_JP),
            Charset::ShiftJis => Some(encoding_rs::SHIFT_JIS),
            Charset::EucJp => Some(encoding_rs::EUC_JP),
            _ => None,
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Returns true if the text can go into a header without encoding.
pub fn is_header_safe_ascii(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ISO-2022-JP", Charset::Iso2022Jp)]
    #[case("iso-2022-jp", Charset::Iso2022Jp)]
    #[case(" UTF-8 ", Charset::Utf8)]
    #[case("utf8", Charset::Utf8)]
    #[case("Shift_JIS", Charset::ShiftJis)]
    #[case("EUC-JP", Charset::EucJp)]
    #[case("US-ASCII", Charset::UsAscii)]
    #[case("latin1", Charset::Iso8859_1)]
    fn test_lookup(#[case] label: &str, #[case] expected: Charset) {
        assert_eq!(Charset::lookup(label).unwrap(), expected);
    }

    #[test]
    fn test_lookup_unsupported() {
        assert_eq!(
            Charset::lookup("X-UNKNOWN"),
            Err(CharsetError::Unsupported("X-UNKNOWN".to_string()))
        );
    }

    #[test]
    fn test_effective_label() {
        assert_eq!(Charset::effective_label(None), DEFAULT_CHARSET);
        assert_eq!(Charset::effective_label(Some("")), DEFAULT_CHARSET);
        assert_eq!(Charset::effective_label(Some("UTF-8")), "UTF-8");
        assert_eq!(Charset::lookup(DEFAULT_CHARSET).unwrap(), Charset::default());
    }

    #[test]
    fn test_policy_table() {
        let jis = Charset::Iso2022Jp.policy();
        assert_eq!(jis.body_encoding, TransferEncoding::QuotedPrintable);
        assert_eq!(jis.header_style, HeaderEncodingStyle::Always);
        assert_eq!(jis.word_encoding, WordEncoding::Base64);

        let utf8 = Charset::Utf8.policy();
        assert_eq!(utf8.body_encoding, TransferEncoding::Base64);
        assert_eq!(utf8.header_style, HeaderEncodingStyle::WhenNeeded);

        assert_eq!(Charset::Iso8859_1.policy().word_encoding, WordEncoding::Quoted);
    }

    #[test]
    fn test_iso_2022_jp_is_seven_bit_and_round_trips() {
        let text = "メール件名";
        let bytes = Charset::Iso2022Jp.encode(text).unwrap();
        assert!(bytes.is_ascii());
        // Starts with ESC $ B, ends back in ASCII
        assert_eq!(&bytes[..3], b"\x1b$B");
        assert!(bytes.ends_with(b"\x1b(B"));
        assert_eq!(Charset::Iso2022Jp.decode(&bytes).unwrap(), text);
    }

    #[test]
    fn test_unmappable_text() {
        assert_eq!(
            Charset::UsAscii.encode("Grüße"),
            Err(CharsetError::Unmappable("US-ASCII"))
        );
        assert!(Charset::Iso8859_1.can_encode("Grüße"));
        assert!(!Charset::Iso8859_1.can_encode("メール"));
        assert!(!Charset::Iso2022Jp.can_encode("😀"));
        assert!(Charset::Utf8.can_encode("😀"));
    }

    #[test]
    fn test_latin1_round_trip() {
        let bytes = Charset::Iso8859_1.encode("café").unwrap();
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(Charset::Iso8859_1.decode(&bytes).unwrap(), "café");
    }

    #[test]
    fn test_header_safe_ascii() {
        assert!(is_header_safe_ascii("Taro Yamada"));
        assert!(!is_header_safe_ascii("Taro\tYamada"));
        assert!(!is_header_safe_ascii("山田"));
    }
}

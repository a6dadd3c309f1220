//! Request parsing.
//!
//! Send requests arrive as untyped JSON. Every field goes through a typed
//! accessor that treats a missing key (or `null`) as absent and rejects a
//! value of the wrong type with an error naming the key.

use serde_json::{Map, Value};

use crate::errors::{MailError, MailResult};
use crate::types::{AddressRecord, MailRequest};

/// Request keys.
pub mod keys {
    /// To recipients.
    pub const TO: &str = "to";
    /// Cc recipients.
    pub const CC: &str = "cc";
    /// Bcc recipients.
    pub const BCC: &str = "bcc";
    /// Reply-To addresses.
    pub const REPLY_TO: &str = "reply-to";
    /// Sender address.
    pub const FROM: &str = "from";
    /// Subject line.
    pub const SUBJECT: &str = "subject";
    /// Plain text body.
    pub const TEXT: &str = "text";
    /// Charset label.
    pub const CHARSET: &str = "charset";
    /// Envelope sender override.
    pub const ENVELOPE_FROM: &str = "envelope-from";
    /// Custom headers.
    pub const HEADERS: &str = "headers";
    /// Address of an address record.
    pub const ADDRESS: &str = "address";
    /// Display name of an address record.
    pub const NAME: &str = "name";
}

/// Typed view over an untyped JSON object.
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RequestRecord<'a> {
    /// Wraps a JSON value, which must be an object.
    pub fn new(value: &'a Value) -> MailResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(MailError::request("Invalid argument for send method.: null.")),
            _ => Err(MailError::cast_failed("object")),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        match self.fields.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Returns the string at `key`.
    pub fn string(&self, key: &str) -> MailResult<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(MailError::wrong_type(key)),
        }
    }

    /// Returns the array at `key`.
    pub fn array(&self, key: &str) -> MailResult<Option<&'a Vec<Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(_) => Err(MailError::wrong_type(key)),
        }
    }

    /// Returns the object at `key`.
    pub fn object(&self, key: &str) -> MailResult<Option<RequestRecord<'a>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(fields)) => Ok(Some(RequestRecord { fields })),
            Some(_) => Err(MailError::wrong_type(key)),
        }
    }

    /// Iterates the raw entries of the object.
    pub fn entries(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.fields.iter()
    }
}

/// Parses a send request.
pub fn parse_request(value: &Value) -> MailResult<MailRequest> {
    let record = RequestRecord::new(value)?;

    Ok(MailRequest {
        to: address_list(&record, keys::TO)?,
        cc: address_list(&record, keys::CC)?,
        bcc: address_list(&record, keys::BCC)?,
        reply_to: address_list(&record, keys::REPLY_TO)?,
        from: record
            .object(keys::FROM)?
            .map(|from| address_record(&from))
            .transpose()?,
        subject: owned(record.string(keys::SUBJECT)?),
        text: owned(record.string(keys::TEXT)?),
        charset: owned(record.string(keys::CHARSET)?),
        envelope_from: owned(record.string(keys::ENVELOPE_FROM)?),
        headers: headers(&record)?,
    })
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn address_list(record: &RequestRecord<'_>, key: &str) -> MailResult<Option<Vec<AddressRecord>>> {
    let Some(items) = record.array(key)? else {
        return Ok(None);
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(fields) => address_record(&RequestRecord { fields }),
            _ => Err(MailError::cast_failed("object")),
        })
        .collect::<MailResult<Vec<_>>>()
        .map(Some)
}

fn address_record(record: &RequestRecord<'_>) -> MailResult<AddressRecord> {
    let field = |key: &str| match record.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(MailError::cast_failed("string")),
    };

    Ok(AddressRecord {
        address: field(keys::ADDRESS)?,
        name: field(keys::NAME)?,
    })
}

fn headers(record: &RequestRecord<'_>) -> MailResult<Option<Vec<(String, Option<String>)>>> {
    let Some(headers) = record.object(keys::HEADERS)? else {
        return Ok(None);
    };

    headers
        .entries()
        .map(|(name, value)| {
            let value = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(MailError::wrong_type(keys::HEADERS))
                }
            };
            Ok((name.clone(), value))
        })
        .collect::<MailResult<Vec<_>>>()
        .map(Some)
}

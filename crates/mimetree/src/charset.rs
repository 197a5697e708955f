//! Byte/text conversion for MIME charset labels, built on encoding_rs.
//!
//! encoding_rs implements the WHATWG Encoding Standard, which maps the
//! `us-ascii` and `iso-8859-1` labels onto windows-1252.  MIME content
//! needs those two to be strict, so they are handled here directly.

use crate::MailParsingError;
use encoding_rs::Encoding;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CharsetError {
    #[error("unknown charset {0:?}")]
    Unknown(String),
    #[error("illegal byte sequence for charset {0}")]
    IllegalSequence(&'static str),
}

impl From<CharsetError> for MailParsingError {
    fn from(err: CharsetError) -> Self {
        Self::Charset(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Latin1,
    Utf8,
    Other(&'static Encoding),
}

impl Charset {
    pub fn for_label(label: &str) -> Result<Self, CharsetError> {
        let label = label.trim().trim_matches('"');
        match label.to_ascii_lowercase().as_str() {
            "us-ascii" | "ascii" | "ansi_x3.4-1968" | "iso646-us" | "csascii" => Ok(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "iso_8859-1:1987" | "latin1" | "l1"
            | "iso-ir-100" | "ibm819" | "cp819" | "csisolatin1" => Ok(Self::Latin1),
            _ => match Encoding::for_label(label.as_bytes()) {
                Some(enc) if enc == encoding_rs::UTF_8 => Ok(Self::Utf8),
                Some(enc) => Ok(Self::Other(enc)),
                None => Err(CharsetError::Unknown(label.to_string())),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii => "us-ascii",
            Self::Latin1 => "iso-8859-1",
            Self::Utf8 => "utf-8",
            Self::Other(enc) => enc.name(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, CharsetError> {
        match self {
            Self::Ascii if bytes.is_ascii() => Ok(String::from_utf8_lossy(bytes).into_owned()),
            Self::Ascii => Err(CharsetError::IllegalSequence(self.name())),
            Self::Latin1 => Ok(encoding_rs::mem::decode_latin1(bytes).into_owned()),
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|_| CharsetError::IllegalSequence(self.name())),
            Self::Other(enc) => enc
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned)
                .ok_or(CharsetError::IllegalSequence(enc.name())),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, CharsetError> {
        match self {
            Self::Ascii if text.is_ascii() => Ok(text.as_bytes().to_vec()),
            Self::Ascii => Err(CharsetError::IllegalSequence(self.name())),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(c).map_err(|_| CharsetError::IllegalSequence(self.name())))
                .collect(),
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Other(enc) => {
                // UTF-16 and the replacement encoding have no encoder
                if enc.output_encoding() != *enc {
                    return Err(CharsetError::IllegalSequence(enc.name()));
                }
                let (bytes, _, had_errors) = enc.encode(text);
                if had_errors {
                    return Err(CharsetError::IllegalSequence(enc.name()));
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

/// Converts `bytes` from one charset to another
pub fn convert(bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>, CharsetError> {
    let text = Charset::for_label(from)?.decode(bytes)?;
    Charset::for_label(to)?.encode(&text)
}

/// Decodes `bytes` as text in the charset named by `label`.
/// When the label is unknown or the bytes are not valid in that
/// charset, UTF-8 is tried next and ISO-8859-1 last; the latter
/// maps every byte and so this never fails.
pub fn decode_text(label: &str, bytes: &[u8]) -> String {
    let declared = Charset::for_label(label);
    let err = match declared.clone().and_then(|cs| cs.decode(bytes)) {
        Ok(text) => return text,
        Err(err) => err,
    };

    if declared != Ok(Charset::Utf8) {
        if let Ok(text) = Charset::Utf8.decode(bytes) {
            tracing::debug!(charset = label, "{err}, decoded as utf-8 instead");
            return text;
        }
    }

    tracing::debug!(charset = label, "{err}, decoded as iso-8859-1 instead");
    encoding_rs::mem::decode_latin1(bytes).into_owned()
}

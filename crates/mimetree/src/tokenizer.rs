//! Splits a raw message into its header fields and body without
//! interpreting any of the bytes as text.

use crate::{MailParsingError, Result};
use bstr::BString;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Header {
        /// The field name, excluding any folding before the colon
        name: Range<usize>,
        /// Everything after the colon up to, but not including,
        /// the terminating CRLF
        body: Range<usize>,
        /// The complete header including its terminating CRLF
        full: Range<usize>,
    },
    /// The bytes following the CRLF that separates the header
    /// section from the body. May be empty.
    Body(Range<usize>),
}

impl Token {
    /// The range of input consumed by this token
    pub fn span(&self) -> Range<usize> {
        match self {
            Self::Header { full, .. } => full.clone(),
            Self::Body(body) => body.start - 2..body.end,
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    (0x21..0x80).contains(&b) && b != b':'
}

fn is_wsp(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Returns true if `data` has a CRLF at `idx` that is followed by
/// a space or tab, which makes it a fold rather than a line ending
fn is_fold(data: &[u8], idx: usize) -> bool {
    data.get(idx..idx + 3)
        .map(|s| s[0] == b'\r' && s[1] == b'\n' && is_wsp(s[2]))
        .unwrap_or(false)
}

/// Attempts to match a header field starting at `start`
fn match_header(data: &[u8], start: usize) -> Option<Token> {
    let mut idx = start;
    while idx < data.len() && is_name_byte(data[idx]) {
        idx += 1;
    }
    if idx == start {
        return None;
    }
    let name = start..idx;

    // Folding whitespace is permitted between the name and the colon
    loop {
        if data.get(idx).copied().map(is_wsp).unwrap_or(false) {
            idx += 1;
        } else if is_fold(data, idx) {
            idx += 3;
        } else {
            break;
        }
    }
    if data.get(idx) != Some(&b':') {
        return None;
    }
    let body_start = idx + 1;

    let mut search_from = body_start;
    for crlf in memchr::memmem::find_iter(&data[body_start..], b"\r\n") {
        let crlf = body_start + crlf;
        if crlf < search_from {
            continue;
        }
        if is_fold(data, crlf) {
            search_from = crlf + 2;
            continue;
        }
        return Some(Token::Header {
            name,
            body: body_start..crlf,
            full: start..crlf + 2,
        });
    }

    None
}

/// Splits `data` into headers and an optional body.
/// `base_offset` is added to the offset reported in errors so that
/// errors in nested parts refer to positions in the outermost buffer.
pub fn tokenize(data: &[u8], base_offset: usize) -> Result<Vec<Token>> {
    let mut tokens = vec![];
    let mut idx = 0;

    while idx < data.len() {
        if data[idx..].starts_with(b"\r\n") {
            tokens.push(Token::Body(idx + 2..data.len()));
            break;
        }

        match match_header(data, idx) {
            Some(token) => {
                idx = token.span().end;
                tokens.push(token);
            }
            None => {
                let line_end = memchr::memmem::find(&data[idx..], b"\r\n")
                    .map(|n| idx + n)
                    .unwrap_or(data.len());
                return Err(MailParsingError::Tokenize {
                    offset: base_offset + idx,
                    text: BString::from(&data[idx..line_end]),
                });
            }
        }
    }

    Ok(tokens)
}

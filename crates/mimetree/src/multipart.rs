//! Locates the boundary delimiters of a multipart body (RFC 2046 5.1.1)

use crate::{MailParsingError, Result};
use std::ops::Range;

/// Checks the characters permitted in a boundary:
/// `bcharsnospace` plus space, without a trailing space
pub fn validate_boundary(boundary: &str) -> Result<()> {
    fn is_bchar(c: char) -> bool {
        c.is_ascii_alphanumeric() || " '()+_,-./:=?".contains(c)
    }

    if boundary.is_empty() {
        return Err(MailParsingError::parameter("boundary", "is empty"));
    }
    if let Some(c) = boundary.chars().find(|&c| !is_bchar(c)) {
        return Err(MailParsingError::parameter(
            "boundary",
            format!("{boundary:?} contains invalid character {c:?}"),
        ));
    }
    if boundary.ends_with(' ') {
        return Err(MailParsingError::parameter(
            "boundary",
            format!("{boundary:?} must not end with a space"),
        ));
    }
    Ok(())
}

/// Where the pieces of a multipart body are, relative to that body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultipartLayout {
    pub preamble: Option<Range<usize>>,
    pub parts: Vec<Range<usize>>,
    pub epilogue: Option<Range<usize>>,
}

enum Marker {
    Delimiter,
    Close,
}

fn skip_wsp(body: &[u8], mut idx: usize) -> usize {
    while idx < body.len() && (body[idx] == b' ' || body[idx] == b'\t') {
        idx += 1;
    }
    idx
}

/// Classifies the line beginning at `after`, which immediately follows
/// a `--boundary` match.  Returns the marker type and the position just
/// past the end of the line, including its CRLF.
fn classify(body: &[u8], after: usize) -> Option<(Marker, usize)> {
    let (marker, idx) = if body[after..].starts_with(b"--") {
        (Marker::Close, skip_wsp(body, after + 2))
    } else {
        (Marker::Delimiter, skip_wsp(body, after))
    };
    if idx == body.len() {
        Some((marker, idx))
    } else if body[idx..].starts_with(b"\r\n") {
        Some((marker, idx + 2))
    } else {
        None
    }
}

/// Scans `body` for the delimiters of `boundary`.
/// `base_offset` is the absolute position of `body` within the original
/// message and is used only for error reporting.
pub fn scan(body: &[u8], boundary: &str, base_offset: usize) -> Result<MultipartLayout> {
    let dash_boundary = format!("--{boundary}");
    let mut layout = MultipartLayout::default();
    let mut part_start: Option<usize> = None;
    let mut end_found = false;

    for pos in memchr::memmem::find_iter(body, dash_boundary.as_bytes()) {
        if pos != 0 && (pos < 2 || &body[pos - 2..pos] != b"\r\n") {
            continue;
        }
        let Some((marker, line_end)) = classify(body, pos + dash_boundary.len()) else {
            continue;
        };
        // The CRLF that precedes a delimiter is part of the delimiter
        let marker_start = pos.saturating_sub(2);

        match marker {
            Marker::Delimiter if end_found => {}
            Marker::Delimiter => {
                match part_start {
                    None => {
                        if marker_start > 0 {
                            layout.preamble = Some(0..marker_start);
                        }
                    }
                    Some(start) => layout.parts.push(start..marker_start.max(start)),
                }
                part_start = Some(line_end);
            }
            Marker::Close if end_found => {
                return Err(MailParsingError::MultipartStructure(format!(
                    "redundant copy of close-delimiter at offset {}",
                    base_offset + pos
                )));
            }
            Marker::Close => {
                let start = part_start.ok_or_else(|| {
                    MailParsingError::MultipartStructure(
                        "close-delimiter found before any dash-boundary".to_string(),
                    )
                })?;
                layout.parts.push(start..marker_start.max(start));
                end_found = true;
                if line_end < body.len() {
                    layout.epilogue = Some(line_end..body.len());
                }
            }
        }
    }

    if part_start.is_none() {
        return Err(MailParsingError::MultipartStructure(format!(
            "no dash-boundary ({dash_boundary}) found"
        )));
    }
    if !end_found {
        return Err(MailParsingError::MultipartStructure(format!(
            "no close-delimiter ({dash_boundary}--) found"
        )));
    }

    tracing::trace!(
        boundary,
        parts = layout.parts.len(),
        "located multipart delimiters"
    );
    Ok(layout)
}

#[cfg(test)]
mod test {
    use super::*;

    fn pieces<'a>(body: &'a [u8], layout: &MultipartLayout) -> Vec<&'a [u8]> {
        layout.parts.iter().map(|r| &body[r.clone()]).collect()
    }

    #[test]
    fn boundaries() {
        assert!(validate_boundary("simple boundary").is_ok());
        assert!(validate_boundary("=_aB0+/:?_=").is_ok());
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary("trailing ").is_err());
        k9::assert_equal!(
            validate_boundary("semi;colon").unwrap_err().to_string(),
            "Content-Type parameter boundary: \"semi;colon\" contains invalid character ';'"
        );
    }

    #[test]
    fn preamble_parts_epilogue() {
        let body = b"preamble\r\n--B\r\none\r\n--B \t\r\ntwo\r\n--B--\r\nepilogue\r\n";
        let layout = scan(body, "B", 0).unwrap();
        k9::assert_equal!(&body[layout.preamble.clone().unwrap()], b"preamble");
        k9::assert_equal!(pieces(body, &layout), vec![&b"one"[..], &b"two"[..]]);
        k9::assert_equal!(&body[layout.epilogue.clone().unwrap()], b"epilogue\r\n");
    }

    #[test]
    fn no_preamble_or_epilogue() {
        let body = b"--B\r\none\r\n--B--";
        let layout = scan(body, "B", 0).unwrap();
        k9::assert_equal!(layout.preamble, None);
        k9::assert_equal!(layout.epilogue, None);
        k9::assert_equal!(pieces(body, &layout), vec![&b"one"[..]]);

        let layout = scan(b"--B\r\none\r\n--B--\r\n", "B", 0).unwrap();
        k9::assert_equal!(layout.epilogue, None);
    }

    #[test]
    fn lookalike_lines_are_content() {
        let body = b"--B\r\n--Bogus\r\nx--B\r\n--B--x\r\n--B--\r\n";
        let layout = scan(body, "B", 0).unwrap();
        k9::assert_equal!(pieces(body, &layout), vec![&b"--Bogus\r\nx--B\r\n--B--x"[..]]);
    }

    #[test]
    fn shared_crlf_is_empty_part() {
        let body = b"--B\r\n--B\r\nx\r\n--B--\r\n";
        let layout = scan(body, "B", 0).unwrap();
        k9::assert_equal!(pieces(body, &layout), vec![&b""[..], &b"x"[..]]);
    }

    #[test]
    fn delimiters_after_close_are_epilogue() {
        let body = b"--B\r\nx\r\n--B--\r\n--B\r\ny\r\n";
        let layout = scan(body, "B", 0).unwrap();
        k9::assert_equal!(layout.parts.len(), 1);
        k9::assert_equal!(&body[layout.epilogue.clone().unwrap()], b"--B\r\ny\r\n");
    }

    #[test]
    fn structure_errors() {
        k9::assert_equal!(
            scan(b"no delimiters here\r\n", "B", 0).unwrap_err().to_string(),
            "no dash-boundary (--B) found"
        );
        k9::assert_equal!(
            scan(b"--B\r\nunterminated\r\n", "B", 0).unwrap_err().to_string(),
            "no close-delimiter (--B--) found"
        );
        k9::assert_equal!(
            scan(b"--B--\r\n--B\r\n", "B", 0).unwrap_err().to_string(),
            "close-delimiter found before any dash-boundary"
        );
        k9::assert_equal!(
            scan(b"--B\r\nx\r\n--B--\r\n--B--\r\n", "B", 100).unwrap_err().to_string(),
            "redundant copy of close-delimiter at offset 115"
        );
    }
}

use nom::error::{ContextError, ErrorKind};
use nom_locate::LocatedSpan;
use std::fmt::{Debug, Write};

pub(crate) type Span<'a> = LocatedSpan<&'a str>;
pub(crate) type IResult<'a, O> = nom::IResult<Span<'a>, O, ParseError<Span<'a>>>;

pub(crate) fn make_span(s: &str) -> Span {
    Span::new(s)
}

#[derive(Debug)]
pub enum ParseErrorKind {
    Context(&'static str),
    Char(char),
    Nom(ErrorKind),
    External(String),
}

#[derive(Debug)]
pub struct ParseError<I: Debug> {
    pub errors: Vec<(I, ParseErrorKind)>,
}

impl<I: Debug> ContextError<I> for ParseError<I> {
    fn add_context(input: I, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ParseErrorKind::Context(ctx)));
        other
    }
}

impl<I: Debug> nom::error::ParseError<I> for ParseError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        Self {
            errors: vec![(input, ParseErrorKind::Nom(kind))],
        }
    }

    fn append(input: I, kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, ParseErrorKind::Nom(kind)));
        other
    }

    fn from_char(input: I, c: char) -> Self {
        Self {
            errors: vec![(input, ParseErrorKind::Char(c))],
        }
    }
}

impl<I: Debug, E: std::fmt::Display> nom::error::FromExternalError<I, E> for ParseError<I> {
    fn from_external_error(input: I, _kind: ErrorKind, err: E) -> Self {
        Self {
            errors: vec![(input, ParseErrorKind::External(format!("{err:#}")))],
        }
    }
}

pub(crate) fn make_context_error<S: Into<String>>(
    input: Span,
    reason: S,
) -> nom::Err<ParseError<Span>> {
    nom::Err::Error(ParseError {
        errors: vec![(input, ParseErrorKind::External(reason.into()))],
    })
}

/// Renders the chain of nom errors as one line per entry, giving the
/// byte offset into the header value and the text remaining there.
pub(crate) fn explain_nom(err: nom::Err<ParseError<Span<'_>>>) -> String {
    let e = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => return "incomplete input".to_string(),
    };

    let mut result = String::new();
    for (span, kind) in &e.errors {
        let offset = span.location_offset();
        let remaining: String = span
            .fragment()
            .chars()
            .take(24)
            .map(|c| match c {
                '\t' => '\u{2409}',
                '\r' => '\u{240d}',
                '\n' => '\u{240a}',
                _ => c,
            })
            .collect();
        let at = if remaining.is_empty() {
            "end of input".to_string()
        } else {
            format!("{remaining:?}")
        };
        if !result.is_empty() {
            result.push_str("; ");
        }
        match kind {
            ParseErrorKind::Char(c) => write!(&mut result, "expected '{c}' at {offset}, found {at}"),
            ParseErrorKind::Context(ctx) => write!(&mut result, "in {ctx} at {offset}"),
            ParseErrorKind::Nom(kind) => write!(&mut result, "{kind:?} at {offset}, found {at}"),
            ParseErrorKind::External(reason) => write!(&mut result, "{reason} at {offset}"),
        }
        .ok();
    }
    result
}

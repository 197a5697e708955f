use super::lexical::{comment, fws, quoted_content};
use crate::nom_utils::{make_span, IResult, Span};
use crate::{MailParsingError, Result};
use chrono::{DateTime, FixedOffset};
use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, tuple};

/// The clauses of a Received field, keyed by their lowercased
/// keyword (`from`, `by`, `via`, `with`, `id`, `for`), along with
/// the timestamp that follows the final semicolon
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedTrace {
    pub clauses: Vec<(String, String)>,
    pub date: DateTime<FixedOffset>,
}

impl ReceivedTrace {
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.clauses
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
            .map(|(_, v)| v.as_str())
    }
}

const CLAUSE_KEYWORDS: &[&str] = &["from", "by", "via", "with", "id", "for"];

/// Removes comments and unfolds, leaving single spaces between words
fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if depth > 0 => escaped = true,
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth > 0 => {}
            c if c.is_whitespace() => {
                if !result.ends_with(' ') {
                    result.push(' ');
                }
            }
            c => result.push(c),
        }
    }
    result.trim().to_string()
}

/// Parses an RFC 5322 date-time, including the obsolete two digit
/// years and alphabetic zones, ignoring comments such as `(PDT)`
pub(crate) fn date_time(text: &str) -> Result<DateTime<FixedOffset>> {
    let cleaned = strip_comments(text);
    DateTime::parse_from_rfc2822(&cleaned)
        .map_err(|err| MailParsingError::HeaderParse(format!("date-time {cleaned:?}: {err:#}")))
}

/// Locates the semicolon that introduces the date, ignoring any that
/// appear within comments or quoted strings
fn find_date_separator(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    let mut found = None;
    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if depth > 0 || quoted => escaped = true,
            '"' if depth == 0 => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted && depth > 0 => depth -= 1,
            ';' if depth == 0 && !quoted => found = Some(idx),
            _ => {}
        }
    }
    found
}

enum Item {
    Comment(String),
    Word(String),
}

fn received_item(input: Span) -> IResult<Item> {
    delimited(
        opt(fws),
        alt((
            map(comment, |s: Span| Item::Comment(s.fragment().to_string())),
            map(
                recognize(tuple((char('"'), quoted_content, char('"')))),
                |s: Span| Item::Word(s.fragment().to_string()),
            ),
            map(
                recognize(tuple((char('<'), take_while(|c: char| c != '>'), char('>')))),
                |s: Span| Item::Word(s.fragment().to_string()),
            ),
            map(
                take_while1(|c: char| !c.is_whitespace() && c != '('),
                |s: Span| Item::Word(s.fragment().to_string()),
            ),
        )),
        opt(fws),
    )(input)
}

pub(crate) fn received(text: &str) -> Result<ReceivedTrace> {
    let separator = find_date_separator(text).ok_or_else(|| {
        MailParsingError::HeaderParse("Received: no ';' before the date".to_string())
    })?;
    let date = date_time(&text[separator + 1..])?;

    let span = make_span(&text[..separator]);
    let (_, items) = all_consuming(many0(received_item))(span)
        .map_err(|err| MailParsingError::HeaderParse(crate::nom_utils::explain_nom(err)))?;

    let mut clauses: Vec<(String, String)> = vec![];
    for item in items {
        match item {
            Item::Word(word)
                if CLAUSE_KEYWORDS
                    .iter()
                    .any(|k| k.eq_ignore_ascii_case(&word)) =>
            {
                clauses.push((word.to_ascii_lowercase(), String::new()));
            }
            Item::Word(text) | Item::Comment(text) => match clauses.last_mut() {
                Some((_, value)) => {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(&text);
                }
                None if text.starts_with('(') => {
                    // qmail and friends lead with a comment
                }
                None => {
                    return Err(MailParsingError::HeaderParse(format!(
                        "Received: unexpected {text:?} before any clause"
                    )))
                }
            },
        }
    }

    Ok(ReceivedTrace { clauses, date })
}

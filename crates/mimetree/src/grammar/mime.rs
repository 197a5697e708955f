use super::lexical::{cfws, is_tspecial, mime_token, quoted_string};
use crate::nom_utils::{IResult, Span};
use crate::{MailParsingError, Result};
use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, u32 as decimal};
use nom::combinator::{map, map_res, opt};
use nom::error::context;
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferEncoding {
    #[default]
    #[serde(rename = "7bit")]
    SevenBit,
    #[serde(rename = "8bit")]
    EightBit,
    #[serde(rename = "binary")]
    Binary,
    #[serde(rename = "quoted-printable")]
    QuotedPrintable,
    #[serde(rename = "base64")]
    Base64,
}

impl TransferEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

impl std::fmt::Display for TransferEncoding {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for TransferEncoding {
    type Err = MailParsingError;
    fn from_str(s: &str) -> Result<Self> {
        for candidate in [
            Self::SevenBit,
            Self::EightBit,
            Self::Binary,
            Self::QuotedPrintable,
            Self::Base64,
        ] {
            if s.eq_ignore_ascii_case(candidate.as_str()) {
                return Ok(candidate);
            }
        }
        Err(MailParsingError::TransferEncoding(format!(
            "unsupported mechanism {s:?}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeVersion {
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Lowercased attribute name
    pub name: String,
    /// The value with any quoting, RFC 2231 continuations
    /// and charset encoding resolved
    pub value: String,
}

/// Shared parameter handling for Content-Type and Content-Disposition
pub trait ParameterList {
    fn parameters(&self) -> &[Parameter];
    fn parameters_mut(&mut self) -> &mut Vec<Parameter>;

    fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    fn get_all<'a>(&'a self, name: &str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        let name = name.to_string();
        Box::new(
            self.parameters()
                .iter()
                .filter(move |p| p.name.eq_ignore_ascii_case(&name))
                .map(|p| p.value.as_str()),
        )
    }

    /// Returns the value of a parameter that must not appear with
    /// differing values more than once
    fn get_unique(&self, name: &str) -> Result<Option<&str>> {
        let mut values = self.get_all(name);
        let first = values.next();
        if let Some(first) = first {
            if values.any(|other| other != first) {
                return Err(MailParsingError::parameter(
                    name,
                    "specified more than once with conflicting values",
                ));
            }
        }
        Ok(first)
    }

    /// Replaces every occurrence of `name`, keeping the position of the
    /// first, or appends it when not already present
    fn set(&mut self, name: &str, value: &str) {
        let params = self.parameters_mut();
        let mut seen = false;
        params.retain_mut(|p| {
            if !p.name.eq_ignore_ascii_case(name) {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            p.value = value.to_string();
            true
        });
        if !seen {
            params.push(Parameter {
                name: name.to_ascii_lowercase(),
                value: value.to_string(),
            });
        }
    }

    fn remove(&mut self, name: &str) {
        self.parameters_mut()
            .retain(|p| !p.name.eq_ignore_ascii_case(name));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercased top level media type, such as `text`
    pub media_type: String,
    /// Lowercased subtype, such as `plain`
    pub subtype: String,
    pub parameters: Vec<Parameter>,
}

impl ContentType {
    pub fn new(media_type: &str, subtype: &str) -> Self {
        Self {
            media_type: media_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: vec![],
        }
    }

    /// The implied type of a body that has no Content-Type header
    pub fn default_text() -> Self {
        let mut ct = Self::new("text", "plain");
        ct.set("charset", "utf-8");
        ct
    }

    /// The implied type of a multipart/digest member without a Content-Type
    pub fn default_digest_member() -> Self {
        Self::new("message", "rfc822")
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type == "multipart"
    }

    pub fn is_text(&self) -> bool {
        self.media_type == "text"
    }

    /// message/rfc822 and its RFC 6532 counterpart message/global
    pub fn is_encapsulated_message(&self) -> bool {
        self.media_type == "message" && (self.subtype == "rfc822" || self.subtype == "global")
    }

    /// The validated boundary of a multipart type
    pub fn boundary(&self) -> Result<String> {
        let boundary = self
            .get_unique("boundary")?
            .ok_or_else(|| MailParsingError::parameter("boundary", "missing"))?;
        crate::multipart::validate_boundary(boundary)?;
        Ok(boundary.to_string())
    }

    /// The charset of a text type, defaulting to us-ascii per RFC 2046
    pub fn charset(&self) -> Result<&str> {
        Ok(self.get_unique("charset")?.unwrap_or("us-ascii"))
    }
}

impl ParameterList for ContentType {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
    fn parameters_mut(&mut self) -> &mut Vec<Parameter> {
        &mut self.parameters
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub parameters: Vec<Parameter>,
}

impl ParameterList for ContentDisposition {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
    fn parameters_mut(&mut self) -> &mut Vec<Parameter> {
        &mut self.parameters
    }
}

fn is_attribute_char(c: char) -> bool {
    super::lexical::is_token_char(c) && !matches!(c, '*' | '\'' | '%')
}

struct RawParameter {
    name: String,
    section: Option<u32>,
    extended: bool,
    value: String,
}

fn parameter(input: Span) -> IResult<RawParameter> {
    context(
        "parameter",
        map(
            tuple((
                take_while1(is_attribute_char),
                opt(preceded(char('*'), decimal)),
                opt(char('*')),
                opt(cfws),
                char('='),
                opt(cfws),
                alt((
                    quoted_string,
                    map(take_while1(super::lexical::is_token_char), |s: Span| {
                        s.fragment().to_string()
                    }),
                )),
            )),
            |(name, section, star, _, _, _, value)| RawParameter {
                name: name.fragment().to_ascii_lowercase(),
                section,
                extended: star.is_some(),
                value,
            },
        ),
    )(input)
}

fn percent_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            if let Some(b) = bytes
                .get(idx + 1..idx + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                result.push(b);
                idx += 3;
                continue;
            }
        }
        result.push(bytes[idx]);
        idx += 1;
    }
    result
}

/// Splits an RFC 2231 extended initial value into charset and the
/// still percent-encoded text, discarding the language
fn split_extended(value: &str) -> (Option<&str>, &str) {
    let mut fields = value.splitn(3, '\'');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(charset), Some(_language), Some(text)) => {
            (Some(charset).filter(|cs| !cs.is_empty()), text)
        }
        _ => (None, value),
    }
}

/// Resolves RFC 2231 extended values and continuations, preserving
/// the position of each parameter's first appearance
fn combine_parameters(raw: Vec<RawParameter>) -> Vec<Parameter> {
    let mut params: Vec<Parameter> = vec![];
    let mut continued: Vec<(usize, Vec<RawParameter>)> = vec![];

    for p in raw {
        if p.section.is_none() {
            let value = if p.extended {
                let (charset, text) = split_extended(&p.value);
                crate::charset::decode_text(charset.unwrap_or("utf-8"), &percent_decode(text))
            } else {
                p.value
            };
            params.push(Parameter {
                name: p.name,
                value,
            });
            continue;
        }

        match continued
            .iter_mut()
            .find(|(idx, _)| params[*idx].name == p.name)
        {
            Some((_, sections)) => sections.push(p),
            None => {
                params.push(Parameter {
                    name: p.name.clone(),
                    value: String::new(),
                });
                continued.push((params.len() - 1, vec![p]));
            }
        }
    }

    for (idx, mut sections) in continued {
        sections.sort_by_key(|p| p.section);
        let mut charset = None;
        let mut bytes = vec![];
        for (n, p) in sections.iter().enumerate() {
            if p.extended {
                let text = if n == 0 {
                    let (cs, text) = split_extended(&p.value);
                    charset = cs;
                    text
                } else {
                    p.value.as_str()
                };
                bytes.extend(percent_decode(text));
            } else {
                bytes.extend_from_slice(p.value.as_bytes());
            }
        }
        params[idx].value = crate::charset::decode_text(charset.unwrap_or("utf-8"), &bytes);
    }

    params
}

fn parameter_list(input: Span) -> IResult<Vec<Parameter>> {
    map(
        terminated(
            many0(preceded(
                pair(opt(char(';')), opt(cfws)),
                terminated(parameter, opt(cfws)),
            )),
            opt(pair(char(';'), opt(cfws))),
        ),
        combine_parameters,
    )(input)
}

pub(crate) fn content_type(input: Span) -> IResult<ContentType> {
    context(
        "content type",
        map(
            tuple((
                delimited(opt(cfws), mime_token, opt(cfws)),
                char('/'),
                delimited(opt(cfws), mime_token, opt(cfws)),
                parameter_list,
            )),
            |(media_type, _, subtype, parameters)| ContentType {
                media_type,
                subtype,
                parameters,
            },
        ),
    )(input)
}

pub(crate) fn content_disposition(input: Span) -> IResult<ContentDisposition> {
    context(
        "content disposition",
        map(
            pair(delimited(opt(cfws), mime_token, opt(cfws)), parameter_list),
            |(disposition, parameters)| ContentDisposition {
                disposition,
                parameters,
            },
        ),
    )(input)
}

pub(crate) fn content_transfer_encoding(input: Span) -> IResult<TransferEncoding> {
    context(
        "content transfer encoding",
        map_res(
            delimited(opt(cfws), mime_token, opt(cfws)),
            |token| token.parse::<TransferEncoding>(),
        ),
    )(input)
}

pub(crate) fn mime_version(input: Span) -> IResult<MimeVersion> {
    context(
        "mime version",
        map(
            tuple((
                opt(cfws),
                decimal,
                opt(cfws),
                char('.'),
                opt(cfws),
                decimal,
                opt(cfws),
            )),
            |(_, major, _, _, _, minor, _)| MimeVersion { major, minor },
        ),
    )(input)
}

/// Renders a parameter value, quoting it when it is not a bare token
/// and switching to RFC 2231 encoding when it is not ASCII
pub(crate) fn render_parameter(name: &str, value: &str) -> String {
    let is_token = !value.is_empty() && value.chars().all(super::lexical::is_token_char);
    if is_token {
        return format!("{name}={value}");
    }
    if value.chars().all(|c| c == ' ' || c == '\t' || c.is_ascii_graphic()) {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted.push('"');
        return format!("{name}={quoted}");
    }
    let mut encoded = String::new();
    for b in value.bytes() {
        let c = b as char;
        if b.is_ascii_alphanumeric() || (c.is_ascii_graphic() && !is_tspecial(c) && !"*'%".contains(c))
        {
            encoded.push(c);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    format!("{name}*=UTF-8''{encoded}")
}

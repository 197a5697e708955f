//! DKIM-Signature (RFC 6376), the ARC set (RFC 8617) and
//! Authentication-Results (RFC 8601)

use super::lexical::{cfws, fws, quoted_string};
use crate::nom_utils::{make_context_error, IResult, ParseError, Span};
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{char, satisfy, u32 as decimal};
use nom::combinator::{map, opt, recognize};
use nom::error::context;
use nom::multi::{many0, many1, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    /// The value with any folding whitespace removed
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagList(pub Vec<Tag>);

impl TagList {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArcPayload {
    Seal(TagList),
    MessageSignature(TagList),
    AuthenticationResults(AuthenticationResults),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcSet {
    pub instance: u32,
    pub payload: ArcPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropSpec {
    pub ptype: String,
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResInfo {
    pub method: String,
    pub method_version: Option<u32>,
    pub result: String,
    pub reason: Option<String>,
    pub props: Vec<PropSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResults {
    pub serv_id: String,
    pub version: Option<u32>,
    /// Empty when the header says `none`
    pub results: Vec<ResInfo>,
}

type Failure<'a> = nom::Err<ParseError<Span<'a>>>;

const DKIM_REQUIRED: &[&str] = &["v", "a", "b", "bh", "d", "h", "s"];
const ARC_SEAL_REQUIRED: &[&str] = &["i", "a", "b", "d", "s", "cv"];
const ARC_MESSAGE_SIGNATURE_REQUIRED: &[&str] = &["i", "a", "b", "bh", "d", "h", "s"];

fn is_valchar(c: char) -> bool {
    matches!(c, '!'..=':' | '<'..='~')
}

fn tag_name(input: Span) -> IResult<String> {
    map(
        recognize(pair(
            satisfy(|c| c.is_ascii_alphabetic()),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |s: Span| s.fragment().to_string(),
    )(input)
}

/// tag-value = [ tval *( 1*(WSP / FWS) tval ) ]
fn tag_value(input: Span) -> IResult<String> {
    let (input, first) = opt(take_while1(is_valchar))(input)?;
    let Some(first) = first else {
        return Ok((input, String::new()));
    };
    let (input, rest) = many0(preceded(fws, take_while1(is_valchar)))(input)?;
    let mut value = first.fragment().to_string();
    for piece in rest {
        value.push_str(piece.fragment());
    }
    Ok((input, value))
}

fn tag_spec(input: Span) -> IResult<Tag> {
    context(
        "tag spec",
        map(
            tuple((
                delimited(opt(fws), tag_name, opt(fws)),
                char('='),
                delimited(opt(fws), tag_value, opt(fws)),
            )),
            |(name, _, value)| Tag { name, value },
        ),
    )(input)
}

/// tag-list = tag-spec *( ";" tag-spec ) [ ";" ]
fn tag_list(input: Span) -> IResult<TagList> {
    map(
        terminated(
            separated_list1(char(';'), tag_spec),
            opt(pair(char(';'), opt(fws))),
        ),
        TagList,
    )(input)
}

fn require_tags<'a>(
    input: Span<'a>,
    tags: &TagList,
    required: &[&str],
) -> Result<(), Failure<'a>> {
    for name in required {
        if tags.get(name).is_none() {
            return Err(make_context_error(input, format!("missing required tag {name}=")));
        }
    }
    Ok(())
}

pub(crate) fn dkim_signature(input: Span) -> IResult<TagList> {
    let (remain, tags) = context("dkim signature", tag_list)(input)?;
    require_tags(input, &tags, DKIM_REQUIRED)?;
    Ok((remain, tags))
}

fn arc_instance<'a>(input: Span<'a>, tags: &TagList) -> Result<u32, Failure<'a>> {
    tags.get("i")
        .and_then(|i| i.parse::<u32>().ok())
        .filter(|&i| (1..=50).contains(&i))
        .ok_or_else(|| make_context_error(input, "instance i= must be in 1..=50"))
}

pub(crate) fn arc_seal(input: Span) -> IResult<ArcSet> {
    let (remain, tags) = context("arc seal", tag_list)(input)?;
    require_tags(input, &tags, ARC_SEAL_REQUIRED)?;
    let instance = arc_instance(input, &tags)?;
    Ok((
        remain,
        ArcSet {
            instance,
            payload: ArcPayload::Seal(tags),
        },
    ))
}

pub(crate) fn arc_message_signature(input: Span) -> IResult<ArcSet> {
    let (remain, tags) = context("arc message signature", tag_list)(input)?;
    require_tags(input, &tags, ARC_MESSAGE_SIGNATURE_REQUIRED)?;
    let instance = arc_instance(input, &tags)?;
    Ok((
        remain,
        ArcSet {
            instance,
            payload: ArcPayload::MessageSignature(tags),
        },
    ))
}

/// `i=N;` followed by an Authentication-Results payload
pub(crate) fn arc_authentication_results(input: Span) -> IResult<ArcSet> {
    let (remain, (_, instance, _, results)) = context(
        "arc authentication results",
        tuple((
            tuple((opt(cfws), char('i'), opt(cfws), char('='), opt(cfws))),
            decimal,
            pair(opt(cfws), char(';')),
            authentication_results,
        )),
    )(input)?;
    if !(1..=50).contains(&instance) {
        return Err(make_context_error(input, "instance i= must be in 1..=50"));
    }
    Ok((
        remain,
        ArcSet {
            instance,
            payload: ArcPayload::AuthenticationResults(results),
        },
    ))
}

/// RFC 8601 uses the SMTP Keyword for methods, results and ptypes
fn keyword(input: Span) -> IResult<String> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        |s: Span| s.fragment().to_string(),
    )(input)
}

/// A token or a quoted-string
fn value(input: Span) -> IResult<String> {
    alt((
        quoted_string,
        map(
            take_while1(|c: char| {
                !c.is_whitespace() && !c.is_control() && !matches!(c, ';' | '(' | ')' | '"')
            }),
            |s: Span| s.fragment().to_string(),
        ),
    ))(input)
}

fn methodspec(input: Span) -> IResult<(String, Option<u32>, String)> {
    map(
        tuple((
            opt(cfws),
            keyword,
            opt(preceded(tuple((opt(cfws), char('/'), opt(cfws))), decimal)),
            tuple((opt(cfws), char('='), opt(cfws))),
            keyword,
        )),
        |(_, method, version, _, result)| (method, version, result),
    )(input)
}

fn reasonspec(input: Span) -> IResult<String> {
    preceded(
        tuple((tag_no_case("reason"), opt(cfws), char('='), opt(cfws))),
        value,
    )(input)
}

fn propspec(input: Span) -> IResult<PropSpec> {
    map(
        tuple((
            keyword,
            delimited(opt(cfws), char('.'), opt(cfws)),
            keyword,
            delimited(opt(cfws), char('='), opt(cfws)),
            value,
        )),
        |(ptype, _, property, _, value)| PropSpec {
            ptype,
            property,
            value,
        },
    )(input)
}

fn resinfo(input: Span) -> IResult<ResInfo> {
    context(
        "resinfo",
        map(
            tuple((
                opt(cfws),
                char(';'),
                methodspec,
                opt(preceded(opt(cfws), reasonspec)),
                many0(preceded(opt(cfws), propspec)),
            )),
            |(_, _, (method, method_version, result), reason, props)| ResInfo {
                method,
                method_version,
                result,
                reason,
                props,
            },
        ),
    )(input)
}

fn no_result(input: Span) -> IResult<Vec<ResInfo>> {
    map(
        tuple((opt(cfws), char(';'), opt(cfws), tag("none"))),
        |_| vec![],
    )(input)
}

pub(crate) fn authentication_results(input: Span) -> IResult<AuthenticationResults> {
    context(
        "authentication results",
        map(
            tuple((
                opt(cfws),
                value,
                opt(preceded(cfws, decimal)),
                alt((no_result, many1(resinfo))),
                opt(cfws),
            )),
            |(_, serv_id, version, results, _)| AuthenticationResults {
                serv_id,
                version,
                results,
            },
        ),
    )(input)
}

use super::lexical::{atom, cfws, dot_atom_text, fws, is_dtext, obs_list, phrase, word};
use crate::nom_utils::{IResult, Span};
use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::char;
use nom::combinator::{map, opt, recognize, verify};
use nom::error::context;
use nom::multi::{many0, many0_count, many1};
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrSpec {
    pub local_part: String,
    pub domain: String,
}

impl std::fmt::Display for AddrSpec {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}@{}", self.local_part, self.domain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: AddrSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Mailbox(Mailbox),
    Group { name: String, entries: Vec<Mailbox> },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressList(pub Vec<Address>);

impl AddressList {
    /// Iterates every mailbox, including the members of groups
    pub fn mailboxes(&self) -> impl Iterator<Item = &Mailbox> {
        self.0.iter().flat_map(|address| match address {
            Address::Mailbox(mailbox) => std::slice::from_ref(mailbox).iter(),
            Address::Group { entries, .. } => entries.iter(),
        })
    }

    pub fn mailbox_count(&self) -> usize {
        self.mailboxes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn join_dotted((first, rest): (String, Vec<String>)) -> String {
    let mut result = first;
    for piece in rest {
        result.push('.');
        result.push_str(&piece);
    }
    result
}

/// Covers dot-atom, quoted-string and the obsolete
/// word *("." word) forms in one rule
fn local_part(input: Span) -> IResult<String> {
    context(
        "local part",
        map(pair(word, many0(preceded(char('.'), word))), join_dotted),
    )(input)
}

fn domain_literal(input: Span) -> IResult<String> {
    let (input, pieces) = context(
        "domain literal",
        delimited(
            pair(opt(cfws), char('[')),
            many0(preceded(
                opt(fws),
                map(take_while1(is_dtext), |s: Span| s.fragment().to_string()),
            )),
            pair(opt(fws), char(']')),
        ),
    )(input)?;
    let (input, _) = opt(cfws)(input)?;
    Ok((input, format!("[{}]", pieces.join(" "))))
}

fn domain(input: Span) -> IResult<String> {
    context(
        "domain",
        alt((
            domain_literal,
            map(pair(atom, many0(preceded(char('.'), atom))), join_dotted),
        )),
    )(input)
}

pub(crate) fn addr_spec(input: Span) -> IResult<AddrSpec> {
    context(
        "addr spec",
        map(
            separated_pair(local_part, char('@'), domain),
            |(local_part, domain)| AddrSpec { local_part, domain },
        ),
    )(input)
}

/// Source routes from RFC 822, which are parsed and then discarded
fn obs_route(input: Span) -> IResult<Span> {
    recognize(tuple((
        many0_count(pair(opt(cfws), char(','))),
        opt(cfws),
        char('@'),
        domain,
        many0_count(tuple((
            char(','),
            opt(cfws),
            opt(pair(char('@'), domain)),
        ))),
        char(':'),
    )))(input)
}

pub(crate) fn angle_addr(input: Span) -> IResult<AddrSpec> {
    context(
        "angle addr",
        delimited(
            pair(opt(cfws), char('<')),
            preceded(opt(obs_route), addr_spec),
            pair(char('>'), opt(cfws)),
        ),
    )(input)
}

fn name_addr(input: Span) -> IResult<Mailbox> {
    map(pair(opt(phrase), angle_addr), |(name, address)| Mailbox {
        name,
        address,
    })(input)
}

pub(crate) fn mailbox(input: Span) -> IResult<Mailbox> {
    context(
        "mailbox",
        alt((
            name_addr,
            map(addr_spec, |address| Mailbox {
                name: None,
                address,
            }),
        )),
    )(input)
}

pub(crate) fn mailbox_list(input: Span) -> IResult<Vec<Mailbox>> {
    context("mailbox list", obs_list(mailbox))(input)
}

fn group(input: Span) -> IResult<Address> {
    map(
        tuple((
            phrase,
            char(':'),
            opt(alt((mailbox_list, map(cfws, |_| vec![])))),
            char(';'),
            opt(cfws),
        )),
        |(name, _, entries, _, _)| Address::Group {
            name,
            entries: entries.unwrap_or_default(),
        },
    )(input)
}

fn address(input: Span) -> IResult<Address> {
    context("address", alt((map(mailbox, Address::Mailbox), group)))(input)
}

pub(crate) fn address_list(input: Span) -> IResult<AddressList> {
    context("address list", map(obs_list(address), AddressList))(input)
}

/// Bcc may legitimately be empty or contain only comments
pub(crate) fn optional_address_list(input: Span) -> IResult<AddressList> {
    alt((address_list, map(opt(cfws), |_| AddressList::default())))(input)
}

pub(crate) fn mailbox_list_as_addresses(input: Span) -> IResult<AddressList> {
    map(mailbox_list, |list| {
        AddressList(list.into_iter().map(Address::Mailbox).collect())
    })(input)
}

pub(crate) fn single_mailbox(input: Span) -> IResult<AddressList> {
    map(mailbox, |mailbox| AddressList(vec![Address::Mailbox(mailbox)]))(input)
}

/// Return-Path, which may be the null path `<>`
pub(crate) fn path(input: Span) -> IResult<AddressList> {
    alt((
        map(angle_addr, |address| {
            AddressList(vec![Address::Mailbox(Mailbox {
                name: None,
                address,
            })])
        }),
        map(
            tuple((opt(cfws), char('<'), opt(cfws), char('>'), opt(cfws))),
            |_| AddressList::default(),
        ),
    ))(input)
}

fn id_left(input: Span) -> IResult<String> {
    alt((
        map(dot_atom_text, |s: Span| s.fragment().to_string()),
        local_part,
    ))(input)
}

fn no_fold_literal(input: Span) -> IResult<String> {
    map(
        recognize(tuple((char('['), take_while1(is_dtext), char(']')))),
        |s: Span| s.fragment().to_string(),
    )(input)
}

fn id_right(input: Span) -> IResult<String> {
    alt((
        map(dot_atom_text, |s: Span| s.fragment().to_string()),
        no_fold_literal,
        domain,
    ))(input)
}

/// A message identifier, returned without its angle brackets
pub(crate) fn msg_id(input: Span) -> IResult<String> {
    context(
        "msg id",
        delimited(
            pair(opt(cfws), char('<')),
            map(separated_pair(id_left, char('@'), id_right), |(l, r)| {
                format!("{l}@{r}")
            }),
            pair(char('>'), opt(cfws)),
        ),
    )(input)
}

/// References and In-Reply-To.  Tolerates the obsolete phrases and
/// stray commas seen in the wild, but requires at least one msg-id.
pub(crate) fn msg_id_list(input: Span) -> IResult<Vec<String>> {
    map(
        verify(
            many1(alt((
                map(msg_id, Some),
                map(word, |_| None),
                map(pair(char(','), opt(cfws)), |_| None),
            ))),
            |ids: &Vec<Option<String>>| ids.iter().any(Option::is_some),
        ),
        |ids| ids.into_iter().flatten().collect(),
    )(input)
}

fn uri_in_angles(input: Span) -> IResult<String> {
    delimited(
        pair(opt(cfws), char('<')),
        map(
            take_while1(|c: char| c != '>' && !c.is_whitespace()),
            |s: Span| s.fragment().to_string(),
        ),
        pair(char('>'), opt(cfws)),
    )(input)
}

/// RFC 2369 List-* fields: a list of bracketed URIs, or `NO` for List-Post
pub(crate) fn list_uris(input: Span) -> IResult<Vec<String>> {
    context(
        "list uris",
        alt((
            obs_list(uri_in_angles),
            map(tuple((opt(cfws), tag_no_case("NO"), opt(cfws))), |_| vec![]),
        )),
    )(input)
}

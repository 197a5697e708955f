//! RFC 5322 section 3.2 lexical tokens, extended per RFC 6532 so that
//! non-ASCII UTF-8 is accepted wherever printable text is.

use crate::codec::BASE64_RFC2045;
use crate::nom_utils::{make_context_error, IResult, Span};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, satisfy};
use nom::combinator::{map, opt, recognize};
use nom::error::context;
use nom::multi::{many0, many0_count, many1_count, separated_list1};
use nom::sequence::{delimited, pair, preceded, tuple};

pub(crate) fn is_wsp(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_obs_no_ws_ctl(c: char) -> bool {
    matches!(c, '\u{01}'..='\u{08}' | '\u{0b}'..='\u{0c}' | '\u{0e}'..='\u{1f}' | '\u{7f}')
}

pub(crate) fn is_atext(c: char) -> bool {
    match c {
        '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
        | '`' | '{' | '|' | '}' | '~' => true,
        c => c.is_ascii_alphanumeric() || !c.is_ascii(),
    }
}

fn is_ctext(c: char) -> bool {
    match c {
        '\u{21}'..='\u{27}' | '\u{2a}'..='\u{5b}' | '\u{5d}'..='\u{7e}' => true,
        c => is_obs_no_ws_ctl(c) || !c.is_ascii(),
    }
}

fn is_qtext(c: char) -> bool {
    match c {
        '\u{21}' | '\u{23}'..='\u{5b}' | '\u{5d}'..='\u{7e}' => true,
        c => is_obs_no_ws_ctl(c) || !c.is_ascii(),
    }
}

pub(crate) fn is_dtext(c: char) -> bool {
    match c {
        '\u{21}'..='\u{5a}' | '\u{5e}'..='\u{7e}' => true,
        c => is_obs_no_ws_ctl(c) || !c.is_ascii(),
    }
}

/// RFC 2045 tspecials
pub(crate) fn is_tspecial(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '='
    )
}

/// RFC 2045 token characters
pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && c != ' ' && !is_tspecial(c)
}

fn wsp(input: Span) -> IResult<Span> {
    take_while1(is_wsp)(input)
}

/// Folding white space.  Also accepts the obsolete form, where
/// a fold may appear on an otherwise blank continuation line.
pub(crate) fn fws(input: Span) -> IResult<Span> {
    context(
        "fws",
        recognize(many1_count(alt((wsp, recognize(pair(tag("\r\n"), wsp)))))),
    )(input)
}

fn quoted_pair(input: Span) -> IResult<char> {
    preceded(char('\\'), satisfy(|c| c != '\r' && c != '\n'))(input)
}

fn ccontent(input: Span) -> IResult<Span> {
    alt((take_while1(is_ctext), recognize(quoted_pair), comment))(input)
}

pub(crate) fn comment(input: Span) -> IResult<Span> {
    context(
        "comment",
        recognize(tuple((
            char('('),
            many0_count(pair(opt(fws), ccontent)),
            opt(fws),
            char(')'),
        ))),
    )(input)
}

pub(crate) fn cfws(input: Span) -> IResult<Span> {
    context("cfws", recognize(many1_count(alt((fws, comment)))))(input)
}

/// The content between the quotes of a quoted-string, with the quoting
/// removed and any folds unfolded
pub(crate) fn quoted_content(input: Span) -> IResult<String> {
    map(
        many0(alt((
            map(take_while1(is_qtext), |s: Span| s.fragment().to_string()),
            map(quoted_pair, String::from),
            map(fws, |s: Span| s.fragment().replace("\r\n", "")),
        ))),
        |pieces| pieces.concat(),
    )(input)
}

pub(crate) fn quoted_string(input: Span) -> IResult<String> {
    context(
        "quoted string",
        delimited(
            opt(cfws),
            delimited(char('"'), quoted_content, char('"')),
            opt(cfws),
        ),
    )(input)
}

pub(crate) fn atom(input: Span) -> IResult<String> {
    context(
        "atom",
        map(
            delimited(opt(cfws), take_while1(is_atext), opt(cfws)),
            |s: Span| s.fragment().to_string(),
        ),
    )(input)
}

pub(crate) fn dot_atom_text(input: Span) -> IResult<Span> {
    recognize(pair(
        take_while1(is_atext),
        many0_count(pair(char('.'), take_while1(is_atext))),
    ))(input)
}

pub(crate) fn word(input: Span) -> IResult<String> {
    alt((atom, quoted_string))(input)
}

/// An RFC 2231/2045 token, lowercased
pub(crate) fn mime_token(input: Span) -> IResult<String> {
    map(take_while1(is_token_char), |s: Span| {
        s.fragment().to_ascii_lowercase()
    })(input)
}

/// RFC 2047 encoded-word, returned as decoded text
pub(crate) fn encoded_word(input: Span) -> IResult<String> {
    let (remain, (charset, encoding, text)) = context(
        "encoded word",
        delimited(
            tag("=?"),
            tuple((
                take_while1(is_token_char),
                delimited(char('?'), take_while1(|c: char| c.is_ascii_alphabetic()), char('?')),
                take_while(|c: char| c.is_ascii_graphic() && c != '?'),
            )),
            tag("?="),
        ),
    )(input)?;

    let bytes = match *encoding.fragment() {
        "B" | "b" => BASE64_RFC2045
            .decode(text.as_bytes())
            .map_err(|err| make_context_error(input, format!("encoded word: {err:#}")))?,
        "Q" | "q" => quoted_printable::decode(
            text.replace('_', " "),
            quoted_printable::ParseMode::Robust,
        )
        .map_err(|err| make_context_error(input, format!("encoded word: {err:#}")))?,
        other => {
            return Err(make_context_error(
                input,
                format!("unsupported encoded word encoding {other}"),
            ))
        }
    };

    // RFC 2231 permits a language suffix: charset*lang
    let charset = charset.fragment().split('*').next().unwrap_or("utf-8");
    Ok((remain, crate::charset::decode_text(charset, &bytes)))
}

enum PhrasePiece {
    Word(String),
    Encoded(String),
    Dot,
}

fn phrase_word(input: Span) -> IResult<PhrasePiece> {
    alt((
        map(
            delimited(opt(cfws), encoded_word, opt(cfws)),
            PhrasePiece::Encoded,
        ),
        map(word, PhrasePiece::Word),
    ))(input)
}

/// A display name or group name.  Accepts the obsolete form that
/// allows embedded periods, and decodes encoded-words.
pub(crate) fn phrase(input: Span) -> IResult<String> {
    let (input, first) = context("phrase", phrase_word)(input)?;
    let (input, rest) = many0(alt((
        map(phrase_word, Some),
        map(delimited(opt(cfws), char('.'), opt(cfws)), |_| {
            Some(PhrasePiece::Dot)
        }),
        map(cfws, |_| None),
    )))(input)?;

    let mut result = String::new();
    let mut last_was_encoded = false;
    for piece in std::iter::once(first).chain(rest.into_iter().flatten()) {
        match piece {
            PhrasePiece::Dot => {
                result.push('.');
                last_was_encoded = false;
            }
            PhrasePiece::Word(w) => {
                if !result.is_empty() {
                    result.push(' ');
                }
                result.push_str(&w);
                last_was_encoded = false;
            }
            PhrasePiece::Encoded(w) => {
                // White space between adjacent encoded-words is not displayed
                if !result.is_empty() && !last_was_encoded {
                    result.push(' ');
                }
                result.push_str(&w);
                last_was_encoded = true;
            }
        }
    }

    Ok((input, result))
}

/// A comma separated list that tolerates the obsolete empty elements
/// of RFC 5322 section 4.4, requiring at least one real item.
pub(crate) fn obs_list<'a, O, F>(mut item: F) -> impl FnMut(Span<'a>) -> IResult<'a, Vec<O>>
where
    F: FnMut(Span<'a>) -> IResult<'a, O>,
{
    move |input: Span<'a>| {
        let (remain, items) = separated_list1(
            char(','),
            alt((map(|i| item(i), Some), map(opt(cfws), |_| None))),
        )(input)?;
        let items: Vec<O> = items.into_iter().flatten().collect();
        if items.is_empty() {
            return Err(make_context_error(input, "empty list"));
        }
        Ok((remain, items))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nom_utils::make_span;
    use nom::combinator::all_consuming;

    fn full<'a, O>(
        parser: impl FnMut(Span<'a>) -> IResult<'a, O>,
        text: &'a str,
    ) -> Option<O> {
        all_consuming(parser)(make_span(text)).ok().map(|(_, o)| o)
    }

    #[test]
    fn comments_nest() {
        assert!(full(comment, "(a (nested \\) comment) here)").is_some());
        assert!(full(comment, "(unbalanced (comment)").is_none());
        assert!(full(cfws, " (one)\r\n (two) ").is_some());
        assert!(full(cfws, "\r\n").is_none());
    }

    #[test]
    fn quoted_strings_unfold() {
        k9::assert_equal!(
            full(quoted_string, " \"Joe Q.\r\n Public\" ").unwrap(),
            "Joe Q. Public"
        );
        k9::assert_equal!(
            full(quoted_string, r#""with \"escapes\"""#).unwrap(),
            r#"with "escapes""#
        );
    }

    #[test]
    fn phrases() {
        k9::assert_equal!(full(phrase, "Mr. Foo ").unwrap(), "Mr. Foo");
        k9::assert_equal!(
            full(phrase, "Giant; \"Big\" Box").is_none(),
            true
        );
        k9::assert_equal!(
            full(phrase, "=?ISO-8859-1?Q?Andr=E9?= Pirard").unwrap(),
            "André Pirard"
        );
        k9::assert_equal!(
            full(phrase, "=?utf-8?q?one?= =?utf-8?b?dHdv?=").unwrap(),
            "onetwo"
        );
    }

    #[test]
    fn empty_list_elements() {
        k9::assert_equal!(full(obs_list(atom), "a, ,b,").unwrap(), vec!["a", "b"]);
        assert!(full(obs_list(atom), " , ").is_none());
    }
}

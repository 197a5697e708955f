//! Structured header grammars.
//! Each parser works on the unfolded-or-folded field body text and is
//! driven through `parse_structured`, which selects the grammar for a
//! header name from the dispatch table in `structured`.

mod address;
mod auth;
mod lexical;
mod mime;
mod trace;

pub use address::{AddrSpec, Address, AddressList, Mailbox};
pub use auth::{ArcPayload, ArcSet, AuthenticationResults, PropSpec, ResInfo, Tag, TagList};
pub use mime::{
    ContentDisposition, ContentType, MimeVersion, Parameter, ParameterList, TransferEncoding,
};
pub use trace::ReceivedTrace;

pub(crate) use mime::render_parameter;

use crate::nom_utils::{explain_nom, make_span, IResult, Span};
use crate::structured::{field_grammar, FieldGrammar, StructuredValue};
use crate::{MailParsingError, Result};
use nom::combinator::all_consuming;

fn parse_with<'a, R, F>(text: &'a str, parser: F) -> Result<R>
where
    F: FnMut(Span<'a>) -> IResult<'a, R>,
{
    let (_, result) = all_consuming(parser)(make_span(text))
        .map_err(|err| MailParsingError::HeaderParse(explain_nom(err)))?;
    Ok(result)
}

/// Parses `value` using the grammar registered for the header `name`.
/// Names that have no grammar produce a `HeaderParse` error.
pub fn parse_structured(name: &str, value: &str) -> Result<StructuredValue> {
    let grammar = field_grammar(name).ok_or_else(|| {
        MailParsingError::HeaderParse(format!("{name} is not a structured header"))
    })?;

    Ok(match grammar {
        FieldGrammar::MailboxList => {
            StructuredValue::AddressList(parse_with(value, address::mailbox_list_as_addresses)?)
        }
        FieldGrammar::Mailbox => {
            StructuredValue::AddressList(parse_with(value, address::single_mailbox)?)
        }
        FieldGrammar::AddressList => {
            StructuredValue::AddressList(parse_with(value, address::address_list)?)
        }
        FieldGrammar::OptionalAddressList => {
            StructuredValue::AddressList(parse_with(value, address::optional_address_list)?)
        }
        FieldGrammar::Path => StructuredValue::AddressList(parse_with(value, address::path)?),
        FieldGrammar::DateTime => StructuredValue::DateTime(trace::date_time(value)?),
        FieldGrammar::MessageId => {
            StructuredValue::MessageIds(vec![parse_with(value, address::msg_id)?])
        }
        FieldGrammar::MessageIdList => {
            StructuredValue::MessageIds(parse_with(value, address::msg_id_list)?)
        }
        FieldGrammar::MimeVersion => StructuredValue::MimeVersion(parse_with(value, mime::mime_version)?),
        FieldGrammar::ContentType => {
            StructuredValue::ContentType(parse_with(value, mime::content_type)?)
        }
        FieldGrammar::ContentTransferEncoding => StructuredValue::ContentTransferEncoding(
            parse_with(value, mime::content_transfer_encoding)?,
        ),
        FieldGrammar::ContentDisposition => {
            StructuredValue::ContentDisposition(parse_with(value, mime::content_disposition)?)
        }
        FieldGrammar::Received => StructuredValue::Received(trace::received(value)?),
        FieldGrammar::DkimSignature => {
            StructuredValue::DkimSignature(parse_with(value, auth::dkim_signature)?)
        }
        FieldGrammar::ArcSeal => StructuredValue::ArcSet(parse_with(value, auth::arc_seal)?),
        FieldGrammar::ArcMessageSignature => {
            StructuredValue::ArcSet(parse_with(value, auth::arc_message_signature)?)
        }
        FieldGrammar::ArcAuthenticationResults => {
            StructuredValue::ArcSet(parse_with(value, auth::arc_authentication_results)?)
        }
        FieldGrammar::AuthenticationResults => StructuredValue::AuthenticationResults(
            parse_with(value, auth::authentication_results)?,
        ),
        FieldGrammar::ListUris => StructuredValue::ListUris(parse_with(value, address::list_uris)?),
    })
}

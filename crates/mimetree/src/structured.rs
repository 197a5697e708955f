use crate::grammar::{
    render_parameter, AddressList, ArcSet, AuthenticationResults, ContentDisposition,
    ContentType, MimeVersion, ReceivedTrace, TagList, TransferEncoding,
};
use chrono::{DateTime, FixedOffset};

/// The typed value of a header that has a registered grammar
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    AddressList(AddressList),
    DateTime(DateTime<FixedOffset>),
    ContentType(ContentType),
    ContentTransferEncoding(TransferEncoding),
    MimeVersion(MimeVersion),
    MessageIds(Vec<String>),
    ContentDisposition(ContentDisposition),
    DkimSignature(TagList),
    ArcSet(ArcSet),
    AuthenticationResults(AuthenticationResults),
    ListUris(Vec<String>),
    Received(ReceivedTrace),
}

/// Which grammar applies to a header name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldGrammar {
    MailboxList,
    Mailbox,
    AddressList,
    OptionalAddressList,
    Path,
    DateTime,
    MessageId,
    MessageIdList,
    MimeVersion,
    ContentType,
    ContentTransferEncoding,
    ContentDisposition,
    Received,
    DkimSignature,
    ArcSeal,
    ArcMessageSignature,
    ArcAuthenticationResults,
    AuthenticationResults,
    ListUris,
}

pub(crate) fn field_grammar(name: &str) -> Option<FieldGrammar> {
    Some(match name.to_ascii_lowercase().as_str() {
        "from" | "resent-from" => FieldGrammar::MailboxList,
        "sender" | "resent-sender" => FieldGrammar::Mailbox,
        "to" | "cc" | "reply-to" | "resent-to" | "resent-cc" => FieldGrammar::AddressList,
        "bcc" | "resent-bcc" => FieldGrammar::OptionalAddressList,
        "return-path" => FieldGrammar::Path,
        "date" | "resent-date" => FieldGrammar::DateTime,
        "message-id" | "resent-message-id" | "content-id" => FieldGrammar::MessageId,
        "in-reply-to" | "references" => FieldGrammar::MessageIdList,
        "mime-version" => FieldGrammar::MimeVersion,
        "content-type" => FieldGrammar::ContentType,
        "content-transfer-encoding" => FieldGrammar::ContentTransferEncoding,
        "content-disposition" => FieldGrammar::ContentDisposition,
        "received" => FieldGrammar::Received,
        "dkim-signature" => FieldGrammar::DkimSignature,
        "arc-seal" => FieldGrammar::ArcSeal,
        "arc-message-signature" => FieldGrammar::ArcMessageSignature,
        "arc-authentication-results" => FieldGrammar::ArcAuthenticationResults,
        "authentication-results" => FieldGrammar::AuthenticationResults,
        "list-unsubscribe" | "list-subscribe" | "list-help" | "list-post" | "list-owner"
        | "list-archive" => FieldGrammar::ListUris,
        _ => return None,
    })
}

/// Returns true if values of the header `name` are parsed into a
/// `StructuredValue` when a message is loaded
pub fn is_structured_header(name: &str) -> bool {
    field_grammar(name).is_some()
}

/// Runs the grammar for `name` over `value`.
/// A failure is logged and yields `None`; it only becomes an error
/// later, if the sanity checker requires the header to be correct.
pub(crate) fn parse_field(name: &str, value: &str) -> Option<StructuredValue> {
    if !is_structured_header(name) {
        return None;
    }
    match crate::grammar::parse_structured(name, value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(header = name, "unparsed structured header: {err:#}");
            None
        }
    }
}

/// Renders a structured value back into header value text
pub trait EncodeHeaderValue {
    fn encode_value(&self) -> String;
}

impl EncodeHeaderValue for ContentType {
    fn encode_value(&self) -> String {
        let mut result = format!("{}/{}", self.media_type, self.subtype);
        for param in &self.parameters {
            result.push_str(";\r\n\t");
            result.push_str(&render_parameter(&param.name, &param.value));
        }
        result
    }
}

impl EncodeHeaderValue for ContentDisposition {
    fn encode_value(&self) -> String {
        let mut result = self.disposition.clone();
        for param in &self.parameters {
            result.push_str(";\r\n\t");
            result.push_str(&render_parameter(&param.name, &param.value));
        }
        result
    }
}

impl EncodeHeaderValue for TransferEncoding {
    fn encode_value(&self) -> String {
        self.as_str().to_string()
    }
}

impl EncodeHeaderValue for MimeVersion {
    fn encode_value(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl StructuredValue {
    /// Re-renders the value for the variants that are rewritten when
    /// headers are regenerated; other variants keep their original text
    pub fn render(&self) -> Option<String> {
        match self {
            Self::ContentType(ct) => Some(ct.encode_value()),
            Self::ContentTransferEncoding(cte) => Some(cte.encode_value()),
            Self::MimeVersion(v) => Some(v.encode_value()),
            _ => None,
        }
    }
}

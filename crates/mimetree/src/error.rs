use bstr::BString;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MailParsingError {
    /// Bytes that are neither a header nor the body separator
    #[error("unknown string at {offset}: {text:?}")]
    Tokenize { offset: usize, text: BString },
    #[error("{0}")]
    HeaderSyntax(String),
    #[error("{0}")]
    MultipartStructure(String),
    #[error("Content-Type parameter {name}: {reason}")]
    Parameter { name: String, reason: String },
    #[error("Content-Transfer-Encoding: {0}")]
    TransferEncoding(String),
    #[error("charset conversion failed: {0}")]
    Charset(String),
    #[error("invalid header: {0}")]
    HeaderParse(String),
}

impl MailParsingError {
    pub(crate) fn parameter<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

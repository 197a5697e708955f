pub mod charset;
mod codec;
mod error;
pub mod grammar;
mod headermap;
mod message;
pub mod multipart;
mod nom_utils;
pub mod normalize;
mod options;
mod sanity;
mod serialize;
mod strings;
mod structured;
mod tokenizer;

pub use error::MailParsingError;
pub type Result<T> = std::result::Result<T, MailParsingError>;

pub use codec::{decode_transfer, encode_transfer};
pub use grammar::parse_structured;
pub use headermap::{Field, HeaderMap};
pub use message::{Decoded, Message, MessageKind};
pub use options::MessageOptions;
pub use serialize::derive_boundary;
pub use strings::SharedBytes;
pub use structured::{is_structured_header, EncodeHeaderValue, StructuredValue};
pub use tokenizer::{tokenize, Token};

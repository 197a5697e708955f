use crate::charset::{decode_text, Charset};
use crate::codec::{decode_transfer, encode_transfer};
use crate::grammar::{ContentType, ParameterList, TransferEncoding};
use crate::headermap::{Field, HeaderMap};
use crate::options::MessageOptions;
use crate::structured::{EncodeHeaderValue, StructuredValue};
use crate::tokenizer::{tokenize, Token};
use crate::{multipart, MailParsingError, Result, SharedBytes};
use std::borrow::Cow;

/// Selects the header rules and the implied Content-Type of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A top level RFC 5322 message
    Full,
    /// A body part of a multipart entity
    Part,
    /// The content of a message/rfc822 or message/global entity
    MessageRfc822,
    /// A body part of a multipart/digest entity
    MessageDigest,
}

/// Body content with the transfer encoding removed; text types are
/// additionally converted from their charset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Text(String),
    Bytes(Vec<u8>),
}

impl Decoded {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

/// A node in a parsed message tree
#[derive(Debug, Clone)]
pub struct Message {
    pub(crate) raw: SharedBytes,
    pub(crate) kind: MessageKind,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<SharedBytes>,
    pub(crate) decoded: Option<Decoded>,
    pub(crate) preamble: Option<SharedBytes>,
    pub(crate) parts: Vec<Message>,
    pub(crate) epilogue: Option<SharedBytes>,
    default_transfer_encoding: TransferEncoding,
}

impl Message {
    /// Parse CRLF delimited message data into a tree of nodes,
    /// using the default options
    pub fn parse(data: impl Into<SharedBytes>, kind: MessageKind) -> Result<Self> {
        Self::parse_with_options(data, kind, &MessageOptions::default())
    }

    pub fn parse_with_options(
        data: impl Into<SharedBytes>,
        kind: MessageKind,
        options: &MessageOptions,
    ) -> Result<Self> {
        Self::parse_impl(data.into(), kind, options, 0)
    }

    fn parse_impl(
        raw: SharedBytes,
        kind: MessageKind,
        options: &MessageOptions,
        depth: usize,
    ) -> Result<Self> {
        if depth > options.max_depth {
            return Err(MailParsingError::MultipartStructure(format!(
                "MIME nesting deeper than {} levels",
                options.max_depth
            )));
        }

        let mut fields = vec![];
        let mut body = None;
        for token in tokenize(&raw, raw.offset())? {
            match &token {
                Token::Body(range) => body = Some(raw.slice(range.clone())),
                header => fields.extend(Field::from_token(&raw, header)),
            }
        }

        let mut message = Self {
            raw,
            kind,
            headers: HeaderMap::new(fields),
            body,
            decoded: None,
            preamble: None,
            parts: vec![],
            epilogue: None,
            default_transfer_encoding: options.default_transfer_encoding,
        };

        if depth == 0 && options.sanity_check {
            message.sanity_check_headers()?;
        }

        message.decompose(options, depth)?;
        Ok(message)
    }

    fn decompose(&mut self, options: &MessageOptions, depth: usize) -> Result<()> {
        let Some(body) = self.body.clone() else {
            return Ok(());
        };
        let content_type = self.content_type().into_owned();

        if content_type.is_multipart() {
            let boundary = content_type.boundary()?;
            let layout = multipart::scan(&body, &boundary, body.offset())?;
            let child_kind = if content_type.subtype == "digest" {
                MessageKind::MessageDigest
            } else {
                MessageKind::Part
            };

            self.preamble = layout.preamble.map(|range| body.slice(range));
            self.epilogue = layout.epilogue.map(|range| body.slice(range));
            for range in layout.parts {
                let child = Self::parse_impl(body.slice(range), child_kind, options, depth + 1)?;
                self.parts.push(child);
            }
        } else if content_type.is_encapsulated_message() {
            let child = Self::parse_impl(body, MessageKind::MessageRfc822, options, depth + 1)?;
            self.parts.push(child);
        }

        Ok(())
    }

    /// The effective Content-Type of this node.
    /// Falls back to the implied type when the header is absent or
    /// cannot be parsed: message/rfc822 for digest members, otherwise
    /// `text/plain; charset=utf-8`.
    pub fn content_type(&self) -> Cow<'_, ContentType> {
        match self.headers.content_type() {
            Some(ct) => Cow::Borrowed(ct),
            None if self.kind == MessageKind::MessageDigest => {
                Cow::Owned(ContentType::default_digest_member())
            }
            None => Cow::Owned(ContentType::default_text()),
        }
    }

    /// The transfer encoding that applies to the body.
    /// A header that is present but not a recognized mechanism is an error.
    pub fn transfer_encoding(&self) -> Result<TransferEncoding> {
        match self.headers.get_first("Content-Transfer-Encoding") {
            None => Ok(self.default_transfer_encoding),
            Some(field) => match field.parsed() {
                Some(StructuredValue::ContentTransferEncoding(cte)) => Ok(*cte),
                _ => Err(MailParsingError::TransferEncoding(format!(
                    "unsupported mechanism {:?}",
                    field.value()
                ))),
            },
        }
    }

    /// Populates the decoded content of every leaf in the tree
    pub fn decode(&mut self) -> Result<()> {
        if !self.parts.is_empty() {
            for part in &mut self.parts {
                part.decode()?;
            }
            return Ok(());
        }

        let Some(body) = self.body.clone() else {
            return Ok(());
        };
        let bytes = decode_transfer(self.transfer_encoding()?, &body)?;

        let content_type = self.content_type();
        let decoded = if content_type.is_text() {
            Decoded::Text(decode_text(content_type.charset()?, &bytes))
        } else {
            Decoded::Bytes(bytes.into_owned())
        };

        self.decoded = Some(decoded);
        Ok(())
    }

    /// Rebuilds the body of every leaf from its decoded content.
    /// Text that cannot be represented in the declared charset is
    /// written as UTF-8 with quoted-printable transfer encoding, and the
    /// headers are updated to match.
    pub fn encode(&mut self) -> Result<()> {
        if !self.parts.is_empty() {
            for part in &mut self.parts {
                part.encode()?;
            }
            return Ok(());
        }

        let content_type = self.content_type().into_owned();
        let content = match &self.decoded {
            None => return Ok(()),
            Some(Decoded::Bytes(bytes)) => bytes.clone(),
            Some(Decoded::Text(text)) if content_type.is_text() => {
                let label = content_type.charset()?;
                match Charset::for_label(label).and_then(|charset| charset.encode(text)) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::debug!(charset = label, "{err}, encoding as utf-8");
                        let mut utf8 = content_type.clone();
                        utf8.set("charset", "utf-8");
                        self.headers
                            .set_field("Content-Type", &utf8.encode_value());
                        self.headers
                            .set_field("Content-Transfer-Encoding", "quoted-printable");
                        text.as_bytes().to_vec()
                    }
                }
            }
            Some(Decoded::Text(_)) => {
                return Err(MailParsingError::Charset(format!(
                    "{}/{} content must be bytes, not text",
                    content_type.media_type, content_type.subtype
                )));
            }
        };

        let encoding = self.transfer_encoding()?;
        self.body = Some(SharedBytes::from(encode_transfer(encoding, &content)));
        Ok(())
    }

    /// Removes every header named `name` and appends a single
    /// `name: value` header in its place
    pub fn set_field(&mut self, name: &str, value: &str) {
        self.headers.set_field(name, value);
    }

    /// Replaces the decoded content; call `encode` to update the body
    pub fn set_decoded(&mut self, decoded: Decoded) {
        self.decoded = Some(decoded);
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The bytes from which this node was parsed
    pub fn raw(&self) -> &SharedBytes {
        &self.raw
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body bytes, if this node has a body.
    /// An empty body (a header section terminated by a blank line and
    /// nothing more) is distinct from no body at all.
    pub fn body(&self) -> Option<&SharedBytes> {
        self.body.as_ref()
    }

    pub fn decoded(&self) -> Option<&Decoded> {
        self.decoded.as_ref()
    }

    pub fn preamble(&self) -> Option<&SharedBytes> {
        self.preamble.as_ref()
    }

    pub fn epilogue(&self) -> Option<&SharedBytes> {
        self.epilogue.as_ref()
    }

    pub fn parts(&self) -> &[Message] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut [Message] {
        &mut self.parts
    }

    pub fn is_container(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Visits every leaf node, depth first, in document order
    pub fn leaves(&self) -> Vec<&Message> {
        let mut result = vec![];
        self.collect_leaves(&mut result);
        result
    }

    fn collect_leaves<'a>(&'a self, result: &mut Vec<&'a Message>) {
        if self.parts.is_empty() {
            result.push(self);
        }
        for part in &self.parts {
            part.collect_leaves(result);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SIMPLE_BOUNDARY: &str = concat!(
        "From: Nathaniel Borenstein <nsb@bellcore.com>\r\n",
        "To: Ned Freed <ned@innosoft.com>\r\n",
        "Date: Sun, 21 Mar 1993 23:56:48 -0800 (PST)\r\n",
        "Subject: Sample message\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-type: multipart/mixed; boundary=\"simple boundary\"\r\n",
        "\r\n",
        "This is the preamble.  It is to be ignored, though it\r\n",
        "is a handy place for composition agents to include an\r\n",
        "explanatory note to non-MIME conformant readers.\r\n",
        "\r\n",
        "--simple boundary\r\n",
        "\r\n",
        "This is implicitly typed plain US-ASCII text.\r\n",
        "It does NOT end with a linebreak.\r\n",
        "--simple boundary\r\n",
        "Content-type: text/plain; charset=us-ascii\r\n",
        "\r\n",
        "This is explicitly typed plain US-ASCII text.\r\n",
        "It DOES end with a linebreak.\r\n",
        "\r\n",
        "--simple boundary--\r\n",
        "\r\n",
        "This is the epilogue.  It is also to be ignored.\r\n",
    );

    #[test]
    fn simple_boundary() {
        let mut msg = Message::parse(SIMPLE_BOUNDARY, MessageKind::Full).unwrap();
        k9::assert_equal!(msg.parts().len(), 2);
        k9::assert_equal!(
            msg.preamble().unwrap().as_bytes(),
            concat!(
                "This is the preamble.  It is to be ignored, though it\r\n",
                "is a handy place for composition agents to include an\r\n",
                "explanatory note to non-MIME conformant readers.\r\n",
            )
            .as_bytes()
        );
        k9::assert_equal!(
            msg.epilogue().unwrap().as_bytes(),
            b"\r\nThis is the epilogue.  It is also to be ignored.\r\n"
        );

        let first = &msg.parts()[0];
        k9::assert_equal!(first.kind(), MessageKind::Part);
        assert!(first.headers().is_empty());
        k9::assert_equal!(
            first.body().unwrap().as_bytes(),
            b"This is implicitly typed plain US-ASCII text.\r\nIt does NOT end with a linebreak."
        );

        msg.decode().unwrap();
        k9::assert_equal!(
            msg.parts()[1].decoded(),
            Some(&Decoded::Text(
                "This is explicitly typed plain US-ASCII text.\r\nIt DOES end with a linebreak.\r\n"
                    .to_string()
            ))
        );
        assert!(msg.decoded().is_none());
    }

    #[test]
    fn children_share_the_buffer() {
        let msg = Message::parse(SIMPLE_BOUNDARY, MessageKind::Full).unwrap();
        let body = msg.parts()[1].body().unwrap();
        assert!(body.shares_buffer_with(msg.raw()));
        k9::assert_equal!(
            &SIMPLE_BOUNDARY.as_bytes()[body.offset()..body.offset() + body.len()],
            body.as_bytes()
        );
    }

    #[test]
    fn redundant_close_delimiter() {
        let text = concat!(
            "Content-Type: multipart/mixed; boundary=XX\r\n",
            "\r\n",
            "--XX\r\n",
            "\r\n",
            "one\r\n",
            "--XX--\r\n",
            "--XX--\r\n",
        );
        let err = Message::parse(text, MessageKind::Full).unwrap_err();
        k9::assert_equal!(
            err.to_string(),
            "redundant copy of close-delimiter at offset 67"
        );
    }

    #[test]
    fn multipart_needs_boundary() {
        let err = Message::parse(
            "Content-Type: multipart/mixed\r\n\r\nbody\r\n",
            MessageKind::Full,
        )
        .unwrap_err();
        k9::assert_equal!(
            err,
            MailParsingError::Parameter {
                name: "boundary".to_string(),
                reason: "missing".to_string(),
            }
        );
    }

    #[test]
    fn nested_errors_report_absolute_offsets() {
        let text = concat!(
            "Content-Type: multipart/mixed; boundary=A\r\n",
            "\r\n",
            "--A\r\n",
            "Content-Type: text/plain\r\n",
            "stray line\r\n",
            "--A--\r\n",
        );
        let err = Message::parse(text, MessageKind::Full).unwrap_err();
        k9::assert_equal!(err.to_string(), "unknown string at 76: \"stray line\"");
    }

    #[test]
    fn empty_body_vs_no_body() {
        let mut msg = Message::parse("Subject: hello\r\n\r\n", MessageKind::Full).unwrap();
        k9::assert_equal!(msg.body().unwrap().len(), 0);
        msg.decode().unwrap();
        k9::assert_equal!(msg.decoded(), Some(&Decoded::Text(String::new())));

        let mut msg = Message::parse("Subject: hello\r\n", MessageKind::Full).unwrap();
        assert!(msg.body().is_none());
        msg.decode().unwrap();
        assert!(msg.decoded().is_none());

        let err = Message::parse("Subject: hello", MessageKind::Full).unwrap_err();
        k9::assert_equal!(err.to_string(), "unknown string at 0: \"Subject: hello\"");
    }

    #[test]
    fn quoted_printable_latin1() {
        let mut msg = Message::parse(
            concat!(
                "Content-Type: text/plain; charset=ISO-8859-1\r\n",
                "Content-Transfer-Encoding: quoted-printable\r\n",
                "\r\n",
                "Voil=E0, tr=E8s bien=\r\n",
                " fait\r\n",
            ),
            MessageKind::Part,
        )
        .unwrap();
        msg.decode().unwrap();
        k9::assert_equal!(
            msg.decoded(),
            Some(&Decoded::Text("Voilà, très bien fait\r\n".to_string()))
        );
    }

    #[test]
    fn iso_2022_jp_base64() {
        let mut msg = Message::parse(
            concat!(
                "Content-Type: text/plain; charset=\"ISO-2022-JP\"\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "GyRCRnxLXDhsJE4lRiUtJTklSBsoQg==\r\n",
            ),
            MessageKind::Part,
        )
        .unwrap();
        msg.decode().unwrap();
        k9::assert_equal!(
            msg.decoded(),
            Some(&Decoded::Text("日本語のテキスト".to_string()))
        );
    }

    #[test]
    fn unknown_transfer_encoding() {
        let mut msg = Message::parse(
            "Content-Transfer-Encoding: unknown\r\n\r\nbody\r\n",
            MessageKind::Part,
        )
        .unwrap();
        k9::assert_equal!(
            msg.decode().unwrap_err().to_string(),
            "Content-Transfer-Encoding: unsupported mechanism \"unknown\""
        );
    }

    #[test]
    fn default_transfer_encoding_is_configurable() {
        let options = MessageOptions {
            default_transfer_encoding: TransferEncoding::Base64,
            ..MessageOptions::default()
        };
        let mut msg =
            Message::parse_with_options("\r\naGVsbG8=\r\n", MessageKind::Part, &options).unwrap();
        msg.decode().unwrap();
        k9::assert_equal!(msg.decoded(), Some(&Decoded::Text("hello".to_string())));
    }

    #[test]
    fn binary_content() {
        let mut msg = Message::parse(
            concat!(
                "Content-Type: application/octet-stream\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "AAH/\r\n",
            ),
            MessageKind::Part,
        )
        .unwrap();
        msg.decode().unwrap();
        k9::assert_equal!(msg.decoded(), Some(&Decoded::Bytes(vec![0, 1, 255])));

        msg.set_decoded(Decoded::Bytes(vec![255, 254]));
        msg.encode().unwrap();
        k9::assert_equal!(msg.body().unwrap().as_bytes(), b"//4=\r\n");

        msg.set_decoded(Decoded::Text("not bytes".to_string()));
        k9::assert_equal!(
            msg.encode().unwrap_err().to_string(),
            "charset conversion failed: application/octet-stream content must be bytes, not text"
        );
        k9::assert_equal!(msg.body().unwrap().as_bytes(), b"//4=\r\n");
    }

    #[test]
    fn digest_members_default_to_messages() {
        let mut msg = Message::parse(
            concat!(
                "Content-Type: multipart/digest; boundary=\"D\"\r\n",
                "\r\n",
                "--D\r\n",
                "\r\n",
                "From: a@example.com\r\n",
                "Subject: first\r\n",
                "\r\n",
                "body one\r\n",
                "--D\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "not a message\r\n",
                "--D--\r\n",
            ),
            MessageKind::Full,
        )
        .unwrap();

        let member = &msg.parts()[0];
        k9::assert_equal!(member.kind(), MessageKind::MessageDigest);
        k9::assert_equal!(member.content_type().subtype, "rfc822");
        k9::assert_equal!(member.parts().len(), 1);
        let inner = &member.parts()[0];
        k9::assert_equal!(inner.kind(), MessageKind::MessageRfc822);
        k9::assert_equal!(
            inner.headers().get_first("Subject").unwrap().value(),
            "first"
        );

        let explicit = &msg.parts()[1];
        k9::assert_equal!(explicit.kind(), MessageKind::MessageDigest);
        assert!(explicit.parts().is_empty());

        msg.decode().unwrap();
        let leaves: Vec<&[u8]> = msg
            .leaves()
            .into_iter()
            .map(|leaf| leaf.decoded().unwrap().as_bytes())
            .collect();
        k9::assert_equal!(leaves, vec![&b"body one"[..], &b"not a message"[..]]);
    }

    #[test]
    fn imap_nested_message() {
        let text = concat!(
            "From: Fred Foobar <foobar@Blurdybloop.example>\r\n",
            "To: mooch@owatagu.siam.edu.example\r\n",
            "Date: Mon, 7 Feb 1994 21:52:25 -0800 (PST)\r\n",
            "Subject: afternoon meeting\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: text/plain; charset=us-ascii\r\n",
            "\r\n",
            "Hello Joe, do you think we can meet at 3:30 tomorrow?\r\n",
            "--outer\r\n",
            "Content-Type: message/rfc822\r\n",
            "\r\n",
            "From: joe@example.com\r\n",
            "Subject: forwarded\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html</p>\r\n",
            "--inner--\r\n",
            "--outer--\r\n",
        );
        let mut msg = Message::parse(text, MessageKind::Full).unwrap();
        k9::assert_equal!(msg.parts().len(), 2);
        let forwarded = &msg.parts()[1];
        k9::assert_equal!(forwarded.parts().len(), 1);
        let inner = &forwarded.parts()[0];
        k9::assert_equal!(inner.kind(), MessageKind::MessageRfc822);
        k9::assert_equal!(inner.parts().len(), 2);
        k9::assert_equal!(inner.parts()[1].content_type().subtype, "html");

        msg.decode().unwrap();
        k9::assert_equal!(msg.leaves().len(), 3);
        k9::assert_equal!(
            msg.parts()[1].parts()[0].parts()[1].decoded(),
            Some(&Decoded::Text("<p>html</p>".to_string()))
        );
    }

    #[test]
    fn nesting_limit() {
        let options = MessageOptions {
            max_depth: 1,
            ..MessageOptions::default()
        };
        let text = concat!(
            "Content-Type: message/rfc822\r\n",
            "\r\n",
            "Content-Type: message/rfc822\r\n",
            "\r\n",
            "Subject: too deep\r\n",
            "\r\n",
            "x\r\n",
        );
        k9::assert_equal!(
            Message::parse_with_options(text, MessageKind::Full, &options)
                .unwrap_err()
                .to_string(),
            "MIME nesting deeper than 1 levels"
        );
        assert!(Message::parse(text, MessageKind::Full).is_ok());
    }

    #[test]
    fn sanity_check_is_opt_in() {
        let text = "From: foo@example.com\r\n\r\nbody\r\n";
        assert!(Message::parse(text, MessageKind::Full).is_ok());

        let options = MessageOptions {
            sanity_check: true,
            ..MessageOptions::default()
        };
        k9::assert_equal!(
            Message::parse_with_options(text, MessageKind::Full, &options)
                .unwrap_err()
                .to_string(),
            "must have a recipient, one of To:, Cc:, or Bcc:"
        );
    }

    #[test]
    fn encode_falls_back_to_utf8() {
        let mut msg = Message::parse(
            "Content-Type: text/plain; charset=us-ascii\r\n\r\nplain\r\n",
            MessageKind::Part,
        )
        .unwrap();
        msg.decode().unwrap();
        msg.set_decoded(Decoded::Text("naïve\r\n".to_string()));
        msg.encode().unwrap();

        k9::assert_equal!(msg.content_type().charset().unwrap(), "utf-8");
        k9::assert_equal!(
            msg.transfer_encoding().unwrap(),
            TransferEncoding::QuotedPrintable
        );
        k9::assert_equal!(msg.body().unwrap().as_bytes(), b"na=C3=AFve\r\n");
        k9::assert_equal!(msg.headers().count("content-type"), 1);

        msg.decode().unwrap();
        k9::assert_equal!(msg.decoded(), Some(&Decoded::Text("naïve\r\n".to_string())));
    }

    #[test]
    fn encode_in_declared_charset() {
        let text = [
            &b"Content-Type: text/plain; charset=iso-8859-1\r\n"[..],
            b"Content-Transfer-Encoding: 8bit\r\n",
            b"\r\n",
            b"caf\xe8\r\n",
        ]
        .concat();
        let mut msg = Message::parse(text, MessageKind::Part).unwrap();
        msg.decode().unwrap();
        k9::assert_equal!(msg.decoded(), Some(&Decoded::Text("caf\u{e8}\r\n".to_string())));

        msg.set_decoded(Decoded::Text("d\u{e9}j\u{e0} vu\r\n".to_string()));
        msg.encode().unwrap();
        k9::assert_equal!(msg.body().unwrap().as_bytes(), b"d\xe9j\xe0 vu\r\n");
        k9::assert_equal!(msg.content_type().charset().unwrap(), "iso-8859-1");
    }

    #[test]
    fn set_field_replaces_every_occurrence() {
        let mut msg = Message::parse(
            concat!(
                "Received: from a by b; Tue, 14 Aug 2012 17:34:56 -0500\r\n",
                "Received: from c by d; Tue, 14 Aug 2012 17:34:57 -0500\r\n",
                "Subject: hi\r\n",
                "\r\n",
                "body\r\n",
            ),
            MessageKind::Full,
        )
        .unwrap();
        msg.set_field("Received", "from e by f; Tue, 14 Aug 2012 17:35:00 -0500");
        k9::assert_equal!(msg.headers().count("Received"), 1);
        k9::assert_equal!(
            msg.headers().get_first("received").unwrap().value(),
            "from e by f; Tue, 14 Aug 2012 17:35:00 -0500"
        );
    }
}

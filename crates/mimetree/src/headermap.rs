use crate::grammar::{AddressList, ContentType, MimeVersion, TransferEncoding};
use crate::structured::{parse_field, StructuredValue};
use crate::tokenizer::Token;
use crate::SharedBytes;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

/// A single header field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    value: String,
    full_header: SharedBytes,
    parsed: Option<StructuredValue>,
}

impl Field {
    /// Builds a field from a header token produced by the tokenizer,
    /// where the token ranges are relative to `raw`
    pub(crate) fn from_token(raw: &SharedBytes, token: &Token) -> Option<Self> {
        let Token::Header { name, body, full } = token else {
            return None;
        };
        let name = String::from_utf8_lossy(&raw[name.clone()]).into_owned();
        let value = String::from_utf8_lossy(&raw[body.clone()]).trim().to_string();
        let parsed = parse_field(&name, &value);
        Some(Self {
            name,
            value,
            full_header: raw.slice(full.clone()),
            parsed,
        })
    }

    /// Creates a field in canonical `Name: value` form
    pub fn new(name: &str, value: &str) -> Self {
        let value = value.trim().to_string();
        Self {
            name: name.to_string(),
            full_header: SharedBytes::from(format!("{name}: {value}\r\n")),
            parsed: parse_field(name, &value),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The trimmed field body, decoded as UTF-8 with any invalid
    /// sequences replaced
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The bytes of the header exactly as they appeared in the input,
    /// including the terminating CRLF
    pub fn full_header(&self) -> &SharedBytes {
        &self.full_header
    }

    pub fn parsed(&self) -> Option<&StructuredValue> {
        self.parsed.as_ref()
    }

    pub(crate) fn parsed_mut(&mut self) -> Option<&mut StructuredValue> {
        self.parsed.as_mut()
    }

    /// Replaces the value text, keeping the parsed value as-is
    pub(crate) fn replace_value(&mut self, value: String) {
        self.full_header = SharedBytes::from(format!("{}: {value}\r\n", self.name));
        self.value = value;
    }

    /// The number of bytes this field occupies when serialized
    pub(crate) fn encoded_len(&self) -> usize {
        self.name.len() + 2 + self.value.len() + 2
    }
}

/// The ordered header fields of a message, together with an index from
/// lowercased name to the positions at which that name occurs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    headers: Vec<Field>,
    index: HashMap<String, Vec<usize>>,
}

impl HeaderMap {
    pub fn new(headers: Vec<Field>) -> Self {
        let mut map = Self {
            headers,
            index: HashMap::new(),
        };
        map.rebuild_index();
        map
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (idx, field) in self.headers.iter().enumerate() {
            self.index
                .entry(field.name.to_ascii_lowercase())
                .or_default()
                .push(idx);
        }
    }

    pub fn get_first(&self, name: &str) -> Option<&Field> {
        self.iter_named(name).next()
    }

    pub fn iter_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Field> + 'a {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|positions| positions.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&idx| &self.headers[idx])
    }

    pub fn count(&self, name: &str) -> usize {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.headers.iter()
    }

    pub fn fields(&self) -> &[Field] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Mutable access for rewriting values in place.
    /// Names must not be changed through this, as the index is not rebuilt.
    pub(crate) fn fields_mut(&mut self) -> std::slice::IterMut<'_, Field> {
        self.headers.iter_mut()
    }

    /// Removes every occurrence of `name` and appends a single field
    /// with the given value
    pub fn set_field(&mut self, name: &str, value: &str) {
        self.headers
            .retain(|field| !field.name.eq_ignore_ascii_case(name));
        self.headers.push(Field::new(name, value));
        self.rebuild_index();
    }

    fn parsed_first(&self, name: &str) -> Option<&StructuredValue> {
        self.get_first(name).and_then(Field::parsed)
    }

    fn address_list(&self, name: &str) -> Option<&AddressList> {
        match self.parsed_first(name)? {
            StructuredValue::AddressList(list) => Some(list),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        match self.parsed_first("Content-Type")? {
            StructuredValue::ContentType(ct) => Some(ct),
            _ => None,
        }
    }

    pub fn content_transfer_encoding(&self) -> Option<TransferEncoding> {
        match self.parsed_first("Content-Transfer-Encoding")? {
            StructuredValue::ContentTransferEncoding(cte) => Some(*cte),
            _ => None,
        }
    }

    pub fn mime_version(&self) -> Option<MimeVersion> {
        match self.parsed_first("Mime-Version")? {
            StructuredValue::MimeVersion(v) => Some(*v),
            _ => None,
        }
    }

    pub fn from(&self) -> Option<&AddressList> {
        self.address_list("From")
    }

    pub fn sender(&self) -> Option<&AddressList> {
        self.address_list("Sender")
    }

    pub fn to(&self) -> Option<&AddressList> {
        self.address_list("To")
    }

    pub fn cc(&self) -> Option<&AddressList> {
        self.address_list("Cc")
    }

    pub fn bcc(&self) -> Option<&AddressList> {
        self.address_list("Bcc")
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        match self.parsed_first("Date")? {
            StructuredValue::DateTime(date) => Some(*date),
            _ => None,
        }
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;
    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokenize;

    fn headers(text: &str) -> HeaderMap {
        header_bytes(text.as_bytes())
    }

    fn header_bytes(text: &[u8]) -> HeaderMap {
        let raw = SharedBytes::from(text);
        let tokens = tokenize(&raw, 0).unwrap();
        HeaderMap::new(
            tokens
                .iter()
                .filter_map(|t| Field::from_token(&raw, t))
                .collect(),
        )
    }

    #[test]
    fn lookup() {
        let map = headers(concat!(
            "Received: from a by b; Tue, 14 Aug 2012 17:34:56 -0500\r\n",
            "Subject: one\r\n",
            "received: from c by d; Tue, 14 Aug 2012 17:34:57 -0500\r\n",
            "To: someone@example.com\r\n",
        ));
        k9::assert_equal!(map.len(), 4);
        k9::assert_equal!(map.count("RECEIVED"), 2);
        k9::assert_equal!(map.get_first("subject").unwrap().value(), "one");
        let received: Vec<&str> = map.iter_named("Received").map(|f| f.name()).collect();
        k9::assert_equal!(received, vec!["Received", "received"]);
        k9::assert_equal!(map.count("Cc"), 0);
        assert!(map.iter_named("Cc").next().is_none());
        k9::assert_equal!(map.to().unwrap().mailbox_count(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let map = header_bytes(b"X-Broken: \xff\xfe\r\n");
        k9::assert_equal!(map.get_first("X-Broken").unwrap().value(), "\u{fffd}\u{fffd}");
        k9::assert_equal!(
            map.get_first("X-Broken").unwrap().full_header().as_bytes(),
            b"X-Broken: \xff\xfe\r\n"
        );
    }

    #[test]
    fn full_header_is_original() {
        let map = headers("Subject  :\r\n folded\r\n  value \r\n\r\n");
        let field = map.get_first("subject").unwrap();
        k9::assert_equal!(field.name(), "Subject");
        k9::assert_equal!(field.value(), "folded\r\n  value");
        k9::assert_equal!(
            field.full_header().as_bytes(),
            b"Subject  :\r\n folded\r\n  value \r\n"
        );
    }

    #[test]
    fn typed_accessors() {
        let map = headers(concat!(
            "From: Pete <pete@silly.example>\r\n",
            "Date: Fri, 21 Nov 1997 09:55:06 -0600\r\n",
            "Mime-Version: 1.0\r\n",
            "Content-Type: text/plain; charset=\"iso-8859-1\"\r\n",
            "Content-Transfer-Encoding: Quoted-Printable\r\n",
            "Sender: not an address\r\n",
        ));
        k9::assert_equal!(map.from().unwrap().mailbox_count(), 1);
        k9::assert_equal!(
            map.date().unwrap().to_rfc3339(),
            "1997-11-21T09:55:06-06:00"
        );
        k9::assert_equal!(map.mime_version(), Some(MimeVersion { major: 1, minor: 0 }));
        k9::assert_equal!(map.content_type().unwrap().charset().unwrap(), "iso-8859-1");
        k9::assert_equal!(
            map.content_transfer_encoding(),
            Some(TransferEncoding::QuotedPrintable)
        );
        assert!(map.get_first("Sender").unwrap().parsed().is_none());
        assert!(map.sender().is_none());
    }

    #[test]
    fn set_field_replaces_all() {
        let mut map = headers(concat!(
            "Received: from a by b; Tue, 14 Aug 2012 17:34:56 -0500\r\n",
            "Subject: one\r\n",
            "Received: from c by d; Tue, 14 Aug 2012 17:34:57 -0500\r\n",
        ));
        map.set_field("Received", "from e by f; Tue, 14 Aug 2012 17:35:00 -0500");
        k9::assert_equal!(map.count("received"), 1);
        let names: Vec<&str> = map.iter().map(|f| f.name()).collect();
        k9::assert_equal!(names, vec!["Subject", "Received"]);
        let received = map.get_first("received").unwrap();
        assert!(matches!(received.parsed(), Some(StructuredValue::Received(_))));
        k9::assert_equal!(
            received.full_header().as_bytes(),
            b"Received: from e by f; Tue, 14 Aug 2012 17:35:00 -0500\r\n"
        );
    }
}

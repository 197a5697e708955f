//! Reconstructs message bytes from a tree, and rewrites boundaries so
//! that a re-serialized tree cannot collide with its own content.

use crate::grammar::ParameterList;
use crate::message::Message;
use crate::structured::StructuredValue;
use sha2::{Digest, Sha256};

const BOUNDARY_SALT: &[u8] = b"mimetree boundary v1:";

/// Derives the replacement for `boundary`.
/// The result depends only on the original value.
pub fn derive_boundary(boundary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(BOUNDARY_SALT);
    hasher.update(boundary.as_bytes());
    let encoded = data_encoding::BASE64.encode(&hasher.finalize());
    format!("=_{}_=", &encoded[..22])
}

enum BodyLayout<'a> {
    Multipart(String),
    SingleChild(&'a Message),
    Leaf(&'a [u8]),
    Empty,
}

impl Message {
    /// The boundary of the current Content-Type, if it is a multipart
    /// type with a valid boundary
    fn current_boundary(&self) -> Option<String> {
        self.headers
            .content_type()
            .filter(|ct| ct.is_multipart())
            .and_then(|ct| ct.boundary().ok())
    }

    fn body_layout(&self) -> BodyLayout<'_> {
        if !self.parts.is_empty() {
            if let Some(boundary) = self.current_boundary() {
                return BodyLayout::Multipart(boundary);
            }
            if let [child] = self.parts.as_slice() {
                return BodyLayout::SingleChild(child);
            }
        }
        match &self.body {
            Some(body) => BodyLayout::Leaf(body.as_bytes()),
            None => BodyLayout::Empty,
        }
    }

    /// The exact number of bytes that `get_data` will produce
    pub fn data_len(&self) -> usize {
        let headers: usize = self.headers.iter().map(|f| f.encoded_len()).sum();
        let body = match self.body_layout() {
            BodyLayout::Multipart(boundary) => {
                let delimiter = 2 + 2 + boundary.len();
                let parts: usize = self
                    .parts
                    .iter()
                    .map(|part| delimiter + 2 + part.data_len())
                    .sum();
                parts + delimiter + 2
            }
            BodyLayout::SingleChild(child) => 2 + child.data_len(),
            BodyLayout::Leaf(body) => 2 + body.len(),
            BodyLayout::Empty => 0,
        };
        headers + body
    }

    fn write_data(&self, out: &mut Vec<u8>) {
        for field in self.headers.iter() {
            out.extend_from_slice(field.name().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(field.value().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        match self.body_layout() {
            BodyLayout::Multipart(boundary) => {
                for part in &self.parts {
                    out.extend_from_slice(b"\r\n--");
                    out.extend_from_slice(boundary.as_bytes());
                    out.extend_from_slice(b"\r\n");
                    part.write_data(out);
                }
                out.extend_from_slice(b"\r\n--");
                out.extend_from_slice(boundary.as_bytes());
                out.extend_from_slice(b"--");
            }
            BodyLayout::SingleChild(child) => {
                out.extend_from_slice(b"\r\n");
                child.write_data(out);
            }
            BodyLayout::Leaf(body) => {
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(body);
            }
            BodyLayout::Empty => {}
        }
    }

    /// Serializes the tree.
    /// Preambles and epilogues are not emitted.
    pub fn get_data(&self) -> Vec<u8> {
        let expected = self.data_len();
        let mut out = Vec::with_capacity(expected);
        self.write_data(&mut out);
        assert_eq!(out.len(), expected, "data_len disagrees with get_data");
        out
    }

    /// Replaces the boundary of every multipart node in the tree with
    /// one derived from it by `derive_boundary`
    pub fn change_boundary(&mut self) {
        let is_multipart = self
            .headers
            .content_type()
            .map(|ct| ct.is_multipart())
            .unwrap_or(false);
        if is_multipart {
            for field in self.headers.fields_mut() {
                let Some(StructuredValue::ContentType(ct)) = field.parsed_mut() else {
                    continue;
                };
                let Some(original) = ct.get("boundary").map(str::to_string) else {
                    continue;
                };
                let replacement = derive_boundary(&original);
                tracing::trace!(%original, %replacement, "changing boundary");
                ct.set("boundary", &replacement);
                if let Some(value) = field.parsed().and_then(StructuredValue::render) {
                    field.replace_value(value);
                }
            }
        }
        for part in &mut self.parts {
            part.change_boundary();
        }
    }

    /// Regenerates the text of every Content-Type,
    /// Content-Transfer-Encoding and MIME-Version header in the tree
    /// from its parsed value
    pub fn rewrite_headers(&mut self) {
        for field in self.headers.fields_mut() {
            if let Some(value) = field.parsed().and_then(StructuredValue::render) {
                field.replace_value(value);
            }
        }
        for part in &mut self.parts {
            part.rewrite_headers();
        }
    }
}

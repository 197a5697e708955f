use crate::grammar::TransferEncoding;
use crate::{MailParsingError, Result};
use std::borrow::Cow;

/// Define our own because data_encoding::BASE64_MIME, despite its name,
/// is not RFC2045 compliant, and will not ignore spaces
pub(crate) const BASE64_RFC2045: data_encoding::Encoding = data_encoding_macro::new_encoding! {
    symbols: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/",
    padding: '=',
    ignore: " \r\n\t",
    wrap_width: 76,
    wrap_separator: "\r\n",
};

/// Used to recover sloppy base64 once the strict decode has failed:
/// padding is optional and non-zero trailing bits are discarded
const BASE64_LENIENT: data_encoding::Encoding = data_encoding_macro::new_encoding! {
    symbols: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/",
    check_trailing_bits: false,
};

fn decode_base64(body: &[u8]) -> Result<Vec<u8>> {
    match BASE64_RFC2045.decode(body) {
        Ok(decoded) => Ok(decoded),
        Err(strict) => {
            let symbols: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b" \r\n\t".contains(b))
                .take_while(|&b| b != b'=')
                .collect();
            let decoded = BASE64_LENIENT.decode(&symbols).map_err(|err| {
                MailParsingError::TransferEncoding(format!("base64: {err:#}"))
            })?;
            tracing::debug!("recovered malformed base64 body ({strict:#})");
            Ok(decoded)
        }
    }
}

/// Reverses the content transfer encoding of a body
pub fn decode_transfer(encoding: TransferEncoding, body: &[u8]) -> Result<Cow<'_, [u8]>> {
    match encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            Ok(Cow::Borrowed(body))
        }
        TransferEncoding::Base64 => decode_base64(body).map(Cow::Owned),
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(body, quoted_printable::ParseMode::Robust)
                .map(Cow::Owned)
                .map_err(|err| {
                    MailParsingError::TransferEncoding(format!("quoted-printable: {err:#}"))
                })
        }
    }
}

/// Applies a content transfer encoding.
/// The encoded forms always end with a line break; for quoted-printable
/// a soft line break is used when the content itself does not end with
/// one, so that decoding yields exactly `content` again.
pub fn encode_transfer(encoding: TransferEncoding, content: &[u8]) -> Vec<u8> {
    match encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            content.to_vec()
        }
        TransferEncoding::Base64 => {
            let mut encoded = BASE64_RFC2045.encode(content).into_bytes();
            if !encoded.is_empty() && !encoded.ends_with(b"\r\n") {
                encoded.extend_from_slice(b"\r\n");
            }
            encoded
        }
        TransferEncoding::QuotedPrintable => {
            let mut encoded = quoted_printable::encode(content);
            if !encoded.is_empty() && !encoded.ends_with(b"\r\n") {
                encoded.extend_from_slice(b"=\r\n");
            }
            encoded
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base64_ignores_line_breaks() {
        k9::assert_equal!(
            decode_transfer(TransferEncoding::Base64, b"aGVs\r\nbG8g\r\n d29y bGQ=\r\n")
                .unwrap()
                .as_ref(),
            b"hello world"
        );
        assert!(decode_transfer(TransferEncoding::Base64, b"!!!!").is_err());
    }

    #[test]
    fn base64_tolerates_sloppy_padding() {
        for sloppy in [
            &b"aGVsbG8\r\n"[..],
            b"aGVsbG9=",
            b"aGVs\r\nbG8=\r\n=\r\n",
        ] {
            k9::assert_equal!(
                decode_transfer(TransferEncoding::Base64, sloppy)
                    .unwrap()
                    .as_ref(),
                b"hello"
            );
        }
        // A lone trailing symbol cannot hold a whole byte
        k9::assert_equal!(
            decode_transfer(TransferEncoding::Base64, b"aGVsb")
                .unwrap_err()
                .to_string(),
            "Content-Transfer-Encoding: base64: invalid length at 4"
        );
    }

    #[test]
    fn base64_wraps() {
        let content = vec![0u8; 100];
        let encoded = encode_transfer(TransferEncoding::Base64, &content);
        let text = String::from_utf8(encoded.clone()).unwrap();
        for line in text.split_terminator("\r\n") {
            assert!(line.len() <= 76, "{line}");
        }
        assert!(text.ends_with("\r\n"));
        k9::assert_equal!(
            decode_transfer(TransferEncoding::Base64, &encoded).unwrap().as_ref(),
            content.as_slice()
        );
    }

    #[test]
    fn quoted_printable() {
        k9::assert_equal!(
            decode_transfer(TransferEncoding::QuotedPrintable, b"caf=E8 soft=\r\nbreak")
                .unwrap()
                .as_ref(),
            b"caf\xe8 softbreak"
        );

        let encoded = encode_transfer(TransferEncoding::QuotedPrintable, "no newline é".as_bytes());
        assert!(encoded.ends_with(b"=\r\n"));
        k9::assert_equal!(
            decode_transfer(TransferEncoding::QuotedPrintable, &encoded)
                .unwrap()
                .as_ref(),
            "no newline é".as_bytes()
        );

        let encoded = encode_transfer(TransferEncoding::QuotedPrintable, b"line\r\n");
        k9::assert_equal!(encoded, b"line\r\n".to_vec());
    }

    #[test]
    fn identity() {
        let body = b"\x00\xff binary\r\n";
        k9::assert_equal!(
            decode_transfer(TransferEncoding::Binary, body).unwrap().as_ref(),
            body
        );
        k9::assert_equal!(encode_transfer(TransferEncoding::EightBit, body), body.to_vec());
    }
}

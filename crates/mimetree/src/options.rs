use crate::grammar::TransferEncoding;
use serde::{Deserialize, Serialize};

/// Controls how `Message::parse_with_options` and `Message::decode`
/// treat their input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageOptions {
    /// Run `sanity_check_headers` on the root node after parsing
    #[serde(default)]
    pub sanity_check: bool,
    /// The mechanism assumed for a body with no Content-Transfer-Encoding
    #[serde(default)]
    pub default_transfer_encoding: TransferEncoding,
    /// How deeply multipart and message/rfc822 nodes may nest
    #[serde(default = "MessageOptions::default_max_depth")]
    pub max_depth: usize,
}

impl MessageOptions {
    fn default_max_depth() -> usize {
        50
    }
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            sanity_check: false,
            default_transfer_encoding: TransferEncoding::default(),
            max_depth: Self::default_max_depth(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let opts: MessageOptions = serde_json::from_str("{}").unwrap();
        k9::assert_equal!(opts, MessageOptions::default());
        k9::assert_equal!(opts.max_depth, 50);
        k9::assert_equal!(opts.default_transfer_encoding, TransferEncoding::SevenBit);
    }

    #[test]
    fn transfer_encoding_tokens() {
        let opts: MessageOptions = serde_json::from_str(
            r#"{"sanity_check": true, "default_transfer_encoding": "8bit"}"#,
        )
        .unwrap();
        assert!(opts.sanity_check);
        k9::assert_equal!(opts.default_transfer_encoding, TransferEncoding::EightBit);

        k9::assert_equal!(
            serde_json::to_string(&MessageOptions::default()).unwrap(),
            r#"{"sanity_check":false,"default_transfer_encoding":"7bit","max_depth":50}"#
        );

        assert!(serde_json::from_str::<MessageOptions>(r#"{"bogus": 1}"#).is_err());
    }
}

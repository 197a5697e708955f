use anyhow::Context;
use mimetree::MessageOptions;
use serde::Deserialize;
use std::path::Path;

/// Scanner configuration, loaded from an optional TOML file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Options passed through to the parser
    pub parse: MessageOptions,
    /// Structured headers whose parse failures are not reported.
    /// Names are matched case insensitively.
    pub ignore: Vec<String>,
    /// Structured headers that are skipped when their value is blank
    pub ignore_if_empty: Vec<String>,
    /// Skip every header whose name begins with `X-`
    pub skip_x_headers: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parse: MessageOptions::default(),
            ignore: [
                "authentication-results",
                "message-id",
                "received",
                "references",
                "return-path",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ignore_if_empty: ["cc", "in-reply-to", "reply-to"]
                .into_iter()
                .map(String::from)
                .collect(),
            skip_x_headers: false,
        }
    }
}

impl ScanConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn is_skipped(&self, name: &str, value: &str) -> bool {
        if self.skip_x_headers
            && name.len() > 2
            && name.as_bytes()[..2].eq_ignore_ascii_case(b"x-")
        {
            return true;
        }
        value.trim().is_empty()
            && self
                .ignore_if_empty
                .iter()
                .any(|n| n.eq_ignore_ascii_case(name))
    }
}

use crate::message::{Message, MessageKind};
use crate::structured::StructuredValue;
use crate::{MailParsingError, Result};

/// Headers that may occur at most once in an RFC 5322 message
const UNIQUE_MESSAGE_HEADERS: &[&str] = &[
    "Date",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Message-ID",
    "In-Reply-To",
    "References",
    "Subject",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
];

/// Headers that may occur at most once in a MIME body part
const UNIQUE_PART_HEADERS: &[&str] = &[
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-ID",
    "Content-Description",
    "Content-Disposition",
    "MIME-Version",
];

/// Headers whose every occurrence must be syntactically valid
const CORRECT_HEADERS: &[&str] = &[
    "Date",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Message-ID",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
];

fn syntax(message: String) -> MailParsingError {
    MailParsingError::HeaderSyntax(message)
}

impl Message {
    /// Validates the headers of this node against the rules for its kind.
    /// Only this node is examined; children are not visited.
    pub fn sanity_check_headers(&self) -> Result<()> {
        let headers = &self.headers;
        let is_full = self.kind == MessageKind::Full;

        if is_full && !["To", "Cc", "Bcc"].iter().any(|name| headers.contains(name)) {
            return Err(syntax(
                "must have a recipient, one of To:, Cc:, or Bcc:".to_string(),
            ));
        }

        if is_full {
            for name in ["Date", "From"] {
                if !headers.contains(name) {
                    return Err(syntax(format!("missing required {name}: header")));
                }
            }
        }

        let unique = match self.kind {
            MessageKind::Full | MessageKind::MessageRfc822 => UNIQUE_MESSAGE_HEADERS,
            MessageKind::Part | MessageKind::MessageDigest => UNIQUE_PART_HEADERS,
        };
        for &name in unique {
            let count = headers.count(name);
            if count > 1 {
                let name = headers
                    .get_first(name)
                    .map(|field| field.name())
                    .unwrap_or(name);
                return Err(syntax(format!(
                    "too many {name}: headers ({count}), at most one allowed"
                )));
            }
        }

        for name in CORRECT_HEADERS {
            for (idx, field) in headers.iter_named(name).enumerate() {
                if field.parsed().is_none() {
                    let text = String::from_utf8_lossy(field.full_header());
                    return Err(syntax(format!(
                        "syntax error in {}: header #{} ({})",
                        field.name(),
                        idx + 1,
                        text.trim()
                    )));
                }
            }
        }

        if is_full {
            let from_count = match headers.get_first("From").and_then(|f| f.parsed()) {
                Some(StructuredValue::AddressList(list)) => list.mailbox_count(),
                _ => 0,
            };
            if from_count > 1 && !headers.contains("Sender") {
                return Err(syntax(
                    "multiple mailboxes in From: requires a Sender: header".to_string(),
                ));
            }
        }

        Ok(())
    }
}

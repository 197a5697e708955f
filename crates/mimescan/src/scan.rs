use crate::config::ScanConfig;
use mimetree::normalize::normalize_crlf;
use mimetree::{is_structured_header, parse_structured, Decoded, Message, MessageKind};
use std::collections::BTreeMap;
use std::path::Path;

/// Lines longer than this violate RFC 5322 section 2.1.1
const MAX_LINE_LENGTH: usize = 998;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputKind {
    Full,
    Part,
}

impl From<InputKind> for MessageKind {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::Full => MessageKind::Full,
            InputKind::Part => MessageKind::Part,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub kind: MessageKind,
    pub normalize_crlf: bool,
    pub sanity_check: bool,
    pub round_trip: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            kind: MessageKind::Full,
            normalize_crlf: false,
            sanity_check: false,
            round_trip: false,
        }
    }
}

/// What was found wrong with a single message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub parse_error: Option<String>,
    pub bodiless: bool,
    /// Names of structured headers that failed to parse
    pub unparsed: Vec<String>,
    /// Names of over-long address headers that parsed once unfolded
    pub repaired: Vec<String>,
    pub decode_error: Option<String>,
    pub sanity_error: Option<String>,
    pub round_trip_error: Option<String>,
}

impl ScanReport {
    pub fn failed(&self) -> bool {
        self.parse_error.is_some()
            || self.decode_error.is_some()
            || self.sanity_error.is_some()
            || self.round_trip_error.is_some()
    }
}

pub fn scan_bytes(data: Vec<u8>, config: &ScanConfig, opts: &ScanOptions) -> ScanReport {
    let mut report = ScanReport::default();

    let data = if opts.normalize_crlf {
        normalize_crlf(data)
    } else {
        data
    };

    // Sanity is checked after decoding rather than during the parse
    let mut parse_options = config.parse.clone();
    let sanity_check = opts.sanity_check || parse_options.sanity_check;
    parse_options.sanity_check = false;

    let mut msg = match Message::parse_with_options(data, opts.kind, &parse_options) {
        Ok(msg) => msg,
        Err(err) => {
            report.parse_error = Some(err.to_string());
            return report;
        }
    };

    report.bodiless = msg.body().is_none() && msg.parts().is_empty();

    for field in msg.headers().iter() {
        let name = field.name();
        if !is_structured_header(name) || field.parsed().is_some() {
            continue;
        }
        if config.is_skipped(name, field.value()) {
            continue;
        }
        if is_address_header(name) && field.full_header().len() > MAX_LINE_LENGTH {
            let unfolded = field.value().replace("\r\n ", "");
            if parse_structured(name, &unfolded).is_ok() {
                report.repaired.push(name.to_string());
                continue;
            }
        }
        if !config.is_ignored(name) {
            report.unparsed.push(name.to_string());
        }
    }

    if let Err(err) = msg.decode() {
        report.decode_error = Some(err.to_string());
    }

    if sanity_check {
        if let Err(err) = msg.sanity_check_headers() {
            report.sanity_error = Some(err.to_string());
        }
    }

    if opts.round_trip && report.decode_error.is_none() {
        if let Err(err) = round_trip(&msg, opts.kind, &parse_options) {
            report.round_trip_error = Some(err);
        }
    }

    report
}

fn is_address_header(name: &str) -> bool {
    ["To", "Cc", "Bcc"]
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

/// Number of children of each node, depth first
fn shape(msg: &Message, out: &mut Vec<usize>) {
    out.push(msg.parts().len());
    for part in msg.parts() {
        shape(part, out);
    }
}

fn leaf_contents(msg: &Message) -> Vec<Option<Decoded>> {
    msg.leaves()
        .into_iter()
        .map(|leaf| leaf.decoded().cloned())
        .collect()
}

/// Rewrites the boundaries and headers of a decoded message, serializes
/// it and checks that parsing the result yields the same tree
fn round_trip(
    msg: &Message,
    kind: MessageKind,
    options: &mimetree::MessageOptions,
) -> Result<(), String> {
    let mut rewritten = msg.clone();
    rewritten.change_boundary();
    rewritten.rewrite_headers();
    let data = rewritten.get_data();

    let mut reparsed = Message::parse_with_options(data, kind, options)
        .map_err(|err| format!("reparse failed: {err}"))?;
    reparsed
        .decode()
        .map_err(|err| format!("decode after reparse failed: {err}"))?;

    let mut before = vec![];
    let mut after = vec![];
    shape(msg, &mut before);
    shape(&reparsed, &mut after);
    if before != after {
        return Err(format!("part structure changed: {before:?} -> {after:?}"));
    }

    let before = leaf_contents(msg);
    let after = leaf_contents(&reparsed);
    if let Some(idx) = before.iter().zip(&after).position(|(a, b)| a != b) {
        return Err(format!("content of leaf #{} changed", idx + 1));
    }

    Ok(())
}

/// Totals accumulated over a scan
#[derive(Debug, Default)]
pub struct Summary {
    pub processed: usize,
    pub failed: usize,
    pub bodiless: usize,
    pub unparsed: BTreeMap<String, usize>,
    pub repaired: usize,
    pub round_trip_mismatches: usize,
}

impl Summary {
    pub fn record(&mut self, path: &Path, report: &ScanReport) {
        let file = path.display();
        self.processed += 1;

        if let Some(err) = &report.parse_error {
            tracing::error!("{file}: parse failed: {err}");
        }
        if report.bodiless {
            tracing::warn!("{file}: no body");
            self.bodiless += 1;
        }
        for name in &report.unparsed {
            tracing::warn!("{file}: parse failed for {name}: header");
            *self.unparsed.entry(name.to_ascii_lowercase()).or_default() += 1;
        }
        for name in &report.repaired {
            tracing::info!("{file}: {name}: header parsed after unfolding");
        }
        self.repaired += report.repaired.len();
        if let Some(err) = &report.decode_error {
            tracing::error!("{file}: decode failed: {err}");
        }
        if let Some(err) = &report.sanity_error {
            tracing::error!("{file}: {err}");
        }
        if let Some(err) = &report.round_trip_error {
            tracing::error!("{file}: round trip: {err}");
            self.round_trip_mismatches += 1;
        }
        if report.failed() {
            self.failed += 1;
        }
    }

    pub fn print(&self) {
        println!("files processed: {}", self.processed);
        println!("failed: {}", self.failed);
        println!("without body: {}", self.bodiless);
        println!("repaired address headers: {}", self.repaired);
        println!("round trip mismatches: {}", self.round_trip_mismatches);
        if !self.unparsed.is_empty() {
            println!("unparsed structured headers:");
            for (name, count) in &self.unparsed {
                println!("  {name:<40} {count}");
            }
        }
    }
}

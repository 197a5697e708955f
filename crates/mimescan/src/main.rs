use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

mod config;
mod scan;

use config::ScanConfig;
use scan::{scan_bytes, InputKind, ScanOptions, Summary};

/// Mailbox scanner
///
/// Parses every message found under the given paths and reports
/// structural problems, unparsable structured headers and content
/// that does not survive being re-serialized.
#[derive(Debug, Parser)]
#[command(about)]
struct Opt {
    /// Files or directories to scan. Directories are walked recursively.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// TOML file holding a scanner configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Whether each file is a complete message or a MIME body part
    #[arg(long, value_enum, default_value = "full")]
    kind: InputKind,

    /// Convert bare CR and LF line endings to CRLF before parsing
    #[arg(long)]
    normalize_crlf: bool,

    /// Validate the headers of each message
    #[arg(long)]
    sanity_check: bool,

    /// Rewrite boundaries, serialize and re-parse each message,
    /// checking that the content is unchanged
    #[arg(long)]
    round_trip: bool,
}

fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for path in paths {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking {}", path.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn scan_file(
    path: &Path,
    config: &ScanConfig,
    opts: &ScanOptions,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let report = scan_bytes(data, config, opts);
    summary.record(path, &report);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::parse();

    let filter = EnvFilter::try_from_env("MIMETREE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("mimetree=info,mimescan=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &opts.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    let scan_options = ScanOptions {
        kind: opts.kind.into(),
        normalize_crlf: opts.normalize_crlf,
        sanity_check: opts.sanity_check,
        round_trip: opts.round_trip,
    };

    let files = collect_files(&opts.paths)?;
    tracing::debug!("scanning {} files", files.len());

    let mut summary = Summary::default();
    for path in &files {
        scan_file(path, &config, &scan_options, &mut summary)?;
    }
    summary.print();

    if summary.failed > 0 {
        anyhow::bail!("{} of {} files failed", summary.failed, summary.processed);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn walks_directories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cur");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.eml"), "Subject: b\r\n\r\nb\r\n").unwrap();
        std::fs::write(nested.join("a.eml"), "Subject: a\r\n\r\na\r\n").unwrap();
        let single = dir.path().join("c.eml");
        std::fs::write(&single, "Subject: c\r\n").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]).unwrap();
        k9::assert_equal!(
            files,
            vec![
                dir.path().join("b.eml"),
                dir.path().join("c.eml"),
                nested.join("a.eml"),
            ]
        );

        let files = collect_files(&[single.clone()]).unwrap();
        k9::assert_equal!(files, vec![single]);

        assert!(collect_files(&[dir.path().join("missing")]).is_err());
    }

    #[test]
    fn summary_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.eml"), "Subject: ok\r\n\r\nbody\r\n").unwrap();
        std::fs::write(dir.path().join("bodiless.eml"), "Subject: none\r\n").unwrap();
        std::fs::write(
            dir.path().join("broken.eml"),
            "Content-Type: multipart/mixed\r\n\r\nbody\r\n",
        )
        .unwrap();

        let config = ScanConfig::default();
        let opts = ScanOptions::default();
        let mut summary = Summary::default();
        for path in collect_files(&[dir.path().to_path_buf()]).unwrap() {
            scan_file(&path, &config, &opts, &mut summary).unwrap();
        }
        k9::assert_equal!(summary.processed, 3);
        k9::assert_equal!(summary.failed, 1);
        k9::assert_equal!(summary.bodiless, 1);
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Offline view of ntbridge special files
//!
//! Reads a host volume mounted elsewhere and reports how the bridge would
//! classify each file: sidecar record first, in-band header otherwise.
//! Host attributes are not visible from here, so every path is probed.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::debug;

use ntbridge_core::special::{classify_header, HEADER_MAX_LEN, SIDECAR_SUFFIX, SYMLINK_HEADER};
use ntbridge_core::{BridgeConfig, Encoding, FileKind, SidecarRecord};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Classify ntbridge special files on a mounted host volume"
)]
struct Cli {
    /// Files to inspect
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Print one JSON object per file
    #[arg(long)]
    json: bool,

    /// Bridge configuration (JSON); decides which files read as text
    #[arg(long, env = "NTBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    path: String,
    kind: FileKind,
    encoding: Encoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<SidecarRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    text: bool,
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut meta = OsString::from(path.as_os_str());
    meta.push(SIDECAR_SUFFIX);
    PathBuf::from(meta)
}

fn read_from(path: &Path, offset: usize) -> Result<String> {
    let content = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let payload = content.get(offset..).unwrap_or_default();
    Ok(String::from_utf8_lossy(payload).into_owned())
}

fn inspect(path: &Path, config: &BridgeConfig) -> Result<Report> {
    let meta = sidecar_path(path);
    let (kind, encoding, record) = match std::fs::read_to_string(&meta) {
        Ok(text) => {
            let record: SidecarRecord = text
                .parse()
                .with_context(|| format!("invalid meta file {}", meta.display()))?;
            (record.kind, Encoding::Sidecar, Some(record))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut header = Vec::with_capacity(HEADER_MAX_LEN);
            File::open(path)
                .with_context(|| format!("opening {}", path.display()))?
                .take(HEADER_MAX_LEN as u64)
                .read_to_end(&mut header)?;
            match classify_header(&header) {
                Some(kind) => (kind, Encoding::InBand, None),
                None => (FileKind::Regular, Encoding::None, None),
            }
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", meta.display()));
        }
    };

    let target = match (kind, encoding) {
        (FileKind::Symlink, Encoding::InBand) => Some(read_from(path, SYMLINK_HEADER.len())?),
        (FileKind::Symlink, _) => Some(read_from(path, 0)?),
        _ => None,
    };
    debug!(path = %path.display(), ?kind, ?encoding, "classified");

    Ok(Report {
        path: path.display().to_string(),
        kind,
        encoding,
        record,
        target,
        text: config.text.is_text(&path.to_string_lossy()),
    })
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    let mut line = format!(
        "{}\t{}\t{}",
        report.path,
        serde_json::to_value(report.kind)?.as_str().unwrap_or("?"),
        serde_json::to_value(report.encoding)?.as_str().unwrap_or("?"),
    );
    if let Some(record) = &report.record {
        line.push_str(&format!("\t{:o} {}:{}", record.perm, record.uid, record.gid));
    }
    if let Some(target) = &report.target {
        line.push_str(&format!("\t-> {target}"));
    }
    println!("{line}");
    Ok(())
}

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BridgeConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    let mut failures = 0usize;
    for path in &cli.paths {
        match inspect(path, &config) {
            Ok(report) => print_report(&report, cli.json)?,
            Err(err) => {
                eprintln!("{}: {err:#}", path.display());
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} files could not be classified", cli.paths.len());
    }
    Ok(())
}

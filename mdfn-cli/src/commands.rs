// CLI command handlers
use anyhow::{Context, Result};
use mdfn_core::state::{inspect, StateSummary, STATE_MAGIC};
use mdfn_core::{FileMode, FileStream, MemoryStream};
use mdfn_runtime::save_state::decompress_if_needed;
use mdfn_runtime::{commands, scan_movie, MovieSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct StateReport {
    pub file: PathBuf,
    pub compressed: bool,
    pub file_len: u64,
    pub payload_crc32: u32,
    #[serde(flatten)]
    pub summary: StateSummary,
}

#[derive(Debug, Serialize)]
pub struct MovieReport {
    pub file: PathBuf,
    pub port_bytes: Vec<usize>,
    #[serde(flatten)]
    pub summary: MovieSummary,
}

pub fn state_report(path: &Path) -> Result<StateReport> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let file_len = raw.len() as u64;
    let compressed = !raw.starts_with(STATE_MAGIC);
    let data = decompress_if_needed(raw)?;

    let mut stream = MemoryStream::from_vec(data);
    let summary = inspect(&mut stream).context("Failed to parse state")?;

    let start = summary.info.payload_offset as usize;
    let end = start + summary.info.payload_len as usize;
    let payload = stream.as_slice().get(start..end).context("State payload out of range")?;

    Ok(StateReport {
        file: path.to_path_buf(),
        compressed,
        file_len,
        payload_crc32: crc32fast::hash(payload),
        summary,
    })
}

pub fn movie_report(path: &Path, port_bytes: &[usize]) -> Result<MovieReport> {
    let mut stream = FileStream::open(path, FileMode::Read)
        .with_context(|| format!("Failed to open movie file: {}", path.display()))?;
    let summary = scan_movie(&mut stream, port_bytes).context("Failed to scan movie")?;

    Ok(MovieReport {
        file: path.to_path_buf(),
        port_bytes: port_bytes.to_vec(),
        summary,
    })
}

pub fn inspect_state(path: &Path, json: bool) -> Result<()> {
    let report = state_report(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let info = &report.summary.info;
    println!("State file: {}", report.file.display());
    println!(
        "  Format version: 0x{:08X}{}",
        info.format_version,
        if report.compressed { " (zstd)" } else { "" }
    );
    println!("  Payload: {} bytes, CRC32 {:08X}", info.payload_len, report.payload_crc32);
    match &info.preview {
        Some(preview) => println!("  Preview: {}x{}", preview.width, preview.height),
        None => println!("  Preview: none"),
    }

    for section in &report.summary.sections {
        println!("\n  [{}] version {}, {} bytes", section.name, section.version, section.len);
        for var in &section.variables {
            println!("    {:<32} {:>8}", var.name, var.size);
        }
    }
    Ok(())
}

pub fn movie_info(path: &Path, port_bytes: &[usize], json: bool) -> Result<()> {
    let report = movie_report(path, port_bytes)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let summary = &report.summary;
    println!("Movie file: {}", report.file.display());
    println!("  Frames: {}", summary.frames);
    println!("  Snapshots: {}", summary.snapshots);
    println!("  Media changes: {}", summary.media_changes);
    if let Some((width, height)) = summary.preview {
        println!("  Preview: {}x{}", width, height);
    }
    for (cmd, count) in &summary.commands {
        println!("  Command 0x{:02X} ({}): {}", cmd, commands::name(*cmd), count);
    }
    if summary.truncated {
        println!("  Warning: movie ends inside a frame record");
    }
    Ok(())
}

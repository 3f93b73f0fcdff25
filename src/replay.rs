//! Deterministic fold of a JSONL packet capture.
//!
//! Each non-empty line holds one packet as the bridge emits it, optionally
//! prefixed with `data:` when copied straight from an SSE capture. No local
//! receive time is stamped, so the same capture always yields the same
//! tables.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::BufRead;
use tracing::{debug, warn};

use crate::aggregator::{FoldOutcome, MeshState, MeshSummary};
use crate::packet::Packet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub lines: usize,
    pub packets: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub bad_lines: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutput {
    pub report: ReplayReport,
    pub summary: MeshSummary,
    pub state: MeshState,
}

pub fn parse_line(line: &str) -> serde_json::Result<Packet> {
    let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    serde_json::from_str(payload)
}

/// Fold every packet line of `reader` into a fresh state. Unparseable lines
/// are counted and skipped; only read errors abort.
pub fn replay<R: BufRead>(reader: R) -> Result<ReplayOutput> {
    let mut state = MeshState::new();
    let mut report = ReplayReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_number))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        report.lines += 1;

        let packet = match parse_line(line) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Skipping line {}: {}", line_number, e);
                report.bad_lines += 1;
                continue;
            }
        };

        match state.apply(&packet) {
            FoldOutcome::New => report.packets += 1,
            FoldOutcome::Duplicate => report.duplicates += 1,
            FoldOutcome::Dropped => {
                debug!("Line {} has no from/id", line_number);
                report.dropped += 1;
            }
        }
    }

    Ok(ReplayOutput {
        report,
        summary: state.summary(),
        state,
    })
}

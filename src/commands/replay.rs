use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

pub fn handle_replay(file: PathBuf, pretty: bool) -> Result<()> {
    let reader = BufReader::new(
        File::open(&file).with_context(|| format!("Failed to open {:?}", file))?,
    );
    let output =
        meshstream::replay::replay(reader).with_context(|| format!("Failed to replay {:?}", file))?;

    let report = &output.report;
    info!(
        "Replayed {} lines from {:?}: {} packets, {} duplicates, {} dropped, {} bad lines",
        report.lines, file, report.packets, report.duplicates, report.dropped, report.bad_lines
    );

    let json = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .context("Failed to serialize replay output")?;
    println!("{}", json);

    Ok(())
}

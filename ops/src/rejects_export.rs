//! Reject exports

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use datagate::{Session, StoredReject, list_rejects};
use eyre::{Context, Result};
use tracing::{debug, info};

const CSV_HEADER: [&str; 8] = [
    "reject_id",
    "dataset_name",
    "source_file",
    "row_num",
    "row_hash",
    "reject_reasons",
    "raw_json",
    "rejected_at",
];

fn ensure_parent(out: &Path) -> Result<()> {
    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// One JSON object per line, newest first
pub fn export_jsonl(session: &Session, dataset: &str, out: &Path, top: Option<usize>) -> Result<usize> {
    debug!(dataset, ?out, ?top, "export_jsonl: called");
    let rejects = list_rejects(session, dataset, top)?;
    ensure_parent(out)?;

    let file = File::create(out).context(format!("Failed to create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    for reject in &rejects {
        serde_json::to_writer(&mut writer, reject)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    info!(dataset, ?out, rows = rejects.len(), "Rejects exported");
    Ok(rejects.len())
}

fn csv_record(reject: &StoredReject) -> Result<[String; 8]> {
    Ok([
        reject.reject_id.to_string(),
        reject.dataset_name.clone(),
        reject.source_file.clone().unwrap_or_default(),
        reject.row_num.to_string(),
        hex::encode(&reject.row_hash),
        reject.reject_reasons.clone(),
        serde_json::to_string(&reject.raw)?,
        reject.rejected_at.clone(),
    ])
}

/// Flat CSV with the raw row kept as JSON text, newest first
pub fn export_csv(session: &Session, dataset: &str, out: &Path, top: Option<usize>) -> Result<usize> {
    debug!(dataset, ?out, ?top, "export_csv: called");
    let rejects = list_rejects(session, dataset, top)?;
    ensure_parent(out)?;

    let mut writer = csv::Writer::from_path(out).context(format!("Failed to create {}", out.display()))?;
    writer.write_record(CSV_HEADER)?;
    for reject in &rejects {
        writer.write_record(csv_record(reject)?)?;
    }
    writer.flush()?;

    info!(dataset, ?out, rows = rejects.len(), "Rejects exported");
    Ok(rejects.len())
}

//! Atomic file writes. Downstream steps poll for file presence as a
//! completion signal, so a reader must never observe a half-written file:
//! write to a sibling temp path, then rename into place.

use scan_core::ScanError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Write text atomically (temp file + rename).
pub fn atomic_write_text(path: &Path, content: &str) -> Result<(), ScanError> {
    let tmp = tmp_path(path);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize rows to CSV atomically. The header row is written explicitly so
/// an empty batch still produces a schema-complete file; `headers` must match
/// the row type's field order.
pub fn atomic_write_csv<S: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[S],
) -> Result<(), ScanError> {
    let tmp = tmp_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .map_err(|e| ScanError::InvalidData(format!("{}: {e}", tmp.display())))?;
        writer
            .write_record(headers)
            .map_err(|e| ScanError::InvalidData(format!("{}: {e}", tmp.display())))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| ScanError::InvalidData(format!("{}: {e}", tmp.display())))?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

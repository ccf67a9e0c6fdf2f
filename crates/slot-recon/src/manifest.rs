//! Run manifest: which snapshots fed the build, which checkpoints are
//! ready, and a checksum per output so consumers can verify what they read.

use cache_store::atomic_write_text;
use scan_core::ScanError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChecksum {
    pub sha256: Option<String>,
    pub rows: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconManifest {
    pub date: String,
    pub generated_at: String,
    pub snapshots_present: BTreeMap<String, bool>,
    pub ready_for: BTreeMap<String, bool>,
    pub outputs: BTreeMap<String, Option<String>>,
    pub checksums: BTreeMap<String, OutputChecksum>,
}

pub fn sha256_file(path: &Path) -> Result<String, ScanError> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

impl ReconManifest {
    pub fn write(&self, path: &Path) -> Result<(), ScanError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ScanError::InvalidData(e.to_string()))?;
        atomic_write_text(path, &json)
    }

    pub fn read(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| ScanError::SchemaViolation(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recon_manifest_2025-08-27.json");
        let manifest = ReconManifest {
            date: "2025-08-27".into(),
            generated_at: "2025-08-27T16:00:00+07:00".into(),
            snapshots_present: BTreeMap::from([("0930".to_string(), true)]),
            ready_for: BTreeMap::from([("0930".to_string(), true)]),
            outputs: BTreeMap::from([("long".to_string(), Some("x.csv".to_string()))]),
            checksums: BTreeMap::from([(
                "long".to_string(),
                OutputChecksum {
                    sha256: Some("00".into()),
                    rows: Some(3),
                },
            )]),
        };
        manifest.write(&path).unwrap();
        let read = ReconManifest::read(&path).unwrap();
        assert_eq!(read.date, manifest.date);
        assert_eq!(read.checksums["long"].rows, Some(3));
    }
}

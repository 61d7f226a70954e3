//! On-disk artifacts.
//!
//! Each artifact is one JSON file holding an [`Envelope`]: a format version,
//! the write time, and the SHA-256 of the canonical (sorted-key, compact)
//! JSON of the payload. Files are replaced atomically: write a sibling temp
//! file, fsync, rename over the target.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const LEDGERS_FILE: &str = "ledgers.json";
pub const HISTORY_FILE: &str = "price_history.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub written_at: DateTime<Utc>,
    pub sha256: String,
    pub payload: T,
}

/// Outcome of reading one artifact.
#[derive(Debug)]
pub enum ArtifactLoad<T> {
    Loaded {
        payload: T,
        written_at: DateTime<Utc>,
    },
    Missing,
    /// Unreadable, unparsable, wrong version or checksum mismatch.
    Corrupt(String),
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 (hex) of the canonical JSON form of `v`.
pub fn payload_sha256(v: &Value) -> Result<String> {
    let canonical = serde_json::to_string(&sort_keys(v)).context("canonical json failed")?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
    }
    let tmp = tmp_path(path);
    {
        let mut f = File::create(&tmp).with_context(|| format!("create {:?}", tmp))?;
        f.write_all(bytes)
            .with_context(|| format!("write {:?}", tmp))?;
        f.sync_all().with_context(|| format!("fsync {:?}", tmp))?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;

    // Directory fsync makes the rename durable; not every platform allows it.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Wrap `payload` in an envelope and write it atomically.
pub fn write_artifact<T: Serialize>(path: &Path, payload: &T, now: DateTime<Utc>) -> Result<()> {
    let value = serde_json::to_value(payload).context("serialize artifact payload failed")?;
    let envelope = Envelope {
        version: FORMAT_VERSION,
        written_at: now,
        sha256: payload_sha256(&value)?,
        payload: value,
    };
    let bytes = serde_json::to_vec_pretty(&envelope).context("serialize envelope failed")?;
    write_atomic(path, &bytes)
}

/// Read and verify one artifact. Never fails: problems come back as
/// [`ArtifactLoad::Corrupt`] so the caller can start that artifact empty.
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> ArtifactLoad<T> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ArtifactLoad::Missing,
        Err(e) => return ArtifactLoad::Corrupt(format!("read {:?}: {e}", path)),
    };
    let envelope: Envelope<Value> = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => return ArtifactLoad::Corrupt(format!("parse envelope: {e}")),
    };
    if envelope.version != FORMAT_VERSION {
        return ArtifactLoad::Corrupt(format!(
            "unsupported version {} (expected {FORMAT_VERSION})",
            envelope.version
        ));
    }
    match payload_sha256(&envelope.payload) {
        Ok(actual) if actual == envelope.sha256 => {}
        Ok(actual) => {
            return ArtifactLoad::Corrupt(format!(
                "checksum mismatch: recorded {} computed {actual}",
                envelope.sha256
            ))
        }
        Err(e) => return ArtifactLoad::Corrupt(format!("checksum: {e:#}")),
    }
    match serde_json::from_value::<T>(envelope.payload) {
        Ok(payload) => ArtifactLoad::Loaded {
            payload,
            written_at: envelope.written_at,
        },
        Err(e) => ArtifactLoad::Corrupt(format!("decode payload: {e}")),
    }
}

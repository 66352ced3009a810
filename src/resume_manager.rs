use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};

use crate::error::DedupError;

/// Durable at-most-once guard over target identifiers.
///
/// One line per processed target, `<target_id>\t<timestamp>`, appended and
/// synced on every [`DedupStore::record`]. Bare identifiers without a
/// timestamp are accepted on load.
pub struct DedupStore {
    path: PathBuf,
    processed: HashSet<String>,
    file: File,
}

impl DedupStore {
    /// Reads every prior entry in one pass, then keeps the file open for appends.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DedupError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| DedupError::Io { path: path.clone(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut content = String::new();
        if path.exists() {
            File::open(&path)
                .and_then(|mut f| f.read_to_string(&mut content))
                .map_err(io_err)?;
        }

        let mut processed = HashSet::new();
        let torn_tail = !content.is_empty() && !content.ends_with('\n');
        let mut lines: Vec<&str> = content.split('\n').collect();
        // `split` always yields a final piece: empty after a clean newline,
        // otherwise a line whose write never finished.
        if let Some(last) = lines.pop() {
            if torn_tail {
                warn!("Ignoring incomplete trailing dedup entry '{}' in {}", last, path.display());
            }
        }
        for line in lines {
            let id = line.split('\t').next().unwrap_or("").trim();
            if !id.is_empty() {
                processed.insert(id.to_string());
            }
        }

        if torn_tail {
            let valid_len = content.rfind('\n').map(|i| i + 1).unwrap_or(0) as u64;
            OpenOptions::new()
                .write(true)
                .open(&path)
                .and_then(|f| f.set_len(valid_len).and_then(|_| f.sync_data()))
                .map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        if processed.is_empty() {
            info!("No processed targets recorded in {}. Starting fresh.", path.display());
        } else {
            info!("Resumed previous runs: {} targets already processed.", processed.len());
        }

        Ok(DedupStore { path, processed, file })
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.processed.contains(target_id)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Appends `target_id` unless it is already present. The entry is on disk
    /// when this returns `Ok`.
    pub fn record(&mut self, target_id: &str, at: DateTime<Utc>) -> Result<(), DedupError> {
        if self.processed.contains(target_id) {
            return Ok(());
        }
        let line = format!("{}\t{}\n", target_id, at.to_rfc3339_opts(SecondsFormat::Secs, true));
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.sync_data())
            .map_err(|source| DedupError::Io { path: self.path.clone(), source })?;
        self.processed.insert(target_id.to_string());
        Ok(())
    }
}

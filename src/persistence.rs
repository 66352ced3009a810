//! Append-only output stores.
//!
//! Every record goes to a JSON Lines file (the full structured record) and a
//! CSV file (one flattened row). An append counts only when both writes land;
//! otherwise both files are cut back to where they were.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use chrono::SecondsFormat;
use log::{debug, warn};

use crate::config::StoragePaths;
use crate::error::PersistenceError;
use crate::profile::ProfileRecord;

pub const TABULAR_HEADERS: [&str; 9] = [
    "scrapedAt",
    "targetId",
    "name",
    "headline",
    "location",
    "about",
    "numExperience",
    "numEducation",
    "numSkills",
];

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io { path: path.to_path_buf(), source }
}

pub struct PersistenceLayer {
    structured_path: PathBuf,
    tabular_path: PathBuf,
    structured: File,
    tabular: File,
}

impl PersistenceLayer {
    pub fn open(paths: &StoragePaths) -> Result<Self, PersistenceError> {
        for path in [&paths.structured, &paths.tabular] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
        }

        let structured = open_append(&paths.structured)?;
        drop_torn_tail(&paths.structured)?;
        let tabular = open_append(&paths.tabular)?;
        drop_torn_rows(&paths.tabular)?;

        Ok(PersistenceLayer {
            structured_path: paths.structured.clone(),
            tabular_path: paths.tabular.clone(),
            structured,
            tabular,
        })
    }

    pub fn structured_path(&self) -> &Path {
        &self.structured_path
    }

    /// Writes `record` to both stores. On `Err` neither store keeps any part
    /// of it.
    pub fn append(&mut self, record: &ProfileRecord) -> Result<(), PersistenceError> {
        let structured_len = file_len(&self.structured, &self.structured_path)?;
        let tabular_len = file_len(&self.tabular, &self.tabular_path)?;

        let result = self.write_both(record, tabular_len == 0);
        if result.is_err() {
            warn!("Rolling back partial write for {}", record.target_id);
            if let Err(e) = self.structured.set_len(structured_len) {
                warn!("Could not roll back {}: {}", self.structured_path.display(), e);
            }
            if let Err(e) = self.tabular.set_len(tabular_len) {
                warn!("Could not roll back {}: {}", self.tabular_path.display(), e);
            }
        }
        result
    }

    fn write_both(&mut self, record: &ProfileRecord, write_header: bool) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.structured
            .write_all(line.as_bytes())
            .and_then(|_| self.structured.sync_data())
            .map_err(io_error(&self.structured_path))?;

        let mut row = Vec::new();
        {
            let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(&mut row);
            if write_header {
                csv_writer.write_record(TABULAR_HEADERS)?;
            }
            csv_writer.write_record(flatten(record))?;
            csv_writer.flush().map_err(io_error(&self.tabular_path))?;
        }
        self.tabular
            .write_all(&row)
            .and_then(|_| self.tabular.sync_data())
            .map_err(io_error(&self.tabular_path))?;

        debug!("Saved profile data for {}", record.target_id);
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File, PersistenceError> {
    OpenOptions::new().create(true).append(true).read(true).open(path).map_err(io_error(path))
}

fn file_len(file: &File, path: &Path) -> Result<u64, PersistenceError> {
    file.metadata().map(|m| m.len()).map_err(io_error(path))
}

/// Cuts an unterminated last line left behind by a crash mid-append.
fn drop_torn_tail(path: &Path) -> Result<(), PersistenceError> {
    let mut file = OpenOptions::new().read(true).write(true).open(path).map_err(io_error(path))?;
    let len = file.metadata().map_err(io_error(path))?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(io_error(path))?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut content = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut content))
        .map_err(io_error(path))?;
    let keep = content.iter().rposition(|b| *b == b'\n').map(|i| i + 1).unwrap_or(0);
    warn!("Dropping {} bytes of incomplete trailing data from {}", content.len() - keep, path.display());
    file.set_len(keep as u64).and_then(|_| file.sync_data()).map_err(io_error(path))
}

/// Cuts a CSV row left unfinished by a crash mid-append. Quoted fields may
/// hold newlines, so the row boundary comes from the CSV parser: a row counts
/// only when it has every column and ends on its terminator.
fn drop_torn_rows(path: &Path) -> Result<(), PersistenceError> {
    let len = fs::metadata(path).map_err(io_error(path))?.len();
    if len == 0 {
        return Ok(());
    }
    let content = fs::read(path).map_err(io_error(path))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_slice());
    let mut row = csv::ByteRecord::new();
    let mut keep = 0u64;
    while let Ok(true) = reader.read_byte_record(&mut row) {
        let end = reader.position().byte();
        let terminated = end > 0 && content.get(end as usize - 1) == Some(&b'\n');
        if row.len() != TABULAR_HEADERS.len() || !terminated {
            break;
        }
        keep = end;
    }

    if keep < content.len() as u64 {
        warn!("Dropping {} bytes of incomplete trailing rows from {}", content.len() as u64 - keep, path.display());
        let file = OpenOptions::new().write(true).open(path).map_err(io_error(path))?;
        file.set_len(keep).and_then(|_| file.sync_data()).map_err(io_error(path))?;
    }
    Ok(())
}

/// The fixed tabular columns; list sections become counts.
pub fn flatten(record: &ProfileRecord) -> Vec<String> {
    let basic = record.basic_info.clone().unwrap_or_default();
    let count = |n: Option<usize>| n.unwrap_or(0).to_string();
    vec![
        record.scraped_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.target_id.clone(),
        basic.name.unwrap_or_default(),
        basic.headline.unwrap_or_default(),
        basic.location.unwrap_or_default(),
        record.about.clone().unwrap_or_default(),
        count(record.experience.as_ref().map(Vec::len)),
        count(record.education.as_ref().map(Vec::len)),
        count(record.skills.as_ref().map(Vec::len)),
    ]
}

/// Reads every record in a JSON Lines store.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<ProfileRecord>, PersistenceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path).map_err(io_error(path))?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            line: i + 1,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Rewrites a JSON Lines store as one pretty-printed JSON array.
pub fn export_json_array<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> Result<usize, PersistenceError> {
    let records = read_records(source)?;
    let dest = dest.as_ref();
    let json = serde_json::to_string_pretty(&records)?;
    let tmp = dest.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_error(&tmp))?;
    fs::rename(&tmp, dest).map_err(io_error(dest))?;
    Ok(records.len())
}

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or missing configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

/// The automation session can no longer be used. Fatal to the run.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("authentication lost while opening {target}")]
    AuthenticationLost { target: String },

    #[error("target unreachable: {target} ({reason})")]
    Unreachable { target: String, reason: String },
}

/// Outcome of a section lookup that did not produce content.
#[derive(Debug, Error)]
pub enum LocateError {
    /// Layout mismatch or unparsable markup; affects only this section.
    #[error("layout mismatch: {0}")]
    Layout(String),

    /// The page showed something that means the whole session is gone.
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write tabular row: {0}")]
    Csv(#[from] csv::Error),

    #[error("corrupt structured store {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("i/o error on dedup store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file {0} does not exist")]
    NotFound(PathBuf),

    #[error("could not read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("input {path} has no target column (expected one of: {expected})")]
    MissingColumn { path: PathBuf, expected: String },

    #[error("failed to collect targets from {url}: {reason}")]
    Collect { url: String, reason: String },
}

/// Crate-level error, used at the binary boundary.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error(transparent)]
    Input(#[from] InputError),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

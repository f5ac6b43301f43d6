use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum WhitelistError {
    /// Bad or conflicting backend selection, or unusable scan settings.
    Configuration(String),
    /// The store could not be opened, counted or read.
    SourceUnavailable(String),
    /// The stairsplus dump is unreadable or lacks the expected relations.
    MalformedFilter(String),
    /// A single block could not be decoded into node names.
    Decode { offset: u64, row: usize, message: String },
    Write { path: PathBuf, source: std::io::Error },
    WorkerPanicked(usize),
}

impl WhitelistError {
    /// Short label of the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            WhitelistError::Configuration(_) => "configuration",
            WhitelistError::SourceUnavailable(_) => "row source",
            WhitelistError::MalformedFilter(_) => "filter table",
            WhitelistError::Decode { .. } => "block decode",
            WhitelistError::Write { .. } => "writer",
            WhitelistError::WorkerPanicked(_) => "worker pool",
        }
    }
}

impl fmt::Display for WhitelistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitelistError::Configuration(e) => write!(f, "Configuration error: {}", e),
            WhitelistError::SourceUnavailable(e) => write!(f, "Source unavailable: {}", e),
            WhitelistError::MalformedFilter(e) => write!(f, "Malformed filter: {}", e),
            WhitelistError::Decode { offset, row, message } => write!(
                f,
                "Decode error in page at offset {} (row {} of page): {}",
                offset, row, message
            ),
            WhitelistError::Write { path, source } => {
                write!(f, "Write error for {}: {}", path.display(), source)
            }
            WhitelistError::WorkerPanicked(id) => write!(f, "Worker {} panicked", id),
        }
    }
}

impl std::error::Error for WhitelistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WhitelistError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WhitelistError {
    fn from(err: serde_json::Error) -> Self {
        WhitelistError::MalformedFilter(err.to_string())
    }
}

impl From<rusqlite::Error> for WhitelistError {
    fn from(err: rusqlite::Error) -> Self {
        WhitelistError::SourceUnavailable(format!("sqlite: {}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for WhitelistError {
    fn from(err: postgres::Error) -> Self {
        WhitelistError::SourceUnavailable(format!("postgres: {}", err))
    }
}

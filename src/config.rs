use crate::WhitelistError;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Rows fetched per page when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: u64 = 64;
/// Completed pages between two progress log lines.
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

/// What a worker does when a block cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// The first undecodable block aborts the whole run.
    #[default]
    Abort,
    /// Undecodable blocks are logged, counted and left out.
    Skip,
}

/// Settings for one scan over the `blocks` table.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub chunk_size: u64,
    pub workers: usize,
    pub decode_policy: DecodePolicy,
    pub progress_every: usize,
}

impl ScanConfig {
    /// Defaults: 64 rows per page, one worker per available core, abort on bad blocks.
    pub fn default_config() -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers,
            decode_policy: DecodePolicy::Abort,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_decode_policy(mut self, decode_policy: DecodePolicy) -> Self {
        self.decode_policy = decode_policy;
        self
    }

    pub fn with_progress_every(mut self, progress_every: usize) -> Self {
        self.progress_every = progress_every;
        self
    }

    pub fn validate(&self) -> Result<(), WhitelistError> {
        if self.chunk_size == 0 {
            return Err(WhitelistError::Configuration(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(WhitelistError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

/// The store holding the `blocks` table. Exactly one backend is chosen per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Postgres(String),
    Sqlite(PathBuf),
}

impl BackendConfig {
    /// Resolve the two mutually exclusive store options into one backend.
    pub fn from_options(
        pg_connection: Option<String>,
        sqlite_file: Option<PathBuf>,
    ) -> Result<Self, WhitelistError> {
        match (pg_connection, sqlite_file) {
            (Some(_), Some(_)) => Err(WhitelistError::Configuration(
                "both a postgres connection and a sqlite file were given; pick one".to_string(),
            )),
            (None, None) => Err(WhitelistError::Configuration(
                "no backend given; pass a postgres connection or a sqlite file".to_string(),
            )),
            (Some(dsn), None) => {
                if cfg!(feature = "postgres") {
                    Ok(BackendConfig::Postgres(dsn))
                } else {
                    Err(WhitelistError::Configuration(
                        "postgres support was not compiled in".to_string(),
                    ))
                }
            }
            (None, Some(path)) => Ok(BackendConfig::Sqlite(path)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BackendConfig::Postgres(_) => "postgres".to_string(),
            BackendConfig::Sqlite(path) => format!("sqlite:{}", path.display()),
        }
    }
}

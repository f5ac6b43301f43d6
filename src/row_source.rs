use crate::config::BackendConfig;
use crate::WhitelistError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A contiguous range of rows in the `blocks` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageDescriptor {
    pub offset: u64,
    pub limit: u64,
}

/// Number of pages needed to cover `row_count` rows.
pub fn page_count(row_count: u64, chunk_size: u64) -> u64 {
    row_count.div_ceil(chunk_size)
}

/// Pages covering `[0, row_count)` in steps of `chunk_size`; the last one may be short.
///
/// Offsets are computed in `u64` so any chunk size works regardless of pointer width.
pub fn plan_pages(row_count: u64, chunk_size: u64) -> impl Iterator<Item = PageDescriptor> {
    (0..page_count(row_count, chunk_size)).map(move |index| {
        let offset = index * chunk_size;
        PageDescriptor {
            offset,
            limit: chunk_size.min(row_count - offset),
        }
    })
}

/// One open connection to a store holding serialized map blocks.
///
/// Pages may come back in any order and implementations are not required to
/// keep row order stable between calls beyond what the store itself does.
pub trait RowSource {
    fn count(&mut self) -> Result<u64, WhitelistError>;
    fn fetch_page(&mut self, page: PageDescriptor) -> Result<Vec<Vec<u8>>, WhitelistError>;
}

/// Opens fresh, independent [`RowSource`] connections. Shared by reference across workers.
pub trait SourceFactory: Sync {
    fn open(&self) -> Result<Box<dyn RowSource>, WhitelistError>;
}

impl SourceFactory for BackendConfig {
    fn open(&self) -> Result<Box<dyn RowSource>, WhitelistError> {
        match self {
            BackendConfig::Sqlite(path) => {
                Ok(Box::new(crate::sqlite_source::SqliteRowSource::open(path)?))
            }
            #[cfg(feature = "postgres")]
            BackendConfig::Postgres(dsn) => Ok(Box::new(
                crate::postgres_source::PostgresRowSource::connect(dsn)?,
            )),
            #[cfg(not(feature = "postgres"))]
            BackendConfig::Postgres(_) => Err(WhitelistError::Configuration(
                "postgres support was not compiled in".to_string(),
            )),
        }
    }
}

/// Rows held in memory, shared by every connection opened from it.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Arc<Vec<Vec<u8>>>,
    fail_fetch_at: Option<u64>,
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new(rows: Vec<Vec<u8>>) -> Self {
        Self {
            rows: Arc::new(rows),
            ..Self::default()
        }
    }

    /// Make every fetch of the page starting at `offset` fail.
    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_fetch_at = Some(offset);
        self
    }

    /// Connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl SourceFactory for InMemoryStore {
    fn open(&self) -> Result<Box<dyn RowSource>, WhitelistError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryRowSource {
            rows: Arc::clone(&self.rows),
            fail_fetch_at: self.fail_fetch_at,
            live: Arc::clone(&self.live),
        }))
    }
}

pub struct InMemoryRowSource {
    rows: Arc<Vec<Vec<u8>>>,
    fail_fetch_at: Option<u64>,
    live: Arc<AtomicUsize>,
}

impl RowSource for InMemoryRowSource {
    fn count(&mut self) -> Result<u64, WhitelistError> {
        Ok(self.rows.len() as u64)
    }

    fn fetch_page(&mut self, page: PageDescriptor) -> Result<Vec<Vec<u8>>, WhitelistError> {
        if self.fail_fetch_at == Some(page.offset) {
            return Err(WhitelistError::SourceUnavailable(format!(
                "in-memory store refused page at offset {}",
                page.offset
            )));
        }
        let start = usize::try_from(page.offset).unwrap_or(usize::MAX).min(self.rows.len());
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        let end = start.saturating_add(limit).min(self.rows.len());
        Ok(self.rows[start..end].to_vec())
    }
}

impl Drop for InMemoryRowSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

use crate::row_source::{PageDescriptor, RowSource};
use crate::WhitelistError;
use rusqlite::{Connection, OpenFlags, params};
use std::path::Path;
use tracing::debug;

const COUNT_SQL: &str = "SELECT COUNT(*) FROM blocks";
const PAGE_SQL: &str = "SELECT data FROM blocks LIMIT ?1 OFFSET ?2";

/// A read-only connection to a minetest `map.sqlite`.
pub struct SqliteRowSource {
    conn: Connection,
}

impl SqliteRowSource {
    pub fn open(path: &Path) -> Result<Self, WhitelistError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            WhitelistError::SourceUnavailable(format!(
                "cannot open sqlite file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "opened sqlite connection");
        Ok(Self { conn })
    }
}

impl RowSource for SqliteRowSource {
    fn count(&mut self) -> Result<u64, WhitelistError> {
        let count: i64 = self.conn.query_row(COUNT_SQL, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn fetch_page(&mut self, page: PageDescriptor) -> Result<Vec<Vec<u8>>, WhitelistError> {
        let mut stmt = self.conn.prepare_cached(PAGE_SQL)?;
        let rows = stmt
            .query_map(params![page.limit as i64, page.offset as i64], |row| {
                row.get::<_, Vec<u8>>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

use crate::row_source::{PageDescriptor, RowSource};
use crate::WhitelistError;
use postgres::{Client, NoTls};
use tracing::debug;

const COUNT_SQL: &str = "SELECT COUNT(*) FROM blocks";
const PAGE_SQL: &str = "SELECT data FROM blocks LIMIT $1 OFFSET $2";

/// A connection to a minetest postgres map database.
pub struct PostgresRowSource {
    client: Client,
}

impl PostgresRowSource {
    pub fn connect(dsn: &str) -> Result<Self, WhitelistError> {
        let client = Client::connect(dsn, NoTls).map_err(|e| {
            WhitelistError::SourceUnavailable(format!("cannot connect to postgres: {}", e))
        })?;
        debug!("opened postgres connection");
        Ok(Self { client })
    }
}

impl RowSource for PostgresRowSource {
    fn count(&mut self) -> Result<u64, WhitelistError> {
        let row = self.client.query_one(COUNT_SQL, &[])?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    fn fetch_page(&mut self, page: PageDescriptor) -> Result<Vec<Vec<u8>>, WhitelistError> {
        let limit = page.limit as i64;
        let offset = page.offset as i64;
        let rows = self.client.query(PAGE_SQL, &[&limit, &offset])?;
        let mut blocks = Vec::with_capacity(rows.len());
        for row in rows {
            blocks.push(row.try_get::<_, Vec<u8>>(0)?);
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_server_is_unavailable() {
        let result = PostgresRowSource::connect("host=127.0.0.1 port=1 connect_timeout=1 user=nobody");
        assert!(matches!(result, Err(WhitelistError::SourceUnavailable(_))));
    }

    #[test]
    #[ignore = "needs a postgres server; set WHITELIST_TEST_PG"]
    fn test_count_against_live_server() {
        let dsn = std::env::var("WHITELIST_TEST_PG").expect("WHITELIST_TEST_PG not set");
        let mut source = PostgresRowSource::connect(&dsn).unwrap();
        let count = source.count().unwrap();
        let rows = source.fetch_page(PageDescriptor { offset: 0, limit: 8 }).unwrap();
        assert_eq!(rows.len() as u64, count.min(8));
    }
}

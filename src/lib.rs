pub mod aggregator;
pub mod config;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod pipeline;
#[cfg(feature = "postgres")]
pub mod postgres_source;
pub mod row_source;
pub mod sqlite_source;
pub mod whitelist;
pub mod worker;
pub mod writer;

pub use error::*;

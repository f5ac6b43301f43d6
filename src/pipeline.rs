use crate::aggregator::{Aggregator, Progress};
use crate::config::ScanConfig;
use crate::decoder::{BlockDecoder, NodeSet};
use crate::filter::FilterTable;
use crate::row_source::{SourceFactory, page_count, plan_pages};
use crate::whitelist::{self, Whitelist};
use crate::worker::WorkerPool;
use crate::{WhitelistError, writer};
use std::path::Path;
use std::thread;
use std::time::Instant;
use tracing::info;

/// What one scan over the `blocks` table found.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub row_count: u64,
    pub pages: u64,
    pub observed: NodeSet,
    pub skipped_rows: usize,
}

/// The finished whitelist together with the scan that produced it.
///
/// Kept separate from writing so a failed write can be retried without rescanning.
#[derive(Debug, Clone)]
pub struct Census {
    pub whitelist: Whitelist,
    pub report: ScanReport,
}

impl Census {
    pub fn write_to(&self, dest: &Path) -> Result<(), WhitelistError> {
        writer::write_whitelist(&self.whitelist, dest)
    }
}

/// Count rows on a short-lived connection of its own.
pub fn count_rows(factory: &dyn SourceFactory) -> Result<u64, WhitelistError> {
    let mut source = factory.open()?;
    source.count()
}

/// Scan every page with a worker pool, reporting progress after each merged page.
pub fn scan_with_progress<F>(
    factory: &dyn SourceFactory,
    decoder: &dyn BlockDecoder,
    config: &ScanConfig,
    row_count: u64,
    mut on_progress: F,
) -> Result<ScanReport, WhitelistError>
where
    F: FnMut(Progress),
{
    config.validate()?;
    let pages = page_count(row_count, config.chunk_size);
    info!(
        rows = row_count,
        pages,
        chunk_size = config.chunk_size,
        workers = config.workers,
        "scanning blocks"
    );

    let started = Instant::now();
    let mut aggregator = Aggregator::new(pages, config.progress_every);
    let pool = WorkerPool::new(factory, decoder, config.workers, config.decode_policy);
    pool.run(plan_pages(row_count, config.chunk_size).collect(), |page| {
        on_progress(aggregator.merge(page));
    })?;

    let skipped_rows = aggregator.skipped_rows();
    let observed = aggregator.finish();
    info!(
        nodes = observed.len(),
        skipped_rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scan complete"
    );

    Ok(ScanReport {
        row_count,
        pages,
        observed,
        skipped_rows,
    })
}

pub fn scan(
    factory: &dyn SourceFactory,
    decoder: &dyn BlockDecoder,
    config: &ScanConfig,
) -> Result<ScanReport, WhitelistError> {
    config.validate()?;
    let row_count = count_rows(factory)?;
    scan_with_progress(factory, decoder, config, row_count, |_| {})
}

/// Load the filter, scan the map and build the whitelist. Nothing is written.
///
/// The filter is parsed on a helper thread while the rows are counted; a bad
/// filter is reported before any page is scanned.
#[tracing::instrument(skip_all, fields(dump = %dump_path.display()))]
pub fn collect(
    dump_path: &Path,
    factory: &dyn SourceFactory,
    decoder: &dyn BlockDecoder,
    config: &ScanConfig,
) -> Result<Census, WhitelistError> {
    config.validate()?;

    let (filter, row_count) = thread::scope(|s| {
        let filter = s.spawn(|| FilterTable::load(dump_path));
        let row_count = count_rows(factory);
        let filter = filter
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (filter, row_count)
    });
    let filter = filter?;
    let row_count = row_count?;
    info!(entries = filter.len(), "filter table ready");

    let report = scan_with_progress(factory, decoder, config, row_count, |_| {})?;
    let whitelist = whitelist::build(&report.observed, &filter);
    info!(
        observed = report.observed.len(),
        whitelisted = whitelist.len(),
        "whitelist built"
    );

    Ok(Census { whitelist, report })
}

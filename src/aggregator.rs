use crate::decoder::NodeSet;
use crate::worker::PageNodes;
use rustc_hash::FxHashSet;
use tracing::{debug, info};

/// Pages merged so far out of the pages planned for the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Folds per-page node sets into the set of every node name seen in the map.
///
/// Lives on the coordinating thread only. Merging the same page twice is a no-op.
pub struct Aggregator {
    observed: NodeSet,
    completed: FxHashSet<u64>,
    total_pages: u64,
    skipped_rows: usize,
    log_every: usize,
}

impl Aggregator {
    pub fn new(total_pages: u64, log_every: usize) -> Self {
        Self {
            observed: NodeSet::default(),
            completed: FxHashSet::default(),
            total_pages,
            skipped_rows: 0,
            log_every: log_every.max(1),
        }
    }

    pub fn merge(&mut self, page: PageNodes) -> Progress {
        if !self.completed.insert(page.page.offset) {
            debug!(offset = page.page.offset, "page delivered twice; ignoring");
            return self.progress();
        }

        self.skipped_rows += page.skipped_rows;
        self.observed.extend(page.nodes);

        let progress = self.progress();
        if progress.completed as usize % self.log_every == 0 || progress.is_done() {
            info!(
                completed = progress.completed,
                total = progress.total,
                nodes = self.observed.len(),
                "scanned {:.1}% of pages",
                progress.percent()
            );
        }
        progress
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed.len() as u64,
            total: self.total_pages,
        }
    }

    pub fn observed(&self) -> &NodeSet {
        &self.observed
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn finish(self) -> NodeSet {
        self.observed
    }
}

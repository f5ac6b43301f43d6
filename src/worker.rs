use crate::config::DecodePolicy;
use crate::decoder::{BlockDecoder, NodeSet};
use crate::row_source::{PageDescriptor, RowSource, SourceFactory};
use crate::WhitelistError;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, warn};

/// Union of the node names found in one page of blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNodes {
    pub page: PageDescriptor,
    pub nodes: NodeSet,
    pub skipped_rows: usize,
}

type PageResult = Result<PageNodes, WhitelistError>;

/// Fetch one page and decode every block in it.
pub fn process_page(
    source: &mut dyn RowSource,
    decoder: &dyn BlockDecoder,
    policy: DecodePolicy,
    page: PageDescriptor,
) -> PageResult {
    let blocks = source.fetch_page(page)?;
    let mut nodes = NodeSet::default();
    let mut skipped_rows = 0;

    for (row, block) in blocks.iter().enumerate() {
        match decoder.decode(block) {
            Ok(found) => nodes.extend(found),
            Err(failure) => match policy {
                DecodePolicy::Abort => {
                    return Err(WhitelistError::Decode {
                        offset: page.offset,
                        row,
                        message: failure.0,
                    });
                }
                DecodePolicy::Skip => {
                    warn!(offset = page.offset, row, error = %failure, "skipping undecodable block");
                    skipped_rows += 1;
                }
            },
        }
    }

    Ok(PageNodes {
        page,
        nodes,
        skipped_rows,
    })
}

/// Fixed-size pool of OS threads, each owning its own store connection.
pub struct WorkerPool<'a> {
    factory: &'a dyn SourceFactory,
    decoder: &'a dyn BlockDecoder,
    workers: usize,
    policy: DecodePolicy,
}

impl<'a> WorkerPool<'a> {
    pub fn new(
        factory: &'a dyn SourceFactory,
        decoder: &'a dyn BlockDecoder,
        workers: usize,
        policy: DecodePolicy,
    ) -> Self {
        Self {
            factory,
            decoder,
            workers: workers.max(1),
            policy,
        }
    }

    /// Process every page, handing each finished page to `on_page` on the calling thread.
    ///
    /// Pages complete in any order. On the first fatal error the remaining workers
    /// stop claiming pages, every worker is joined (closing its connection) and the
    /// error is returned.
    pub fn run<F>(&self, pages: Vec<PageDescriptor>, mut on_page: F) -> Result<(), WhitelistError>
    where
        F: FnMut(PageNodes),
    {
        if pages.is_empty() {
            return Ok(());
        }
        let workers = self.workers.min(pages.len());

        let (page_tx, page_rx) = crossbeam_channel::unbounded();
        for page in pages {
            let _ = page_tx.send(page);
        }
        drop(page_tx);

        let (result_tx, result_rx) = crossbeam_channel::bounded::<PageResult>(workers * 2);
        let cancelled = AtomicBool::new(false);

        thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let page_rx = page_rx.clone();
                    let result_tx = result_tx.clone();
                    let cancelled = &cancelled;
                    s.spawn(move || self.worker_loop(id, page_rx, result_tx, cancelled))
                })
                .collect();
            drop(result_tx);

            let mut first_error = None;
            // Ends once every worker has dropped its sender.
            for result in result_rx.iter() {
                match result {
                    Ok(page) if first_error.is_none() => on_page(page),
                    Ok(_) => {}
                    Err(e) => {
                        cancelled.store(true, Ordering::SeqCst);
                        if first_error.is_none() {
                            first_error = Some(e);
                        } else {
                            debug!(error = %e, "additional worker error after cancellation");
                        }
                    }
                }
            }

            for (id, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() && first_error.is_none() {
                    first_error = Some(WhitelistError::WorkerPanicked(id));
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    fn worker_loop(
        &self,
        id: usize,
        pages: Receiver<PageDescriptor>,
        results: Sender<PageResult>,
        cancelled: &AtomicBool,
    ) {
        let _guard = CancelOnPanic(cancelled);
        let mut source = match self.factory.open() {
            Ok(source) => source,
            Err(e) => {
                let _ = results.send(Err(e));
                return;
            }
        };
        debug!(worker = id, "worker connected");

        let mut processed = 0usize;
        while !cancelled.load(Ordering::SeqCst) {
            let Ok(page) = pages.recv() else { break };
            let result = process_page(source.as_mut(), self.decoder, self.policy, page);
            let failed = result.is_err();
            if failed {
                cancelled.store(true, Ordering::SeqCst);
            }
            if results.send(result).is_err() || failed {
                break;
            }
            processed += 1;
        }

        debug!(worker = id, processed, "worker finished");
    }
}

/// Raises the pool's cancel flag if the owning worker unwinds.
struct CancelOnPanic<'a>(&'a AtomicBool);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeFailure, parse_node_lines};
    use crate::row_source::{InMemoryStore, plan_pages};

    fn lines_decoder(block: &[u8]) -> Result<NodeSet, DecodeFailure> {
        if block.starts_with(b"!") {
            return Err(DecodeFailure("corrupt block".to_string()));
        }
        Ok(parse_node_lines(block))
    }

    fn blocks(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_process_page_unions_blocks() {
        let store = InMemoryStore::new(blocks(&["air\nstone", "stone\ndirt", "water"]));
        let mut source = store.open().unwrap();
        let page = PageDescriptor { offset: 0, limit: 2 };
        let result = process_page(source.as_mut(), &lines_decoder, DecodePolicy::Abort, page).unwrap();
        let mut names: Vec<_> = result.nodes.into_iter().collect();
        names.sort();
        assert_eq!(names, blocks(&["air", "dirt", "stone"]));
        assert_eq!(result.skipped_rows, 0);
    }

    #[test]
    fn test_process_page_abort_reports_row() {
        let store = InMemoryStore::new(blocks(&["air", "!bad", "stone"]));
        let mut source = store.open().unwrap();
        let page = PageDescriptor { offset: 0, limit: 3 };
        let err = process_page(source.as_mut(), &lines_decoder, DecodePolicy::Abort, page).unwrap_err();
        match err {
            WhitelistError::Decode { offset, row, .. } => {
                assert_eq!(offset, 0);
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_process_page_skip_counts_rows() {
        let store = InMemoryStore::new(blocks(&["air", "!bad", "!worse", "stone"]));
        let mut source = store.open().unwrap();
        let page = PageDescriptor { offset: 0, limit: 4 };
        let result = process_page(source.as_mut(), &lines_decoder, DecodePolicy::Skip, page).unwrap();
        assert_eq!(result.skipped_rows, 2);
        assert_eq!(result.nodes.len(), 2);
    }

    #[test]
    fn test_pool_delivers_every_page_once() {
        let rows: Vec<Vec<u8>> = (0..50).map(|i| format!("node{}", i).into_bytes()).collect();
        let store = InMemoryStore::new(rows);
        let pool = WorkerPool::new(&store, &lines_decoder, 4, DecodePolicy::Abort);

        let mut offsets = Vec::new();
        pool.run(plan_pages(50, 7).collect(), |page| offsets.push(page.page.offset)).unwrap();
        offsets.sort();
        assert_eq!(offsets, vec![0, 7, 14, 21, 28, 35, 42, 49]);
        assert_eq!(store.opened(), 4);
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn test_pool_never_opens_more_connections_than_pages() {
        let store = InMemoryStore::new(blocks(&["air"]));
        let pool = WorkerPool::new(&store, &lines_decoder, 8, DecodePolicy::Abort);
        pool.run(plan_pages(1, 64).collect(), |_| {}).unwrap();
        assert_eq!(store.opened(), 1);
    }

    #[test]
    fn test_pool_empty_work_opens_nothing() {
        let store = InMemoryStore::new(Vec::new());
        let pool = WorkerPool::new(&store, &lines_decoder, 4, DecodePolicy::Abort);
        pool.run(Vec::new(), |_| panic!("no pages expected")).unwrap();
        assert_eq!(store.opened(), 0);
    }

    #[test]
    fn test_pool_decode_failure_tears_down_workers() {
        let mut rows: Vec<Vec<u8>> = (0..200).map(|i| format!("node{}", i).into_bytes()).collect();
        rows[57] = b"!corrupt".to_vec();
        let store = InMemoryStore::new(rows);
        let pool = WorkerPool::new(&store, &lines_decoder, 3, DecodePolicy::Abort);

        let err = pool.run(plan_pages(200, 10).collect(), |_| {}).unwrap_err();
        assert!(matches!(err, WhitelistError::Decode { offset: 50, row: 7, .. }));
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn test_pool_fetch_failure_is_fatal() {
        let rows: Vec<Vec<u8>> = (0..20).map(|i| format!("node{}", i).into_bytes()).collect();
        let store = InMemoryStore::new(rows).failing_at(10);
        let pool = WorkerPool::new(&store, &lines_decoder, 2, DecodePolicy::Skip);

        let err = pool.run(plan_pages(20, 5).collect(), |_| {}).unwrap_err();
        assert!(matches!(err, WhitelistError::SourceUnavailable(_)));
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn test_pool_reports_worker_panic() {
        let store = InMemoryStore::new(blocks(&["air"]));
        let decoder = |_: &[u8]| -> Result<NodeSet, DecodeFailure> { panic!("codec crashed") };
        let pool = WorkerPool::new(&store, &decoder, 1, DecodePolicy::Abort);

        let err = pool.run(plan_pages(1, 1).collect(), |_| {}).unwrap_err();
        assert!(matches!(err, WhitelistError::WorkerPanicked(0)));
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn test_pool_worker_panic_stops_other_workers() {
        use std::sync::atomic::AtomicUsize;

        let mut rows: Vec<Vec<u8>> = (0..2000).map(|i| format!("node{}", i).into_bytes()).collect();
        rows[0] = b"crash".to_vec();
        let store = InMemoryStore::new(rows);

        let crashed = AtomicBool::new(false);
        let decoded_after_crash = AtomicUsize::new(0);
        let decoder = |block: &[u8]| -> Result<NodeSet, DecodeFailure> {
            if block == b"crash" {
                crashed.store(true, Ordering::SeqCst);
                panic!("codec crashed");
            }
            if crashed.load(Ordering::SeqCst) {
                decoded_after_crash.fetch_add(1, Ordering::SeqCst);
            }
            Ok(parse_node_lines(block))
        };
        let pool = WorkerPool::new(&store, &decoder, 2, DecodePolicy::Abort);

        let mut merged = 0usize;
        let err = pool.run(plan_pages(2000, 1).collect(), |_| merged += 1).unwrap_err();
        assert!(matches!(err, WhitelistError::WorkerPanicked(_)));
        assert!(
            decoded_after_crash.load(Ordering::SeqCst) < 100,
            "decoded {} blocks after the crash",
            decoded_after_crash.load(Ordering::SeqCst)
        );
        assert!(merged < 1999, "merged {} pages", merged);
        assert_eq!(store.live(), 0);
    }
}

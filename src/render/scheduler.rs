//! Render scheduler - owns the worker pool and the per-view supersession rule

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use super::cache::{CacheKey, PageCache};
use super::request::{
    Delivery, Generation, GenerationTable, RenderHandle, RenderRequest, RenderedSurface, ViewTag,
    WorkerJob, WorkerOutput,
};
use super::source::{Crop, PageSource};
use super::worker::{Waker, WorkerContext, render_worker};
use super::{DEFAULT_CACHE_PAGES, DEFAULT_WORKERS};

/// Worker pool and cache sizing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of render threads (at least one is spawned)
    pub workers: usize,
    /// In-memory LRU capacity in surfaces; 0 disables caching and prefetch
    pub cache_pages: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

/// Runs page rendering off the UI thread.
///
/// Each view tag has at most one live request: submitting supersedes whatever
/// was outstanding for the tag. Superseded work may still run to completion on
/// a worker but its result is never delivered. Results are collected on the UI
/// thread with [`poll`](Self::poll); a [`Waker`] can be installed so the host
/// event loop knows when to poll.
pub struct RenderScheduler {
    job_tx: Sender<WorkerJob>,
    output_rx: Receiver<WorkerOutput>,
    generations: Arc<GenerationTable>,
    outstanding: HashMap<ViewTag, Generation>,
    cache: Option<Arc<Mutex<PageCache>>>,
    prefetch_in_flight: Arc<Mutex<HashSet<CacheKey>>>,
    waker: Arc<Mutex<Option<Waker>>>,
    page_count: usize,
    num_workers: usize,
}

impl RenderScheduler {
    /// Spawn the worker pool for `source`
    #[must_use]
    pub fn new(source: Arc<dyn PageSource>, config: SchedulerConfig) -> Self {
        let cache = (config.cache_pages > 0)
            .then(|| Arc::new(Mutex::new(PageCache::new(config.cache_pages))));
        let generations = Arc::new(GenerationTable::default());
        let prefetch_in_flight = Arc::new(Mutex::new(HashSet::new()));
        let waker: Arc<Mutex<Option<Waker>>> = Arc::new(Mutex::new(None));
        let page_count = source.page_count();

        // flume gives an MPMC queue: every worker pulls from the same request channel
        let (job_tx, job_rx) = flume::unbounded();
        let (output_tx, output_rx) = flume::unbounded();

        let num_workers = config.workers.max(1);
        let ctx = WorkerContext {
            source,
            generations: generations.clone(),
            cache: cache.clone(),
            prefetch_in_flight: prefetch_in_flight.clone(),
            waker: waker.clone(),
        };

        for _ in 0..num_workers {
            let ctx = ctx.clone();
            let rx = job_rx.clone();
            let tx = output_tx.clone();

            std::thread::spawn(move || {
                render_worker(ctx, rx, tx);
            });
        }

        debug!("render scheduler started with {num_workers} workers, cache {}", config.cache_pages);

        Self {
            job_tx,
            output_rx,
            generations,
            outstanding: HashMap::new(),
            cache,
            prefetch_in_flight,
            waker,
            page_count,
            num_workers,
        }
    }

    /// Queue `request`, superseding any outstanding request for the same tag. Never blocks.
    pub fn submit(&mut self, request: RenderRequest) -> RenderHandle {
        let generation = self.generations.advance(request.tag);
        if let Some(previous) = self.outstanding.insert(request.tag, generation) {
            debug!(
                "{} request {:?} supersedes generation {}",
                request.tag, request.slot, previous.0
            );
        }

        if self
            .job_tx
            .send(WorkerJob::Render {
                generation,
                request,
            })
            .is_err()
        {
            warn!("render workers are gone; {} request dropped", request.tag);
        }

        RenderHandle {
            tag: request.tag,
            generation,
        }
    }

    /// Invalidate any outstanding request or undelivered result for `tag`
    pub fn cancel(&mut self, tag: ViewTag) {
        self.generations.advance(tag);
        self.outstanding.remove(&tag);
    }

    /// Render a page into the cache ahead of navigation.
    ///
    /// Returns `false` when caching is disabled, the page is out of range, or
    /// the surface is already cached or queued.
    pub fn prefetch(&mut self, index: usize, width: u32, height: u32, crop: Crop) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        if index >= self.page_count || width == 0 || height == 0 {
            return false;
        }

        let key = CacheKey::new(index, width, height, crop);
        if cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
        {
            return false;
        }
        if !self
            .prefetch_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
        {
            return false;
        }

        self.job_tx.send(WorkerJob::Prefetch(key)).is_ok()
    }

    /// Drain completed work, keeping only the latest request of each tag
    pub fn poll(&mut self) -> Vec<Delivery> {
        let mut deliveries = vec![];

        while let Ok(output) = self.output_rx.try_recv() {
            if let Some(delivery) = self.accept(output) {
                deliveries.push(delivery);
            }
        }

        deliveries
    }

    /// Block up to `timeout` for at least one delivery, then drain the rest.
    ///
    /// For hosts without an event loop (the headless shell, tests); a GUI shell
    /// uses [`poll`](Self::poll) from its waker instead.
    pub fn wait(&mut self, timeout: Duration) -> Vec<Delivery> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.output_rx.recv_timeout(remaining) {
                Ok(output) => {
                    if let Some(delivery) = self.accept(output) {
                        let mut deliveries = vec![delivery];
                        deliveries.extend(self.poll());
                        return deliveries;
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return vec![],
            }
        }
    }

    fn accept(&mut self, output: WorkerOutput) -> Option<Delivery> {
        let tag = output.request.tag;
        if !self.generations.is_current(tag, output.generation) {
            debug!("discarding superseded {tag} result");
            return None;
        }
        self.outstanding.remove(&tag);

        Some(match output.result {
            Ok(surface) => Delivery::Rendered(RenderedSurface {
                request: output.request,
                surface,
            }),
            Err(fault) => Delivery::Failed {
                request: output.request,
                fault,
            },
        })
    }

    /// Install the callback workers run when a delivery is ready
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    /// Whether a request for `tag` is still waiting to be delivered
    #[must_use]
    pub fn has_outstanding(&self, tag: ViewTag) -> bool {
        self.outstanding.contains_key(&tag)
    }

    /// True when every submitted request has been delivered or cancelled
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Number of cached surfaces
    #[must_use]
    pub fn cached_pages(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| {
            cache.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    /// Check whether a page is cached at the given size and crop
    #[must_use]
    pub fn is_cached(&self, index: usize, width: u32, height: u32, crop: Crop) -> bool {
        let key = CacheKey::new(index, width, height, crop);
        self.cache.as_ref().is_some_and(|cache| {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&key)
        })
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Shutdown all workers once they finish the queued work
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.job_tx.send(WorkerJob::Shutdown);
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderFault, SurfaceKind};
    use crate::test_utils::SyntheticDeck;

    const WAIT: Duration = Duration::from_secs(5);

    fn scheduler(deck: SyntheticDeck, config: SchedulerConfig) -> RenderScheduler {
        RenderScheduler::new(Arc::new(deck), config)
    }

    #[test]
    fn delivers_rendered_surface_of_requested_size() {
        let mut scheduler = scheduler(SyntheticDeck::new(3), SchedulerConfig::default());
        scheduler.submit(RenderRequest::page(ViewTag::Main, 1, 64, 48, Crop::Full));

        let deliveries = scheduler.wait(WAIT);
        assert_eq!(deliveries.len(), 1);
        let Delivery::Rendered(rendered) = &deliveries[0] else {
            panic!("expected a rendered surface, got {:?}", deliveries[0]);
        };
        assert_eq!(rendered.surface.size(), (64, 48));
        assert_eq!(rendered.surface.page(), Some(1));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn second_submit_for_same_tag_is_the_only_delivery() {
        let deck = SyntheticDeck::new(10).with_delay(Duration::from_millis(40));
        let mut scheduler = scheduler(
            deck,
            SchedulerConfig {
                workers: 2,
                cache_pages: 0,
            },
        );

        scheduler.submit(RenderRequest::page(ViewTag::Main, 5, 100, 75, Crop::Full));
        scheduler.submit(RenderRequest::page(ViewTag::Main, 5, 200, 150, Crop::Full));

        let deliveries = scheduler.wait(WAIT);
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].request().size(), (200, 150));

        // Give the superseded render time to finish; it must never surface
        std::thread::sleep(Duration::from_millis(120));
        assert!(scheduler.poll().is_empty());
    }

    #[test]
    fn cancel_discards_pending_result() {
        let deck = SyntheticDeck::new(2).with_delay(Duration::from_millis(30));
        let mut scheduler = scheduler(deck, SchedulerConfig::default());

        scheduler.submit(RenderRequest::page(ViewTag::Thumbnail, 1, 32, 32, Crop::Full));
        scheduler.cancel(ViewTag::Thumbnail);
        assert!(!scheduler.has_outstanding(ViewTag::Thumbnail));

        assert!(scheduler.wait(Duration::from_millis(200)).is_empty());
    }

    #[test]
    fn decode_failure_is_delivered_as_fault_for_that_tag_only() {
        let deck = SyntheticDeck::new(4).with_broken_page(2);
        let mut scheduler = scheduler(deck, SchedulerConfig::default());

        scheduler.submit(RenderRequest::page(ViewTag::Main, 2, 40, 30, Crop::Full));
        scheduler.submit(RenderRequest::page(ViewTag::Thumbnail, 3, 40, 30, Crop::Full));

        let mut deliveries = Vec::new();
        while deliveries.len() < 2 {
            let batch = scheduler.wait(WAIT);
            assert!(!batch.is_empty(), "timed out waiting for deliveries");
            deliveries.extend(batch);
        }
        deliveries.sort_by_key(Delivery::tag);

        assert!(matches!(
            &deliveries[0],
            Delivery::Failed { request, fault } if request.tag == ViewTag::Main && fault.page() == Some(2)
        ));
        assert!(matches!(&deliveries[1], Delivery::Rendered(r) if r.surface.page() == Some(3)));
    }

    #[test]
    fn panicking_backend_becomes_fault() {
        let deck = SyntheticDeck::new(2).with_panicking_page(0);
        let mut scheduler = scheduler(deck, SchedulerConfig::default());

        scheduler.submit(RenderRequest::page(ViewTag::Secondary, 0, 10, 10, Crop::Full));
        let deliveries = scheduler.wait(WAIT);

        assert!(matches!(
            &deliveries[0],
            Delivery::Failed {
                fault: RenderFault::Panicked { page: 0 },
                ..
            }
        ));

        // The worker survived
        scheduler.submit(RenderRequest::page(ViewTag::Secondary, 1, 10, 10, Crop::Full));
        assert_eq!(scheduler.wait(WAIT).len(), 1);
    }

    #[test]
    fn end_slot_renders_placeholder() {
        let mut scheduler = scheduler(SyntheticDeck::new(1), SchedulerConfig::default());
        scheduler.submit(RenderRequest::end(ViewTag::Thumbnail, 30, 20));

        let deliveries = scheduler.wait(WAIT);
        let Delivery::Rendered(rendered) = &deliveries[0] else {
            panic!("expected placeholder surface");
        };
        assert_eq!(rendered.surface.kind, SurfaceKind::EndOfDeck);
    }

    #[test]
    fn prefetch_fills_cache_without_delivery() {
        let deck = SyntheticDeck::new(5);
        let renders = deck.render_counter();
        let mut scheduler = scheduler(deck, SchedulerConfig::default());

        assert!(scheduler.prefetch(3, 80, 60, Crop::Full));
        assert!(!scheduler.prefetch(3, 80, 60, Crop::Full));
        assert!(!scheduler.prefetch(9, 80, 60, Crop::Full));

        let deadline = Instant::now() + WAIT;
        while !scheduler.is_cached(3, 80, 60, Crop::Full) {
            assert!(Instant::now() < deadline, "prefetch never landed in cache");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(scheduler.poll().is_empty());

        // A view request for the same key is served from cache
        scheduler.submit(RenderRequest::page(ViewTag::Main, 3, 80, 60, Crop::Full));
        assert_eq!(scheduler.wait(WAIT).len(), 1);
        assert_eq!(renders.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn prefetch_disabled_without_cache() {
        let mut scheduler = scheduler(
            SyntheticDeck::new(5),
            SchedulerConfig {
                workers: 1,
                cache_pages: 0,
            },
        );
        assert!(!scheduler.prefetch(1, 80, 60, Crop::Full));
    }

    #[test]
    fn waker_runs_when_result_is_ready() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut scheduler = scheduler(SyntheticDeck::new(2), SchedulerConfig::default());
        let woken = Arc::new(AtomicUsize::new(0));
        let counter = woken.clone();
        scheduler.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.submit(RenderRequest::page(ViewTag::Main, 0, 16, 16, Crop::Full));
        assert_eq!(scheduler.wait(WAIT).len(), 1);

        // The waker runs right after the output is queued
        let deadline = Instant::now() + WAIT;
        while woken.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "waker never ran");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

//! Render worker - runs in separate thread(s)

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::cache::{CacheKey, PageCache};
use super::request::{GenerationTable, RenderFault, RenderRequest, WorkerJob, WorkerOutput};
use super::source::PageSource;
use super::surface::PixelSurface;

/// Callback run from worker threads when a delivery is waiting to be polled
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Everything a worker shares with the scheduler
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub source: Arc<dyn PageSource>,
    pub generations: Arc<GenerationTable>,
    pub cache: Option<Arc<Mutex<PageCache>>>,
    pub prefetch_in_flight: Arc<Mutex<HashSet<CacheKey>>>,
    pub waker: Arc<Mutex<Option<Waker>>>,
}

impl WorkerContext {
    fn wake(&self) {
        let waker = self
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<PixelSurface>> {
        self.cache.as_ref().and_then(|cache| {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
        })
    }

    fn store(&self, key: CacheKey, surface: PixelSurface) -> Arc<PixelSurface> {
        match &self.cache {
            Some(cache) => cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, surface),
            None => Arc::new(surface),
        }
    }
}

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub(crate) fn render_worker(
    ctx: WorkerContext,
    jobs: Receiver<WorkerJob>,
    outputs: Sender<WorkerOutput>,
) {
    debug!("render worker started");

    for job in jobs.iter() {
        match job {
            WorkerJob::Render {
                generation,
                request,
            } => {
                if !ctx.generations.is_current(request.tag, generation) {
                    debug!("skipping superseded {} request {:?}", request.tag, request.slot);
                    continue;
                }

                let result = render_request(&ctx, &request);

                // Superseded while rendering: drop the result without a callback
                if !ctx.generations.is_current(request.tag, generation) {
                    continue;
                }

                let output = WorkerOutput {
                    generation,
                    request,
                    result,
                };
                if outputs.send(output).is_err() {
                    break;
                }
                ctx.wake();
            }

            WorkerJob::Prefetch(key) => {
                prefetch(&ctx, key);
                ctx.prefetch_in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
            }

            WorkerJob::Shutdown => break,
        }
    }

    debug!("render worker stopped");
}

fn render_request(
    ctx: &WorkerContext,
    request: &RenderRequest,
) -> Result<Arc<PixelSurface>, RenderFault> {
    let Some(key) = CacheKey::from_request(request) else {
        return Ok(Arc::new(PixelSurface::end_of_deck(
            request.width,
            request.height,
        )));
    };

    if let Some(hit) = ctx.cached(&key) {
        return Ok(hit);
    }

    let surface = guarded_render(ctx.source.as_ref(), key)
        .inspect_err(|e| warn!("{} view: {e}", request.tag))?;

    Ok(ctx.store(key, surface))
}

fn prefetch(ctx: &WorkerContext, key: CacheKey) {
    if ctx.cached(&key).is_some() {
        return;
    }

    match guarded_render(ctx.source.as_ref(), key) {
        Ok(surface) => {
            ctx.store(key, surface);
        }
        Err(e) => debug!("prefetch of page {} failed: {e}", key.page),
    }
}

/// Render one page, turning a panicking backend into a fault local to that page
fn guarded_render(source: &dyn PageSource, key: CacheKey) -> Result<PixelSurface, RenderFault> {
    match catch_unwind(AssertUnwindSafe(|| {
        source.render_cropped(key.page, key.width, key.height, key.crop)
    })) {
        Ok(result) => result.map_err(RenderFault::from),
        Err(_) => Err(RenderFault::Panicked { page: key.page }),
    }
}

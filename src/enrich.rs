//! The resumable enrichment loop: pop one item, fetch its detail page with
//! retries, checkpoint the result, repeat.

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::PersistResult;
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::frontier::Frontier;
use crate::model::Fragment;
use crate::retry::RetryPolicy;

/// Everything one run needs, owned by the run loop.
pub struct PipelineContext<F, X> {
    pub fetcher: F,
    pub extractor: X,
    pub retry: RetryPolicy,
    pub store: CheckpointStore,
    pub cancel: CancellationToken,
    /// Stop after this many items, leaving the rest pending.
    pub limit: Option<usize>,
}

/// Enrichment stats returned after the loop stops.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub ok: usize,
    pub degraded: usize,
    pub remaining: usize,
    pub interrupted: bool,
}

pub async fn run<F, X>(ctx: &mut PipelineContext<F, X>, mut frontier: Frontier) -> PersistResult<RunStats>
where
    F: Fetcher,
    X: Extractor<Output = Fragment>,
{
    let pb = ProgressBar::new(frontier.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    let mut stats = RunStats::default();
    debug!(
        "Up to {} attempts per item, {} pending",
        ctx.retry.max_attempts(),
        frontier.len()
    );

    loop {
        if ctx.cancel.is_cancelled() {
            stats.interrupted = true;
            break;
        }
        if ctx.limit.is_some_and(|n| stats.processed >= n) {
            break;
        }
        let Some(item) = frontier.pop() else {
            break;
        };
        pb.set_message(item.name.clone());
        info!("Enriching {}", item.name);

        // The in-flight item is abandoned on interrupt; it is still in the
        // stored frontier because nothing was appended for it.
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            e = ctx.retry.enrich(&mut ctx.fetcher, &ctx.extractor, &item.link) => Some(e),
        };
        let Some(enrichment) = outcome else {
            frontier.push_front(item);
            stats.interrupted = true;
            break;
        };

        debug!("{} finished after {} attempt(s)", item.link, enrichment.attempts);
        ctx.store.append(item, enrichment.fragment)?;
        ctx.store.flush()?;

        stats.processed += 1;
        if enrichment.degraded {
            stats.degraded += 1;
        } else {
            stats.ok += 1;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    ctx.store.flush()?;
    stats.remaining = frontier.len();

    if stats.interrupted {
        warn!(
            "Stopped early: {} done this run, {} left for next time",
            stats.processed, stats.remaining
        );
    } else {
        info!(
            "Enriched {} items ({} ok, {} degraded)",
            stats.processed, stats.ok, stats.degraded
        );
    }
    Ok(stats)
}

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::invocation::Artifact;
use crate::target::Target;

/// A pinned, boxed, `Send` future used as the return type for async scan work.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-target outcome of the scan stage.
///
/// The dispatcher produces `Success` and `InvocationFailure`; the aggregator
/// refines `Success` into `ArtifactMissing` or `ParseFailure` when the output
/// artifact lets it down. Every target resolves to exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The scanner completed; the artifact should hold a findings array.
    Success,
    /// The scanner could not be run to completion (non-zero exit, spawn
    /// failure, or timeout). Scanners routinely fail per-target — missing
    /// permissions, deleted repos — so this never aborts the batch.
    InvocationFailure {
        /// Process exit code, when the process ran at all.
        exit_code: Option<i32>,
        /// Captured stderr or a description of what went wrong.
        stderr: Box<str>,
    },
    /// The scanner reported success but its output artifact does not exist.
    ArtifactMissing,
    /// The artifact exists but is not a valid findings array.
    ParseFailure,
}

/// The association between a target and what became of its scan.
#[derive(Debug)]
pub struct RunResult {
    /// The originating target, owned so aggregation can key on it.
    pub target: Target,
    /// Outcome of the invocation.
    pub status: RunStatus,
    /// Findings artifact; present even on failure since partial output may
    /// exist and file artifacts still need cleanup.
    pub artifact: Artifact,
}

/// One unit of scan work, substitutable at the dispatcher seam.
///
/// [`BinaryRunner`](crate::invocation::BinaryRunner) runs the scanner
/// directly; download-then-scan sources wrap it with a fetch step; tests
/// substitute stubs.
pub trait ScanRunner: Send + Sync {
    /// Scans one target, returning its status and findings artifact.
    /// Implementations must not error or panic: any per-target problem is
    /// reported as an [`RunStatus::InvocationFailure`].
    fn scan<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, (RunStatus, Artifact)>;
}

/// Fans `targets` out to `width` workers and collects one [`RunResult`] per
/// target.
///
/// The pool is an explicit queue/worker/results-channel arrangement: workers
/// pull from a shared queue until it drains, so at most `width` scanner
/// processes run at once. Results arrive in completion order — callers must
/// not assume input order, only that each target appears exactly once.
pub async fn dispatch(targets: Vec<Target>, width: usize, runner: Arc<dyn ScanRunner>) -> Vec<RunResult> {
    let expected = targets.len();
    let width = width.clamp(1, expected.max(1));
    debug!(targets = expected, width, "dispatching scan pool");

    let queue = Arc::new(Mutex::new(VecDeque::from(targets)));
    let (tx, mut rx) = mpsc::channel::<RunResult>(expected.max(1));

    let mut workers = Vec::with_capacity(width);
    for worker in 0..width {
        let queue = Arc::clone(&queue);
        let runner = Arc::clone(&runner);
        let tx = tx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let next = match queue.lock() {
                    Ok(mut queue) => queue.pop_front(),
                    // Poisoned only if another worker panicked; stop pulling.
                    Err(_) => None,
                };
                let Some(target) = next else { break };

                debug!(worker, locator = %target.locator, "worker picked up target");
                let (status, artifact) = runner.scan(&target).await;
                let result = RunResult {
                    target,
                    status,
                    artifact,
                };
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut results = Vec::with_capacity(expected);
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    for handle in workers {
        if let Err(e) = handle.await {
            warn!(error = %e, "scan worker aborted");
        }
    }

    results
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::target::SourceKind;

    /// Records every locator it scans and tracks peak concurrency.
    struct StubRunner {
        invocations: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubRunner {
        fn new() -> Self {
            Self {
                invocations: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl ScanRunner for StubRunner {
        fn scan<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, (RunStatus, Artifact)> {
            Box::pin(async move {
                self.invocations.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if target.locator.ends_with("bad") {
                    let status = RunStatus::InvocationFailure {
                        exit_code: Some(1),
                        stderr: "denied".into(),
                    };
                    (status, Artifact::Buffer(Vec::new()))
                } else {
                    (RunStatus::Success, Artifact::Buffer(b"[]".to_vec()))
                }
            })
        }
    }

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::new(SourceKind::Archive, format!("target-{i}")))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_target_resolves_exactly_once() {
        let runner = Arc::new(StubRunner::new());
        let results = dispatch(targets(20), 3, Arc::clone(&runner) as Arc<dyn ScanRunner>).await;

        assert_eq!(results.len(), 20);
        assert_eq!(runner.invocations.load(Ordering::SeqCst), 20);

        let seen: HashSet<&str> = results.iter().map(|r| &*r.target.locator).collect();
        assert_eq!(seen.len(), 20, "no duplicate and no dropped targets");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_width_bounds_concurrency() {
        let runner = Arc::new(StubRunner::new());
        dispatch(targets(24), 3, Arc::clone(&runner) as Arc<dyn ScanRunner>).await;

        assert!(
            runner.peak.load(Ordering::SeqCst) <= 3,
            "peak concurrency {} exceeded pool width",
            runner.peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn failures_are_recorded_without_aborting_the_batch() {
        let mut list = targets(4);
        list.push(Target::new(SourceKind::Archive, "target-bad"));

        let results = dispatch(list, 2, Arc::new(StubRunner::new())).await;

        assert_eq!(results.len(), 5);
        let failed: Vec<_> = results
            .iter()
            .filter(|r| matches!(r.status, RunStatus::InvocationFailure { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(&*failed[0].target.locator, "target-bad");
    }

    #[tokio::test]
    async fn empty_target_list_yields_no_results() {
        let results = dispatch(Vec::new(), 3, Arc::new(StubRunner::new())).await;
        assert!(results.is_empty());
    }

    #[test]
    fn conservation_holds_for_arbitrary_sizes_and_widths() {
        proptest::proptest!(|(n in 0usize..40, width in 1usize..8)| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("runtime should build");
            let results = rt.block_on(dispatch(targets(n), width, Arc::new(StubRunner::new())));

            proptest::prop_assert_eq!(results.len(), n);
            let seen: HashSet<&str> = results.iter().map(|r| &*r.target.locator).collect();
            proptest::prop_assert_eq!(seen.len(), n);
        });
    }
}

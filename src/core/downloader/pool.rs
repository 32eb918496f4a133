// ─── Bounded Download Pool ───
// Fans bulk fetches (libraries, asset objects, mods) out over a fixed
// number of in-flight tasks. Submitting to a saturated pool waits for a
// slot; tasks are never dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::client::{DownloadTask, Downloader, FetchOutcome};

/// Called with `(completed, total)` after every finished task.
/// Calls are serialized, so `completed` is strictly increasing.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub failures: Vec<(DownloadTask, LauncherError)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.already_present
    }

    /// Fail with the first error when any task failed.
    pub fn into_result(mut self) -> LauncherResult<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        for (task, err) in &self.failures {
            warn!("Download failed: {} -> {:?}: {}", task.url, task.dest, err);
        }
        let (_, first) = self.failures.remove(0);
        Err(first)
    }
}

pub struct DownloadPool {
    downloader: Downloader,
    permits: Arc<Semaphore>,
    tasks: JoinSet<(DownloadTask, LauncherResult<FetchOutcome>)>,
    total: usize,
    completed: Arc<Mutex<usize>>,
    progress: Option<ProgressFn>,
}

impl DownloadPool {
    pub fn new(downloader: Downloader, size: usize) -> Self {
        Self {
            downloader,
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
            total: 0,
            completed: Arc::new(Mutex::new(0)),
            progress: None,
        }
    }

    /// Report progress against an expected total.
    pub fn with_progress(mut self, total: usize, progress: ProgressFn) -> Self {
        self.total = total;
        self.progress = Some(progress);
        self
    }

    /// Queue one task, waiting for a free slot when the pool is full.
    pub async fn submit(&mut self, task: DownloadTask) -> LauncherResult<()> {
        let cancel = self.downloader.cancellation().clone();
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|e| LauncherError::Other(format!("download pool closed: {e}")))?,
        };

        let downloader = self.downloader.clone();
        let completed = self.completed.clone();
        let progress = self.progress.clone();
        let total = self.total;

        self.tasks.spawn(async move {
            let result = downloader.fetch_task(&task).await;
            drop(permit);

            let mut done = match completed.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *done += 1;
            if let Some(report) = &progress {
                report(*done, total.max(*done));
            }
            (task, result)
        });
        Ok(())
    }

    /// Wait for every submitted task.
    pub async fn finish(mut self) -> BatchReport {
        let mut report = BatchReport::default();
        while let Some(joined) = self.tasks.join_next().await {
            report.total += 1;
            match joined {
                Ok((_, Ok(FetchOutcome::Downloaded))) => report.downloaded += 1,
                Ok((_, Ok(FetchOutcome::AlreadyPresent))) => report.already_present += 1,
                Ok((task, Err(err))) => report.failures.push((task, err)),
                Err(join_err) => report.failures.push((
                    DownloadTask::new("", ""),
                    LauncherError::Other(format!("download task panicked: {join_err}")),
                )),
            }
        }
        report
    }
}

impl Downloader {
    /// Fetch every task through a pool of `pool_size` slots.
    pub async fn fetch_all(
        &self,
        tasks: Vec<DownloadTask>,
        pool_size: usize,
        progress: Option<ProgressFn>,
    ) -> LauncherResult<BatchReport> {
        let total = tasks.len();
        info!("Starting bulk fetch: {} files, pool size {}", total, pool_size);

        let mut pool = DownloadPool::new(self.clone(), pool_size);
        if let Some(progress) = progress {
            pool = pool.with_progress(total, progress);
        }
        let mut submitted = Ok(());
        for task in tasks {
            if let Err(err) = pool.submit(task).await {
                submitted = Err(err);
                break;
            }
        }

        // In-flight tasks remove their own partial files when cancelled,
        // so they are always joined rather than aborted.
        let report = pool.finish().await;
        info!(
            "Bulk fetch done: {} downloaded, {} already present, {} failed",
            report.downloaded,
            report.already_present,
            report.failures.len()
        );
        submitted?;
        self.check_cancelled()?;
        report.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::client::RetryPolicy;
    use crate::core::downloader::testing::{Reply, TestOrigin};
    use crate::core::http::build_http_client;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn downloader() -> Downloader {
        Downloader::new(
            build_http_client().unwrap(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn hundred_assets_with_pool_of_twenty() {
        let origin = TestOrigin::start(|path, _hit| {
            Reply::ok(path.as_bytes().to_vec()).delayed(Duration::from_millis(15))
        })
        .await;
        let temp = TempDir::new().unwrap();
        let tasks: Vec<DownloadTask> = (0..100)
            .map(|i| {
                DownloadTask::new(
                    origin.url(&format!("/objects/{i:03}")),
                    temp.path().join(format!("objects/{i:03}")),
                )
            })
            .collect();

        let report = downloader().fetch_all(tasks, 20, None).await.unwrap();

        assert_eq!(report.succeeded(), 100);
        assert_eq!(report.downloaded, 100);
        assert!(report.failures.is_empty());
        assert_eq!(origin.hits(), 100);
        assert!(origin.max_in_flight() <= 20);
        assert!(origin.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_complete() {
        let origin = TestOrigin::start(|_path, _hit| Reply::ok(b"x".to_vec())).await;
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |done, total| {
            sink.lock().unwrap().push((done, total));
        });

        let tasks: Vec<DownloadTask> = (0..25)
            .map(|i| DownloadTask::new(origin.url(&format!("/{i}")), temp.path().join(i.to_string())))
            .collect();
        downloader().fetch_all(tasks, 4, Some(progress)).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 25);
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(seen.last(), Some(&(25, 25)));
    }

    #[tokio::test]
    async fn one_failing_file_fails_the_batch() {
        let origin = TestOrigin::start(|path, _hit| {
            if path == "/bad" {
                Reply::status(404)
            } else {
                Reply::ok(b"ok".to_vec())
            }
        })
        .await;
        let temp = TempDir::new().unwrap();
        let tasks = vec![
            DownloadTask::new(origin.url("/good"), temp.path().join("good")),
            DownloadTask::new(origin.url("/bad"), temp.path().join("bad")),
        ];

        let err = downloader().fetch_all(tasks, 2, None).await.unwrap_err();
        assert!(matches!(err, LauncherError::Network { .. }));
        assert!(temp.path().join("good").exists());
        assert!(!temp.path().join("bad").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelling_a_batch_leaves_no_partial_files() {
        let origin = TestOrigin::start(|_path, _hit| {
            Reply::ok(vec![b'x'; 100]).stalled_at(100_000)
        })
        .await;

        for _ in 0..5 {
            let temp = TempDir::new().unwrap();
            let token = CancellationToken::new();
            let dl = downloader().with_cancellation(token.clone());
            let tasks: Vec<DownloadTask> = (0..3)
                .map(|i| {
                    DownloadTask::new(origin.url(&format!("/f{i}")), temp.path().join(format!("f{i}")))
                })
                .collect();

            let canceller = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                canceller.cancel();
            });
            let err = dl.fetch_all(tasks, 1, None).await.unwrap_err();

            assert!(matches!(err, LauncherError::Cancelled));
            for i in 0..3 {
                assert!(!temp.path().join(format!("f{i}")).exists());
            }
        }
    }
}

//! Scheduling policies for tracker jobs.
//!
//! Both schedulers run every submitted job to completion and report each result by submission
//! index. A job that panics is reported as failed without disturbing the others.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error};

/// A unit of work handed to a scheduler.
pub type Job<T> = BoxFuture<'static, T>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The job panicked; carries the panic message when it was a string.
    Panicked(String),
    /// The worker running the job went away before reporting.
    Lost,
}

#[derive(Debug)]
pub struct JobReport<T> {
    /// Position of the job in submission order.
    pub index: usize,
    pub result: Result<T, JobFailure>,
}

pub trait JobScheduler<T>: Send
where
    T: Send + 'static,
{
    fn submit(&mut self, job: Job<T>);

    /// Runs every submitted job and returns their reports sorted by submission index.
    fn run_all(&mut self) -> BoxFuture<'_, Vec<JobReport<T>>>;
}

/// Which scheduler an orchestrator run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Serial,
    Parallel { workers: usize },
}

impl SchedulerKind {
    /// One worker (or none) means serial execution.
    pub fn from_worker_count(workers: usize) -> Self {
        if workers <= 1 {
            SchedulerKind::Serial
        } else {
            SchedulerKind::Parallel { workers }
        }
    }

    pub fn build<T>(self) -> Box<dyn JobScheduler<T>>
    where
        T: Send + 'static,
    {
        match self {
            SchedulerKind::Serial => Box::new(SerialScheduler::new()),
            SchedulerKind::Parallel { workers } => Box::new(BoundedParallelScheduler::new(workers)),
        }
    }
}

async fn run_guarded<T>(job: Job<T>) -> Result<T, JobFailure> {
    AssertUnwindSafe(job)
        .catch_unwind()
        .await
        .map_err(|payload| JobFailure::Panicked(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs jobs one at a time, in submission order, on the caller's task.
pub struct SerialScheduler<T> {
    jobs: Vec<Job<T>>,
}

impl<T> SerialScheduler<T> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }
}

impl<T> Default for SerialScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JobScheduler<T> for SerialScheduler<T>
where
    T: Send + 'static,
{
    fn submit(&mut self, job: Job<T>) {
        self.jobs.push(job);
    }

    fn run_all(&mut self) -> BoxFuture<'_, Vec<JobReport<T>>> {
        let jobs = std::mem::take(&mut self.jobs);
        Box::pin(async move {
            let mut reports = Vec::with_capacity(jobs.len());
            for (index, job) in jobs.into_iter().enumerate() {
                reports.push(JobReport {
                    index,
                    result: run_guarded(job).await,
                });
            }
            reports
        })
    }
}

/// Runs jobs on a fixed pool of tokio workers fed from a bounded queue.
pub struct BoundedParallelScheduler<T> {
    workers: usize,
    jobs: Vec<Job<T>>,
}

impl<T> BoundedParallelScheduler<T> {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            jobs: Vec::new(),
        }
    }
}

impl<T> JobScheduler<T> for BoundedParallelScheduler<T>
where
    T: Send + 'static,
{
    fn submit(&mut self, job: Job<T>) {
        self.jobs.push(job);
    }

    fn run_all(&mut self) -> BoxFuture<'_, Vec<JobReport<T>>> {
        let jobs = std::mem::take(&mut self.jobs);
        let workers = self.workers.min(jobs.len()).max(1);
        Box::pin(async move {
            let job_count = jobs.len();
            let (sender, receiver) = flume::bounded::<(usize, Job<T>)>(workers);

            let mut worker_handles = Vec::with_capacity(workers);
            for worker_idx in 0..workers {
                let worker_receiver = receiver.clone();
                worker_handles.push(tokio::spawn(async move {
                    let mut reports = Vec::new();
                    while let Ok((index, job)) = worker_receiver.recv_async().await {
                        debug!(event = "scheduler_job_started", worker = worker_idx, job = index);
                        reports.push(JobReport {
                            index,
                            result: run_guarded(job).await,
                        });
                    }
                    reports
                }));
            }
            drop(receiver);

            for (index, job) in jobs.into_iter().enumerate() {
                if sender.send_async((index, job)).await.is_err() {
                    error!(
                        event = "scheduler_queue_closed",
                        job = index,
                        "job queue closed before every job was dispatched"
                    );
                    break;
                }
            }
            drop(sender);

            let mut reports = Vec::with_capacity(job_count);
            for handle in worker_handles {
                match handle.await {
                    Ok(worker_reports) => reports.extend(worker_reports),
                    Err(err) => error!(
                        event = "scheduler_worker_failed",
                        error = %err,
                        "scheduler worker exited abnormally"
                    ),
                }
            }

            let reported: HashSet<usize> = reports.iter().map(|report| report.index).collect();
            for index in (0..job_count).filter(|index| !reported.contains(index)) {
                reports.push(JobReport {
                    index,
                    result: Err(JobFailure::Lost),
                });
            }
            reports.sort_by_key(|report| report.index);
            reports
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    fn recording_job(index: usize, log: Arc<Mutex<Vec<usize>>>) -> Job<usize> {
        Box::pin(async move {
            log.lock().expect("log mutex").push(index);
            index * 10
        })
    }

    #[tokio::test]
    async fn serial_runs_in_submission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = SchedulerKind::Serial.build::<usize>();
        for index in 0..4 {
            scheduler.submit(recording_job(index, Arc::clone(&log)));
        }

        let reports = scheduler.run_all().await;

        assert_eq!(*log.lock().expect("log mutex"), vec![0, 1, 2, 3]);
        let results: Vec<_> = reports.into_iter().map(|report| report.result).collect();
        assert_eq!(results, vec![Ok(0), Ok(10), Ok(20), Ok(30)]);
    }

    #[tokio::test]
    async fn panicking_job_does_not_cancel_siblings() {
        for kind in [SchedulerKind::Serial, SchedulerKind::Parallel { workers: 2 }] {
            let mut scheduler = kind.build::<usize>();
            scheduler.submit(Box::pin(async { 1 }));
            scheduler.submit(Box::pin(async { panic!("tracker exploded") }));
            scheduler.submit(Box::pin(async { 3 }));

            let reports = scheduler.run_all().await;

            assert_eq!(reports.len(), 3, "{kind:?}");
            assert_eq!(reports[0].result, Ok(1));
            assert_eq!(
                reports[1].result,
                Err(JobFailure::Panicked("tracker exploded".to_string()))
            );
            assert_eq!(reports[2].result, Ok(3));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_scheduler_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut scheduler = BoundedParallelScheduler::new(2);

        for index in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            scheduler.submit(Box::pin(async move {
                let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now_running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                index
            }));
        }

        let reports = scheduler.run_all().await;

        let indices: Vec<_> = reports.iter().map(|report| report.index).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(reports.iter().all(|report| report.result.is_ok()));
    }

    #[tokio::test]
    async fn empty_scheduler_returns_no_reports() {
        let mut scheduler = SchedulerKind::Parallel { workers: 4 }.build::<()>();
        assert!(scheduler.run_all().await.is_empty());
        assert_eq!(SchedulerKind::from_worker_count(1), SchedulerKind::Serial);
        assert_eq!(
            SchedulerKind::from_worker_count(3),
            SchedulerKind::Parallel { workers: 3 }
        );
    }
}

use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// A zero-argument unit of work. Failures are the task's own business; the
/// scheduler only observes that it settled.
pub type Task = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Wraps an async closure into a [`Task`].
pub fn task<F, Fut>(f: F) -> Task
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || f().boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    worker_count: usize,
    pacing_delay: Duration,
}

impl SchedulerConfig {
    pub fn new(worker_count: usize, pacing_delay: Duration) -> Result<Self, ConfigError> {
        if worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(Self {
            worker_count,
            pacing_delay,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay
    }
}

/// What the scheduler saw during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub tasks: usize,
    pub panicked: usize,
    pub elapsed: Duration,
}

/// Task slots plus the shared cursor workers pull from.
struct TaskQueue {
    slots: Vec<Mutex<Option<Task>>>,
    cursor: AtomicUsize,
}

impl TaskQueue {
    fn new(tasks: Vec<Task>) -> Self {
        Self {
            slots: tasks.into_iter().map(|t| Mutex::new(Some(t))).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Advances the cursor and takes the task at the old position. Every index
    /// is handed out at most once.
    fn claim(&self) -> Option<(usize, Task)> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let slot = self.slots.get(index)?;
        let task = slot.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        Some((index, task))
    }
}

struct Completion {
    total: usize,
    settled: AtomicUsize,
    panicked: AtomicUsize,
    on_done: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Completion {
    fn new(total: usize, on_done: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            total,
            settled: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            on_done: Mutex::new(Some(on_done)),
        }
    }

    fn settle(&self) {
        if self.settled.fetch_add(1, Ordering::SeqCst) + 1 == self.total {
            self.fire();
        }
    }

    fn fire(&self) {
        let on_done = self
            .on_done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_done) = on_done {
            on_done();
        }
    }
}

/// Runs a fixed list of tasks on a bounded pool of workers, pausing each
/// worker for the pacing delay after every task it finishes.
pub struct TaskScheduler {
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, tasks: Vec<Task>) -> RunReport {
        self.run_with_completion(tasks, || {}).await
    }

    /// Runs every task and calls `on_done` exactly once, right after the last
    /// task settles. The returned future resolves once all workers have
    /// finished their trailing pacing delay.
    pub async fn run_with_completion<F>(&self, tasks: Vec<Task>, on_done: F) -> RunReport
    where
        F: FnOnce() + Send + 'static,
    {
        let started = Instant::now();
        let total = tasks.len();
        let completion = Arc::new(Completion::new(total, Box::new(on_done)));

        if total == 0 {
            completion.fire();
            return RunReport {
                tasks: 0,
                panicked: 0,
                elapsed: started.elapsed(),
            };
        }

        let queue = Arc::new(TaskQueue::new(tasks));
        let workers = self.config.worker_count.min(total);
        debug!(workers, tasks = total, "starting scheduler run");

        // Initial assignment happens here so the first `workers` tasks are
        // claimed in index order before any worker gets polled.
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let first = queue.claim();
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                first,
                Arc::clone(&queue),
                Arc::clone(&completion),
                self.config.pacing_delay,
            )));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                warn!("scheduler worker terminated abnormally: {}", err);
            }
        }

        RunReport {
            tasks: total,
            panicked: completion.panicked.load(Ordering::SeqCst),
            elapsed: started.elapsed(),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    mut next: Option<(usize, Task)>,
    queue: Arc<TaskQueue>,
    completion: Arc<Completion>,
    pacing_delay: Duration,
) {
    while let Some((index, task)) = next {
        debug!(worker_id, index, "starting task");
        let outcome = AssertUnwindSafe(async move { task().await })
            .catch_unwind()
            .await;
        if outcome.is_err() {
            completion.panicked.fetch_add(1, Ordering::SeqCst);
            warn!(worker_id, index, "task panicked, counting it as settled");
        }
        completion.settle();

        tokio::time::sleep(pacing_delay).await;
        next = queue.claim();
    }
    debug!(worker_id, "no tasks left, worker exiting");
}

//! Bounded worker pool over a mutex/condvar guarded FIFO queue.
//!
//! A fixed number of OS threads pull boxed jobs from one shared queue. Every
//! submission returns a [`TaskHandle`] that yields the job's own result, so a
//! failing or panicking job never takes the pool down with it.
//!
//! ```rust,ignore
//! let pool = WorkerPool::new(NonZeroUsize::new(4).unwrap())?;
//! let handle = pool.submit(|| Ok(2 + 2))?;
//! assert_eq!(handle.wait()?, 4);
//! pool.shutdown();
//! ```
use crossbeam_channel::{bounded, Receiver};
use std::any::Any;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

use crate::config::default_parallelism;
use crate::errors::{FetchError, FetchResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Shared {
    // Jobs never run while the lock is held, so a poisoned lock still guards a
    // consistent queue.
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: NonZeroUsize,
}

impl WorkerPool {
    /// Starts `size` worker threads
    pub fn new(size: NonZeroUsize) -> FetchResult<Self> {
        let pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    stopping: false,
                }),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(size.get())),
            size,
        };

        for id in 0..size.get() {
            let shared = Arc::clone(&pool.shared);
            // On failure `pool` is dropped, which stops the workers started so far
            let handle = thread::Builder::new()
                .name(format!("filefetch-worker-{}", id))
                .spawn(move || worker_loop(&shared, id))
                .map_err(FetchError::WorkerSpawn)?;
            pool.lock_workers().push(handle);
        }

        debug!("Started worker pool with {} workers", size);
        Ok(pool)
    }

    /// Starts one worker per CPU core
    pub fn with_default_size() -> FetchResult<Self> {
        Self::new(default_parallelism())
    }

    /// Number of worker threads
    pub fn size(&self) -> NonZeroUsize {
        self.size
    }

    /// Queues `task` and returns a handle to its result.
    ///
    /// Fails with [`FetchError::PoolClosed`] once [`shutdown`](Self::shutdown)
    /// has begun.
    pub fn submit<T, F>(&self, task: F) -> FetchResult<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> FetchResult<T> + Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or_else(|payload| Err(FetchError::TaskPanicked(panic_message(payload))));
            // The caller may have dropped the handle; the result is then unwanted
            let _ = sender.send(outcome);
        });

        {
            let mut queue = self.shared.lock();
            if queue.stopping {
                return Err(FetchError::PoolClosed);
            }
            queue.jobs.push_back(job);
        }
        self.shared.available.notify_one();

        Ok(TaskHandle { receiver })
    }

    /// Stops accepting work, lets queued and running jobs finish, then joins
    /// every worker. Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.shared.lock().stopping = true;
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.lock_workers());
        if workers.is_empty() {
            return;
        }

        debug!("Draining worker pool");
        for worker in workers {
            // Jobs run under catch_unwind, so a worker only dies on a bug here
            if worker.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }
        debug!("Worker pool stopped");
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, id: usize) {
    trace!("Worker {} started", id);
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.stopping {
                    trace!("Worker {} exiting", id);
                    return;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        job();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Completion handle for a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<FetchResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run and returns its result
    pub fn wait(self) -> FetchResult<T> {
        self.receiver.recv().unwrap_or_else(|_| {
            Err(FetchError::TaskPanicked(
                "task was dropped before it ran".to_string(),
            ))
        })
    }
}

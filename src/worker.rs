//! Media Vault - Background Work Queue
//!
//! One named thread draining a job channel, so imports never block the caller.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{VaultError, VaultResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single background worker
pub struct WorkQueue {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkQueue {
    /// Spawn the worker thread
    pub fn new(name: &str) -> VaultResult<Self> {
        let (tx, rx) = unbounded::<Job>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in rx {
                    job();
                }
                log::debug!("work queue drained, worker exiting");
            })?;

        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue a job; its result arrives through the returned handle
    pub fn submit<T, F>(&self, job: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let wrapped: Job = Box::new(move || {
            // The caller may have dropped its handle
            let _ = tx.send(job());
        });

        if let Some(jobs) = &self.jobs {
            if jobs.send(wrapped).is_err() {
                log::warn!("work queue closed, job dropped");
            }
        }

        Pending { rx }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish queued jobs and exit
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("work queue thread panicked");
            }
        }
    }
}

/// Result of a queued job
pub struct Pending<T> {
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    /// Block until the job finishes
    pub fn wait(self) -> VaultResult<T> {
        self.rx.recv().map_err(|_| VaultError::WorkerStopped)
    }

    /// Block up to `timeout`; `Ok(None)` if the job is still running
    pub fn wait_timeout(&self, timeout: Duration) -> VaultResult<Option<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(v) => Ok(Some(v)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(VaultError::WorkerStopped),
        }
    }

    /// Take the result if it is ready
    pub fn try_take(&self) -> VaultResult<Option<T>> {
        match self.rx.try_recv() {
            Ok(v) => Ok(Some(v)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(VaultError::WorkerStopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_in_order() {
        let queue = WorkQueue::new("test-worker").unwrap();
        let pending: Vec<_> = (0..5).map(|i| queue.submit(move || i * 2)).collect();

        let results: Vec<_> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_runs_on_named_thread() {
        let queue = WorkQueue::new("media-import").unwrap();
        let name = queue
            .submit(|| thread::current().name().map(str::to_string))
            .wait()
            .unwrap();
        assert_eq!(name.as_deref(), Some("media-import"));
    }

    #[test]
    fn test_wait_timeout_and_try_take() {
        let queue = WorkQueue::new("test-worker").unwrap();
        let (gate_tx, gate_rx) = bounded::<()>(0);

        let pending = queue.submit(move || {
            let _ = gate_rx.recv();
            7
        });
        assert_eq!(pending.try_take().unwrap(), None);
        assert_eq!(pending.wait_timeout(Duration::from_millis(20)).unwrap(), None);

        gate_tx.send(()).unwrap();
        assert_eq!(pending.wait_timeout(Duration::from_secs(5)).unwrap(), Some(7));
    }

    #[test]
    fn test_drop_finishes_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue = WorkQueue::new("test-worker").unwrap();
            for _ in 0..10 {
                let counter = counter.clone();
                queue.submit(move || counter.fetch_add(1, Ordering::SeqCst));
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_job_reports_worker_stopped() {
        let queue = WorkQueue::new("test-worker").unwrap();
        let pending = queue.submit(|| -> u8 { panic!("boom") });
        assert!(matches!(pending.wait(), Err(VaultError::WorkerStopped)));
    }
}

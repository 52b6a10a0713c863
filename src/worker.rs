//! Dedicated background thread that runs catalog loads.

use log::{debug, trace, warn};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Owns one OS thread that executes submitted jobs in order.
///
/// Jobs block on disk I/O, so they never run on a browsing caller's thread.
/// Dropping the worker lets queued jobs finish, then joins the thread.
pub struct RefreshWorker {
    sender: Mutex<Option<Sender<Job>>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshWorker {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!("Refresh worker started");
            for job in receiver {
                job();
            }
            debug!("Refresh worker stopped");
        })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Some(handle),
        })
    }

    /// Queues `job`. Returns `false` if the worker thread is gone.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                trace!("Queueing refresh job");
                sender.send(Box::new(job)).is_ok()
            }
            None => false,
        }
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        // Closing the channel ends the thread's receive loop.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Dropped from one of our own jobs; the loop exits on its own.
                return;
            }
            if handle.join().is_err() {
                warn!("Refresh worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for RefreshWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshWorker")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_off_caller_thread_in_order() {
        let worker = RefreshWorker::spawn("test-worker").unwrap();
        let caller = thread::current().id();
        let (tx, rx) = channel();

        for i in 0..3 {
            let tx = tx.clone();
            assert!(worker.submit(move || {
                tx.send((i, thread::current().id())).unwrap();
            }));
        }

        for expected in 0..3 {
            let (i, id) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(i, expected);
            assert_ne!(id, caller);
        }
    }

    #[test]
    fn test_drop_drains_queue() {
        let (tx, rx) = channel();
        {
            let worker = RefreshWorker::spawn("test-worker").unwrap();
            worker.submit(move || {
                thread::sleep(Duration::from_millis(20));
                tx.send(()).unwrap();
            });
        }
        assert!(rx.try_recv().is_ok());
    }
}

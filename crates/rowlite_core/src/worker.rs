//! Background worker pool for async operations.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// Fixed thread pool draining a FIFO job queue.
///
/// With one thread, jobs run strictly in submission order; larger pools
/// trade that ordering for parallelism. Dropping the pool closes the
/// queue, lets already queued jobs finish and joins every thread.
pub(crate) struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..threads)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                thread::spawn(move || loop {
                    // The guard drops as soon as a job is pulled, so other
                    // workers can take the next one while this job runs.
                    let job = receiver.lock().recv();
                    match job {
                        Ok(job) => {
                            // A panicking callback must not take the worker
                            // down with it.
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                warn!("worker job panicked");
                            }
                        }
                        Err(_) => break,
                    }
                })
            })
            .collect();
        debug!("worker pool started with {threads} thread(s)");
        Self {
            sender: Some(sender),
            handles,
        }
    }

    pub(crate) fn submit(&self, job: Job) {
        if let Some(sender) = &self.sender {
            // The workers outlive the sender; send only fails once
            // shutdown has begun, and then the job is dropped unrun.
            let _ = sender.send(job);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool joined");
    }
}

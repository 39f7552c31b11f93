//! Single-writer task queue.
//!
//! One worker thread owns the mutable state and runs submitted tasks one at
//! a time, in submission order. Each submission gets a [`TaskHandle`] that
//! settles with that task's own result; a failing or panicking task never
//! affects the tasks queued after it.

use crate::errors::{FragmentError, Result};
use log::{debug, error, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

pub struct MutationQueue<S: Send + 'static> {
    sender: Option<Sender<Job<S>>>,
    worker: Option<JoinHandle<S>>,
}

impl<S: Send + 'static> MutationQueue<S> {
    /// Moves `state` onto a new worker thread.
    pub fn new(mut state: S) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job<S>>();
        let worker = std::thread::Builder::new()
            .name("mutation-queue".into())
            .spawn(move || {
                for job in receiver {
                    job(&mut state);
                }
                debug!("Mutation queue drained");
                state
            })
            .map_err(|e| FragmentError::internal(format!("failed to spawn queue worker: {e}")))?;
        Ok(MutationQueue {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Appends `task` to the queue. The task receives exclusive access to the
    /// state while it runs.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let job: Job<S> = Box::new(move |state: &mut S| {
            let result = match catch_unwind(AssertUnwindSafe(|| task(state))) {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("Queued task panicked: {}", message);
                    Err(FragmentError::internal(format!("task panicked: {message}")))
                }
            };
            if let Err(e) = &result {
                warn!("Queued task failed: {}", e);
            }
            // the submitter may have stopped waiting
            let _ = tx.send(result);
        });
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                error!("Mutation queue worker is gone, task dropped");
            }
        }
        TaskHandle { receiver: rx }
    }

    /// Runs every queued task, stops the worker and hands the state back.
    pub fn shutdown(mut self) -> Result<S> {
        self.stop()
            .ok_or_else(|| FragmentError::internal("mutation queue already stopped"))?
    }

    fn stop(&mut self) -> Option<Result<S>> {
        drop(self.sender.take());
        let worker = self.worker.take()?;
        Some(
            worker
                .join()
                .map_err(|_| FragmentError::internal("mutation queue worker panicked")),
        )
    }
}

impl<S: Send + 'static> Drop for MutationQueue<S> {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.stop() {
            error!("{}", e);
        }
    }
}

/// Completion handle of one submitted task.
#[must_use = "a task handle does nothing unless waited on"]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .recv()
            .map_err(|_| FragmentError::internal("mutation queue closed before the task ran"))?
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. The task itself
    /// is not cancelled and still runs when its turn comes.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FragmentError::internal(format!(
                "task did not complete within {timeout:?}"
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(FragmentError::internal(
                "mutation queue closed before the task ran",
            )),
        }
    }
}

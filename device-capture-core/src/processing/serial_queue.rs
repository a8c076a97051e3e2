use std::thread;

use crossbeam_channel::{unbounded, Sender};

use crate::models::error::CaptureError;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Cloneable submit-only handle to a [`SerialQueue`].
///
/// Jobs submitted after the queue stopped are dropped.
#[derive(Clone)]
pub struct QueueHandle {
    label: String,
    sender: Sender<Message>,
}

impl QueueHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Enqueue `job`. Returns `false` when the queue no longer runs jobs.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Message::Run(Box::new(job))).is_ok()
    }

    /// Run `job` on the queue and wait for its result.
    ///
    /// Returns `None` if the queue stopped before the job ran. Must not be
    /// called from a job running on this same queue.
    pub fn sync<R: Send + 'static>(&self, job: impl FnOnce() -> R + Send + 'static) -> Option<R> {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let submitted = self.dispatch(move || {
            let _ = result_tx.send(job());
        });
        if !submitted {
            return None;
        }
        result_rx.recv().ok()
    }
}

/// A named worker thread that runs submitted jobs one at a time, in
/// submission order.
///
/// Stopping the queue runs every job submitted before the stop, then joins the
/// worker. Outstanding [`QueueHandle`]s do not keep the worker alive.
pub struct SerialQueue {
    handle: QueueHandle,
    worker: Option<thread::JoinHandle<()>>,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> Result<Self, CaptureError> {
        let label = label.into();
        let (sender, receiver) = unbounded::<Message>();

        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match message {
                        Message::Run(job) => job(),
                        Message::Stop => break,
                    }
                }
            })
            .map_err(|e| {
                CaptureError::QueueUnavailable(format!("failed to spawn {}: {}", label, e))
            })?;

        Ok(Self {
            handle: QueueHandle { label, sender },
            worker: Some(worker),
        })
    }

    pub fn label(&self) -> &str {
        self.handle.label()
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.handle.dispatch(job)
    }

    /// Run `job` on the queue and wait for its result.
    ///
    /// Returns `None` if the queue stopped before the job ran, or when called
    /// from a job running on this same queue.
    pub fn sync<R: Send + 'static>(&self, job: impl FnOnce() -> R + Send + 'static) -> Option<R> {
        if self.is_current() {
            log::error!("sync() called from inside queue {}", self.label());
            return None;
        }
        self.handle.sync(job)
    }

    /// Whether the calling thread is this queue's worker.
    pub fn is_current(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| worker.thread().id() == thread::current().id())
            .unwrap_or(false)
    }

    /// Drain jobs submitted so far, then stop the worker.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.handle.sender.send(Message::Stop);
        if worker.thread().id() == thread::current().id() {
            // Stopping from inside a job: the worker exits after this job.
            return;
        }
        if worker.join().is_err() {
            log::error!("Queue {} worker panicked", self.label());
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

use super::events::JobEvent;
use super::listener::JobEventListener;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Where publishers hand their events to.
///
/// Publishing never fails: delivery problems are logged by the sink and
/// never reach the job.
pub trait JobEventSink: Send + Sync {
    fn publish(&self, event: JobEvent);
}

/// Delivers every event to all subscribed listeners, on the caller's thread.
///
/// A failing (or panicking) listener is logged and skipped, the remaining
/// listeners still get the event.
#[derive(Default)]
pub struct JobEventBus {
    listeners: RwLock<Vec<Arc<dyn JobEventListener>>>,
}

impl JobEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn JobEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn dispatch(&self, event: &JobEvent) {
        // Snapshot so listeners can subscribe others without deadlocking.
        let listeners: Vec<Arc<dyn JobEventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        "Job event listener failed for job {}: {}",
                        event.job_uri(),
                        e
                    );
                }
                Err(_) => {
                    error!("Job event listener panicked for job {}", event.job_uri());
                }
            }
        }
    }
}

impl JobEventSink for JobEventBus {
    fn publish(&self, event: JobEvent) {
        self.dispatch(&event);
    }
}

/// Queues events and delivers them from a single background task.
///
/// Publishing only enqueues, so jobs never wait on persistence. Events are
/// delivered in publish order.
#[derive(Clone)]
pub struct QueuedJobEventBus {
    sender: mpsc::UnboundedSender<JobEvent>,
}

impl QueuedJobEventBus {
    /// Start the delivery task on the current tokio runtime.
    ///
    /// The task ends after every `QueuedJobEventBus` clone has been dropped
    /// and the queue is drained.
    pub fn spawn(bus: Arc<JobEventBus>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<JobEvent>();
        let handle = tokio::task::spawn_blocking(move || {
            debug!("Job event dispatcher started");
            while let Some(event) = receiver.blocking_recv() {
                bus.dispatch(&event);
            }
            debug!("Job event dispatcher stopped");
        });
        (Self { sender }, handle)
    }
}

impl JobEventSink for QueuedJobEventBus {
    fn publish(&self, event: JobEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!(
                "Job event dispatcher is gone, dropping event for job {}",
                e.0.job_uri()
            );
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{api::ServiceManager, domain::LifecycleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Consecutive "unknown" answers tolerated before the download is given up.
    pub miss_budget: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            miss_budget: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEventKind {
    Progress(u8),
    Downloaded,
    Failed(LifecycleError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEvent {
    pub service_id: String,
    pub attempt: u64,
    pub kind: PollEventKind,
}

pub type EventSink = Arc<dyn Fn(PollEvent) + Send + Sync>;

struct PollHandle {
    attempt: u64,
    cancel: watch::Sender<bool>,
}

type Handles = Arc<Mutex<HashMap<String, PollHandle>>>;

fn lock(handles: &Handles) -> MutexGuard<'_, HashMap<String, PollHandle>> {
    handles.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs at most one progress loop per service id.
#[derive(Clone)]
pub struct ProgressPoller {
    manager: ServiceManager,
    config: PollConfig,
    handles: Handles,
}

impl ProgressPoller {
    pub fn new(manager: ServiceManager, config: PollConfig) -> Self {
        Self {
            manager,
            config,
            handles: Arc::default(),
        }
    }

    /// Starts polling `service_id`, superseding any loop already running for it.
    pub fn start(&self, service_id: &str, attempt: u64, sink: EventSink) {
        let (cancel, cancelled) = watch::channel(false);

        let previous = lock(&self.handles).insert(
            service_id.to_string(),
            PollHandle { attempt, cancel },
        );
        if let Some(previous) = previous {
            debug!(service_id, superseded = previous.attempt, "replacing progress poller");
            let _ = previous.cancel.send(true);
        }

        let poll_loop = PollLoop {
            manager: self.manager.clone(),
            config: self.config,
            handles: Arc::clone(&self.handles),
            service_id: service_id.to_string(),
            attempt,
            cancelled,
            sink,
        };
        tokio::spawn(poll_loop.run());
    }

    /// Returns whether a loop was running. Cancelling twice is harmless.
    pub fn cancel(&self, service_id: &str) -> bool {
        match lock(&self.handles).remove(service_id) {
            Some(handle) => {
                debug!(service_id, attempt = handle.attempt, "cancelling progress poller");
                let _ = handle.cancel.send(true);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (service_id, handle) in lock(&self.handles).drain() {
            debug!(service_id = %service_id, attempt = handle.attempt, "cancelling progress poller");
            let _ = handle.cancel.send(true);
        }
    }

    pub fn is_active(&self, service_id: &str) -> bool {
        lock(&self.handles).contains_key(service_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.handles).len()
    }
}

struct PollLoop {
    manager: ServiceManager,
    config: PollConfig,
    handles: Handles,
    service_id: String,
    attempt: u64,
    cancelled: watch::Receiver<bool>,
    sink: EventSink,
}

impl PollLoop {
    async fn run(mut self) {
        let mut misses = 0u32;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = self.cancelled.changed() => {
                    debug!(service_id = %self.service_id, attempt = self.attempt, "progress poller stopped");
                    return;
                }
            }

            // Only one query in flight: the next tick is scheduled after this resolves.
            let result = self.manager.get_download_progress(&self.service_id).await;

            if self.is_cancelled() {
                debug!(
                    service_id = %self.service_id,
                    attempt = self.attempt,
                    "discarding progress from cancelled poller"
                );
                return;
            }

            match result {
                Ok(Some(progress)) if progress >= 100 => {
                    self.emit(PollEventKind::Progress(100));
                    info!(service_id = %self.service_id, attempt = self.attempt, "download finished");
                    self.finish(PollEventKind::Downloaded);
                    return;
                }
                Ok(Some(progress)) => {
                    misses = 0;
                    self.emit(PollEventKind::Progress(progress));
                }
                Ok(None) => {
                    misses += 1;
                    if misses > self.config.miss_budget {
                        warn!(service_id = %self.service_id, misses, "download unknown to service manager");
                        self.finish(PollEventKind::Failed(LifecycleError::ProgressUnavailable {
                            misses,
                        }));
                        return;
                    }
                    debug!(service_id = %self.service_id, misses, "no progress reported yet");
                }
                Err(e) => {
                    warn!(service_id = %self.service_id, error = %e, "progress query failed");
                    self.finish(PollEventKind::Failed(e.into()));
                    return;
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.cancelled.has_changed().is_err()
    }

    fn emit(&self, kind: PollEventKind) {
        (self.sink)(PollEvent {
            service_id: self.service_id.clone(),
            attempt: self.attempt,
            kind,
        });
    }

    /// Drops this loop's handle before reporting the terminal event.
    fn finish(&self, kind: PollEventKind) {
        {
            let mut handles = lock(&self.handles);
            if handles
                .get(&self.service_id)
                .is_some_and(|handle| handle.attempt == self.attempt)
            {
                handles.remove(&self.service_id);
            }
        }
        self.emit(kind);
    }
}

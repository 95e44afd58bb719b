use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::progress_poller::{EventSink, PollConfig, PollEvent, PollEventKind, ProgressPoller};
use crate::{
    api::ServiceManager,
    domain::{LifecycleError, Service, ServiceSnapshot, ServiceState},
};

const UPDATE_CAPACITY: usize = 64;

/// Outcome of checking a request against the current state.
enum Check {
    Dispatch,
    AlreadySatisfied,
}

enum Admission {
    Dispatch(OperationSlot),
    AlreadySatisfied(ServiceSnapshot),
}

struct Inner {
    services: Mutex<HashMap<String, Service>>,
    updates: broadcast::Sender<ServiceSnapshot>,
    poller: ProgressPoller,
}

impl Inner {
    fn services(&self) -> MutexGuard<'_, HashMap<String, Service>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: ServiceSnapshot) {
        // Nobody listening is fine.
        let _ = self.updates.send(snapshot);
    }

    fn apply_poll_event(&self, event: PollEvent) {
        let mut services = self.services();
        let Some(service) = services.get_mut(&event.service_id) else {
            return;
        };

        if service.attempt != event.attempt || service.state != ServiceState::Downloading {
            debug!(
                service_id = %event.service_id,
                attempt = event.attempt,
                current = service.attempt,
                "dropping stale poll event"
            );
            return;
        }

        match event.kind {
            PollEventKind::Progress(progress) => {
                let stored = service.progress.unwrap_or(0);
                if progress <= stored {
                    if progress < stored {
                        debug!(service_id = %event.service_id, progress, stored, "ignoring regressed progress");
                    }
                    return;
                }
                service.progress = Some(progress);
            }
            PollEventKind::Downloaded => {
                info!(service_id = %event.service_id, "service downloaded");
                service.enter(ServiceState::Downloaded);
            }
            PollEventKind::Failed(error) => {
                warn!(service_id = %event.service_id, %error, "download failed");
                service.enter(ServiceState::NotDownloaded);
                service.last_error = Some(error);
            }
        }

        self.publish(service.snapshot(&event.service_id));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.poller.cancel_all();
    }
}

/// Claimed single-flight slot for one service id. Releasing happens in
/// [`LifecycleCoordinator::settle`]; dropping an unsettled slot (e.g. a
/// cancelled future) still frees the id.
struct OperationSlot {
    inner: Weak<Inner>,
    service_id: String,
    armed: bool,
}

impl Drop for OperationSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            if let Some(service) = inner.services().get_mut(&self.service_id) {
                service.pending = false;
            }
        }
    }
}

/// Tracks every service the user has touched and drives it through
/// `NotDownloaded → Downloading → Downloaded → Running ⇄ Stopped`.
///
/// Nothing transitions until the service manager acknowledged the command.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    manager: ServiceManager,
    inner: Arc<Inner>,
}

impl LifecycleCoordinator {
    pub fn new(manager: ServiceManager, poll_config: PollConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let poller = ProgressPoller::new(manager.clone(), poll_config);

        Self {
            manager,
            inner: Arc::new(Inner {
                services: Mutex::default(),
                updates,
                poller,
            }),
        }
    }

    pub async fn download(&self, service_id: &str) -> Result<ServiceSnapshot, LifecycleError> {
        let slot = match self.admit(service_id, |state| match state {
            ServiceState::Downloading => Err(LifecycleError::AlreadyInProgress),
            ServiceState::Running => Err(LifecycleError::NotReady { state }),
            _ => Ok(Check::Dispatch),
        })? {
            Admission::Dispatch(slot) => slot,
            Admission::AlreadySatisfied(snapshot) => return Ok(snapshot),
        };

        let result = self
            .manager
            .download_services(&[service_id.to_string()])
            .await;

        match result {
            Ok(()) => {
                let snapshot = self.settle(slot, |service| {
                    service.attempt += 1;
                    service.enter(ServiceState::Downloading);
                    service.last_error = None;
                    self.inner
                        .poller
                        .start(service_id, service.attempt, self.poll_sink());
                });
                info!(service_id, "download started");
                Ok(snapshot)
            }
            Err(e) => {
                let error = LifecycleError::from(e);
                warn!(service_id, %error, "download request failed");
                self.settle(slot, |service| service.last_error = Some(error.clone()));
                Err(error)
            }
        }
    }

    pub async fn run(&self, service_id: &str) -> Result<ServiceSnapshot, LifecycleError> {
        let slot = match self.admit(service_id, |state| match state {
            state if state.is_idle() => Ok(Check::Dispatch),
            ServiceState::Running => Ok(Check::AlreadySatisfied),
            _ => Err(LifecycleError::NotReady { state }),
        })? {
            Admission::Dispatch(slot) => slot,
            Admission::AlreadySatisfied(snapshot) => return Ok(snapshot),
        };

        let result = self.manager.run_service(service_id).await;
        self.conclude(slot, service_id, "run", ServiceState::Running, result)
    }

    pub async fn stop(&self, service_id: &str) -> Result<ServiceSnapshot, LifecycleError> {
        let slot = match self.admit(service_id, |state| match state {
            ServiceState::Running => Ok(Check::Dispatch),
            state if state.is_idle() => Ok(Check::AlreadySatisfied),
            _ => Err(LifecycleError::NotReady { state }),
        })? {
            Admission::Dispatch(slot) => slot,
            Admission::AlreadySatisfied(snapshot) => return Ok(snapshot),
        };

        let result = self.manager.stop_service(service_id).await;
        self.conclude(slot, service_id, "stop", ServiceState::Stopped, result)
    }

    /// Removes the downloaded binary. The service has to be stopped first.
    pub async fn delete(&self, service_id: &str) -> Result<ServiceSnapshot, LifecycleError> {
        let slot = match self.admit(service_id, |state| match state {
            state if state.is_idle() => Ok(Check::Dispatch),
            ServiceState::NotDownloaded => Ok(Check::AlreadySatisfied),
            _ => Err(LifecycleError::NotReady { state }),
        })? {
            Admission::Dispatch(slot) => slot,
            Admission::AlreadySatisfied(snapshot) => return Ok(snapshot),
        };

        let result = self.manager.delete_service(service_id).await;
        self.conclude(slot, service_id, "delete", ServiceState::NotDownloaded, result)
    }

    /// Fetches the service's log output. Leaves the lifecycle state alone.
    pub async fn logs(&self, service_id: &str) -> Result<String, LifecycleError> {
        let slot = self.claim(service_id)?;

        match self.manager.show_logs_for_service(service_id).await {
            Ok(logs) => {
                self.settle(slot, |_| {});
                Ok(logs)
            }
            Err(e) => {
                let error = LifecycleError::from(e);
                warn!(service_id, %error, "fetching logs failed");
                self.settle(slot, |service| service.last_error = Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Stops tracking an in-flight download without asking the backend.
    pub fn untrack(&self, service_id: &str) -> Result<ServiceSnapshot, LifecycleError> {
        let mut services = self.inner.services();
        let Some(service) = services.get_mut(service_id) else {
            return Ok(ServiceSnapshot::unseen(service_id));
        };
        if service.pending {
            return Err(LifecycleError::Busy);
        }

        if service.state == ServiceState::Downloading {
            self.inner.poller.cancel(service_id);
            service.enter(ServiceState::NotDownloaded);
            info!(service_id, "stopped tracking download");
            let snapshot = service.snapshot(service_id);
            self.inner.publish(snapshot.clone());
            return Ok(snapshot);
        }

        Ok(service.snapshot(service_id))
    }

    pub fn snapshot(&self, service_id: &str) -> ServiceSnapshot {
        self.inner
            .services()
            .get(service_id)
            .map(|service| service.snapshot(service_id))
            .unwrap_or_else(|| ServiceSnapshot::unseen(service_id))
    }

    pub fn snapshots(&self) -> Vec<ServiceSnapshot> {
        let mut snapshots: Vec<_> = self
            .inner
            .services()
            .iter()
            .map(|(service_id, service)| service.snapshot(service_id))
            .collect();
        snapshots.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        snapshots
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn is_polling(&self, service_id: &str) -> bool {
        self.inner.poller.is_active(service_id)
    }

    pub fn active_polls(&self) -> usize {
        self.inner.poller.active_count()
    }

    /// Stops every poller and returns tracked downloads to `NotDownloaded`.
    pub fn shutdown(&self) {
        let mut services = self.inner.services();
        self.inner.poller.cancel_all();

        for (service_id, service) in services.iter_mut() {
            if service.state != ServiceState::Downloading {
                continue;
            }
            service.enter(ServiceState::NotDownloaded);
            info!(service_id = %service_id, "stopped tracking download on shutdown");
            self.inner.publish(service.snapshot(service_id));
        }
    }

    /// Creates the record on first contact, then claims its slot if the
    /// state allows the request.
    fn admit(
        &self,
        service_id: &str,
        check: impl FnOnce(ServiceState) -> Result<Check, LifecycleError>,
    ) -> Result<Admission, LifecycleError> {
        let mut services = self.inner.services();
        let service = services.entry(service_id.to_string()).or_default();

        if service.pending {
            debug!(service_id, "operation rejected, another one is pending");
            return Err(LifecycleError::Busy);
        }

        match check(service.state)? {
            Check::AlreadySatisfied => Ok(Admission::AlreadySatisfied(service.snapshot(service_id))),
            Check::Dispatch => self.reserve(service_id, service).map(Admission::Dispatch),
        }
    }

    /// Claims the slot regardless of state.
    fn claim(&self, service_id: &str) -> Result<OperationSlot, LifecycleError> {
        let mut services = self.inner.services();
        let service = services.entry(service_id.to_string()).or_default();
        self.reserve(service_id, service)
    }

    fn reserve(&self, service_id: &str, service: &mut Service) -> Result<OperationSlot, LifecycleError> {
        if service.pending {
            debug!(service_id, "operation rejected, another one is pending");
            return Err(LifecycleError::Busy);
        }
        service.pending = true;

        Ok(OperationSlot {
            inner: Arc::downgrade(&self.inner),
            service_id: service_id.to_string(),
            armed: true,
        })
    }

    /// Applies the result of an acknowledged command and frees the slot.
    fn settle(&self, mut slot: OperationSlot, apply: impl FnOnce(&mut Service)) -> ServiceSnapshot {
        let mut services = self.inner.services();
        let service = services.entry(slot.service_id.clone()).or_default();

        apply(service);
        service.pending = false;
        slot.armed = false;

        let snapshot = service.snapshot(&slot.service_id);
        self.inner.publish(snapshot.clone());
        snapshot
    }

    fn conclude(
        &self,
        slot: OperationSlot,
        service_id: &str,
        action: &'static str,
        target: ServiceState,
        result: crate::api::gateway::Result<()>,
    ) -> Result<ServiceSnapshot, LifecycleError> {
        match result {
            Ok(()) => {
                info!(service_id, action, state = %target, "service transitioned");
                Ok(self.settle(slot, |service| {
                    service.enter(target);
                    service.last_error = None;
                }))
            }
            Err(e) => {
                let error = LifecycleError::from(e);
                warn!(service_id, action, %error, "service manager refused");
                self.settle(slot, |service| service.last_error = Some(error.clone()));
                Err(error)
            }
        }
    }

    fn poll_sink(&self) -> EventSink {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |event: PollEvent| {
            if let Some(inner) = inner.upgrade() {
                inner.apply_poll_event(event);
            }
        })
    }
}

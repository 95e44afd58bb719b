use std::fmt;

use super::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    NotDownloaded,
    Downloading,
    Downloaded,
    Running,
    Stopped,
}

impl ServiceState {
    /// `Downloaded` and `Stopped` are interchangeable for transitions.
    pub fn is_idle(self) -> bool {
        matches!(self, ServiceState::Downloaded | ServiceState::Stopped)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceState::NotDownloaded => "not downloaded",
            ServiceState::Downloading => "downloading",
            ServiceState::Downloaded => "downloaded",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Per-service record owned by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct Service {
    pub state: ServiceState,
    /// Only meaningful while `state == Downloading`.
    pub progress: Option<u8>,
    pub last_error: Option<LifecycleError>,
    /// Bumped on every accepted download; poll events from older attempts are dropped.
    pub attempt: u64,
    pub pending: bool,
}

impl Service {
    pub fn enter(&mut self, state: ServiceState) {
        self.state = state;
        self.progress = match state {
            ServiceState::Downloading => Some(0),
            _ => None,
        };
    }

    pub fn snapshot(&self, service_id: &str) -> ServiceSnapshot {
        ServiceSnapshot {
            service_id: service_id.to_string(),
            state: self.state,
            progress: self.progress,
            last_error: self.last_error.clone(),
        }
    }
}

/// What the presentation layer gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub service_id: String,
    pub state: ServiceState,
    pub progress: Option<u8>,
    pub last_error: Option<LifecycleError>,
}

impl ServiceSnapshot {
    pub fn unseen(service_id: &str) -> Self {
        Service::default().snapshot(service_id)
    }

    /// Text for the status line, e.g. `42%` or `running`.
    pub fn status_text(&self) -> String {
        match (self.state, self.progress) {
            (ServiceState::Downloading, Some(progress)) => format!("{}%", progress),
            (state, _) => state.to_string(),
        }
    }
}

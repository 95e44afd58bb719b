use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use iced::Task;
use tracing::{info, warn};

use crate::api::{GatewayConfig, GatewayError, HttpGateway, ServiceManager};
use crate::application::{Intent, IntentAdapter, IntentOutcome, LifecycleCoordinator, PollConfig};
use crate::domain::ServiceSnapshot;
use crate::ui::{ServiceMessage, ServiceView};

const DEFAULT_SERVICE_ID: &str = "alice";

/// Runtime settings, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub poll: PollConfig,
    pub service_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            poll: PollConfig::default(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("SERVICE_MANAGER_URL") {
            match GatewayConfig::with_base_url(&url) {
                Ok(gateway) => config.gateway.base_url = gateway.base_url,
                Err(e) => warn!(%url, error = %e, "ignoring SERVICE_MANAGER_URL"),
            }
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "SERVICE_MANAGER_TIMEOUT_MS") {
            config.gateway.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "POLL_INTERVAL_MS") {
            config.poll.interval = Duration::from_millis(ms);
        }
        if let Some(misses) = parse_var::<u32>(&lookup, "POLL_MISS_BUDGET") {
            config.poll.miss_budget = misses;
        }
        if let Some(service_id) = lookup("SERVICE_ID").filter(|id| !id.trim().is_empty()) {
            config.service_id = service_id.trim().to_string();
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

pub fn build_adapter(config: &AppConfig) -> Result<IntentAdapter, GatewayError> {
    let gateway = HttpGateway::new(config.gateway.clone())?;
    let manager = ServiceManager::new(Arc::new(gateway));
    info!(url = %config.gateway.base_url, "using service manager");
    Ok(IntentAdapter::new(LifecycleCoordinator::new(
        manager,
        config.poll,
    )))
}

pub struct ServiceApp {
    view: ServiceView,
    adapter: IntentAdapter,
}

impl ServiceApp {
    pub fn new(adapter: IntentAdapter, service_id: String) -> (Self, Task<Message>) {
        let mut view = ServiceView::new(service_id);
        view.show(&adapter.latest(&view.service_id));

        // Forward every coordinator snapshot into the update loop
        let updates = Task::stream(adapter.updates().map(Message::SnapshotPublished));

        (Self { view, adapter }, updates)
    }
}

impl Drop for ServiceApp {
    fn drop(&mut self) {
        self.adapter.shutdown();
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(ServiceMessage),
    /// Result of a dispatched intent
    IntentFinished(IntentOutcome),
    /// Pushed by the coordinator, e.g. poll progress
    SnapshotPublished(ServiceSnapshot),
}

pub fn update(app: &mut ServiceApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                ServiceMessage::IntentPressed(intent) => {
                    let adapter = app.adapter.clone();
                    let service_id = app.view.service_id.clone();
                    if intent != Intent::ShowLogs {
                        app.view.logs.clear();
                    }

                    return Task::perform(
                        async move { adapter.dispatch(&service_id, intent).await },
                        Message::IntentFinished,
                    );
                }
                ServiceMessage::ServiceIdChanged(_) => {
                    let snapshot = app.adapter.latest(&app.view.service_id);
                    app.view.show(&snapshot);
                }
            }
        }
        Message::IntentFinished(outcome) => {
            app.view.show(&outcome.snapshot);
            if outcome.snapshot.service_id == app.view.service_id.trim() {
                if let Some(error) = outcome.error {
                    app.view.error_message = Some(error);
                }
                if let Some(logs) = outcome.logs {
                    app.view.logs = logs;
                }
            }
        }
        Message::SnapshotPublished(snapshot) => {
            app.view.show(&snapshot);
        }
    }
    Task::none()
}

pub fn view(app: &ServiceApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

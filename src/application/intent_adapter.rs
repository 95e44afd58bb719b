use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::lifecycle_coordinator::LifecycleCoordinator;
use crate::{domain::ServiceSnapshot, utils::validate_service_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Download,
    Run,
    Stop,
    Delete,
    ShowLogs,
}

/// Everything the view needs after an intent settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentOutcome {
    pub snapshot: ServiceSnapshot,
    pub logs: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct IntentAdapter {
    coordinator: LifecycleCoordinator,
}

impl IntentAdapter {
    pub fn new(coordinator: LifecycleCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn dispatch(&self, raw_service_id: &str, intent: Intent) -> IntentOutcome {
        let service_id = match validate_service_id(raw_service_id) {
            Ok(service_id) => service_id,
            Err(e) => {
                warn!(service_id = raw_service_id, ?intent, "rejected intent: {}", e);
                return IntentOutcome {
                    snapshot: ServiceSnapshot::unseen(raw_service_id.trim()),
                    logs: None,
                    error: Some(e.to_string()),
                };
            }
        };

        debug!(service_id, ?intent, "dispatching intent");
        let result = match intent {
            Intent::Download => self.coordinator.download(service_id).await.map(|_| None),
            Intent::Run => self.coordinator.run(service_id).await.map(|_| None),
            Intent::Stop => self.coordinator.stop(service_id).await.map(|_| None),
            Intent::Delete => self.coordinator.delete(service_id).await.map(|_| None),
            Intent::ShowLogs => self.coordinator.logs(service_id).await.map(Some),
        };

        let snapshot = self.coordinator.snapshot(service_id);
        match result {
            Ok(logs) => IntentOutcome {
                snapshot,
                logs,
                error: None,
            },
            Err(e) => {
                warn!(service_id, ?intent, error = %e, "intent failed");
                IntentOutcome {
                    snapshot,
                    logs: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Latest known state, for ids that fail validation too.
    pub fn latest(&self, raw_service_id: &str) -> ServiceSnapshot {
        match validate_service_id(raw_service_id) {
            Ok(service_id) => self.coordinator.snapshot(service_id),
            Err(_) => ServiceSnapshot::unseen(raw_service_id.trim()),
        }
    }

    /// Every snapshot the coordinator publishes from now on.
    pub fn updates(&self) -> BoxStream<'static, ServiceSnapshot> {
        futures::stream::unfold(self.coordinator.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(snapshot) => return Some((snapshot, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "snapshot stream lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{fake::ScriptedGateway, GatewayError, ServiceManager};
    use crate::application::PollConfig;
    use crate::domain::ServiceState;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter_with(gateway: &Arc<ScriptedGateway>) -> IntentAdapter {
        let manager = ServiceManager::new(gateway.clone());
        IntentAdapter::new(LifecycleCoordinator::new(manager, PollConfig::default()))
    }

    #[tokio::test]
    async fn test_blank_id_never_reaches_backend() {
        let gateway = ScriptedGateway::new();
        let adapter = adapter_with(&gateway);

        let outcome = adapter.dispatch("   ", Intent::Download).await;
        assert_eq!(outcome.error.as_deref(), Some("Invalid service id: \"\""));
        assert_eq!(outcome.snapshot.state, ServiceState::NotDownloaded);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_errors_become_display_text() {
        let gateway = ScriptedGateway::new();
        gateway.reply(
            "download_services",
            Err(GatewayError::Unreachable("connection refused".to_string())),
        );
        let adapter = adapter_with(&gateway);

        let outcome = adapter.dispatch("alice", Intent::Download).await;
        assert_eq!(
            outcome.error.as_deref(),
            Some("Service manager unreachable: connection refused")
        );
        assert_eq!(outcome.snapshot.state, ServiceState::NotDownloaded);
        assert!(outcome.snapshot.last_error.is_some());

        let outcome = adapter.dispatch("alice", Intent::Run).await;
        assert_eq!(
            outcome.error.as_deref(),
            Some("Not possible while the service is not downloaded")
        );
    }

    #[tokio::test]
    async fn test_show_logs_returns_text() {
        let gateway = ScriptedGateway::new();
        gateway.reply("show_logs_for_service", Ok(Some(json!("ready\n"))));
        let adapter = adapter_with(&gateway);

        let outcome = adapter.dispatch(" alice ", Intent::ShowLogs).await;
        assert_eq!(outcome.logs.as_deref(), Some("ready\n"));
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.snapshot.service_id, "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_stream_follows_download() {
        let gateway = ScriptedGateway::new();
        gateway.progress(&[55, 100]);
        let adapter = adapter_with(&gateway);
        let mut updates = adapter.updates();

        let outcome = adapter.dispatch("alice", Intent::Download).await;
        assert_eq!(outcome.snapshot.status_text(), "0%");

        let mut seen = Vec::new();
        while let Ok(Some(snapshot)) =
            tokio::time::timeout(Duration::from_secs(5), updates.next()).await
        {
            let done = snapshot.state == ServiceState::Downloaded;
            seen.push(snapshot.status_text());
            if done {
                break;
            }
        }
        assert_eq!(seen, vec!["0%", "55%", "100%", "downloaded"]);
        assert_eq!(adapter.latest("alice").state, ServiceState::Downloaded);
    }
}

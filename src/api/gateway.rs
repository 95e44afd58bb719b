use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::LifecycleError;
use crate::utils::percent_from_reported;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Service manager unreachable: {0}")]
    Unreachable(String),

    #[error("{0}")]
    BackendRejected(String),

    #[error("Invalid response to {command}: {reason}")]
    MalformedResponse {
        command: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<GatewayError> for LifecycleError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unreachable(reason) => LifecycleError::Unreachable(reason),
            GatewayError::BackendRejected(payload) => LifecycleError::BackendRejected(payload),
            malformed @ GatewayError::MalformedResponse { .. } => {
                LifecycleError::BackendRejected(malformed.to_string())
            }
        }
    }
}

/// A named command understood by the service manager. Serializes to its
/// named arguments, e.g. `{"serviceId": "alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Command {
    DownloadServices { service_ids: Vec<String> },
    GetDownloadProgress { service_id: String },
    RunService { service_id: String },
    StopService { service_id: String },
    ShowLogsForService { service_id: String },
    DeleteService { service_id: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::DownloadServices { .. } => "download_services",
            Command::GetDownloadProgress { .. } => "get_download_progress",
            Command::RunService { .. } => "run_service",
            Command::StopService { .. } => "stop_service",
            Command::ShowLogsForService { .. } => "show_logs_for_service",
            Command::DeleteService { .. } => "delete_service",
        }
    }
}

/// Request/response channel to the service manager process.
///
/// Implementations perform exactly one round trip per call: no batching,
/// no retries, and backend failure payloads are passed through untouched.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    async fn invoke(&self, command: Command) -> Result<Option<Value>>;
}

/// Typed view over a [`CommandGateway`], one method per command.
#[derive(Clone)]
pub struct ServiceManager {
    gateway: Arc<dyn CommandGateway>,
}

impl ServiceManager {
    pub fn new(gateway: Arc<dyn CommandGateway>) -> Self {
        Self { gateway }
    }

    pub async fn download_services(&self, service_ids: &[String]) -> Result<()> {
        self.gateway
            .invoke(Command::DownloadServices {
                service_ids: service_ids.to_vec(),
            })
            .await
            .map(|_| ())
    }

    /// `None` when the backend has no download on record for the id.
    pub async fn get_download_progress(&self, service_id: &str) -> Result<Option<u8>> {
        let command = Command::GetDownloadProgress {
            service_id: service_id.to_string(),
        };
        let name = command.name();

        match self.gateway.invoke(command).await? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number
                .as_f64()
                .map(|reported| Some(percent_from_reported(reported)))
                .ok_or_else(|| GatewayError::MalformedResponse {
                    command: name,
                    reason: format!("unrepresentable progress {}", number),
                }),
            Some(other) => Err(GatewayError::MalformedResponse {
                command: name,
                reason: format!("expected a number, got {}", other),
            }),
        }
    }

    pub async fn run_service(&self, service_id: &str) -> Result<()> {
        self.gateway
            .invoke(Command::RunService {
                service_id: service_id.to_string(),
            })
            .await
            .map(|_| ())
    }

    pub async fn stop_service(&self, service_id: &str) -> Result<()> {
        self.gateway
            .invoke(Command::StopService {
                service_id: service_id.to_string(),
            })
            .await
            .map(|_| ())
    }

    pub async fn show_logs_for_service(&self, service_id: &str) -> Result<String> {
        let command = Command::ShowLogsForService {
            service_id: service_id.to_string(),
        };
        let name = command.name();

        match self.gateway.invoke(command).await? {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(logs)) => Ok(logs),
            Some(other) => Err(GatewayError::MalformedResponse {
                command: name,
                reason: format!("expected a string, got {}", other),
            }),
        }
    }

    pub async fn delete_service(&self, service_id: &str) -> Result<()> {
        self.gateway
            .invoke(Command::DeleteService {
                service_id: service_id.to_string(),
            })
            .await
            .map(|_| ())
    }
}

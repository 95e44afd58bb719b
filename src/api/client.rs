use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::gateway::{Command, CommandGateway, GatewayError, Result};
use super::models::GatewayConfig;

/// Talks to the service manager over `POST {base_url}/commands/{name}`.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client, config })
    }

    fn command_url(&self, name: &str) -> Result<Url> {
        self.config
            .base_url
            .join(&format!("commands/{}", name))
            .map_err(|e| GatewayError::Unreachable(format!("Invalid command URL: {}", e)))
    }
}

#[async_trait]
impl CommandGateway for HttpGateway {
    async fn invoke(&self, command: Command) -> Result<Option<Value>> {
        let name = command.name();
        let url = self.command_url(name)?;
        debug!(command = name, %url, "invoking service manager");

        let response = self
            .client
            .post(url)
            .json(&command)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            debug!(command = name, %status, "service manager rejected command");
            return Err(GatewayError::BackendRejected(body));
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| GatewayError::MalformedResponse {
                command: name,
                reason: format!("JSON decode error: {}", e),
            })?;

        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }
}

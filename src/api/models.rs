use std::time::Duration;

use url::Url;

/// Configuration for the HTTP gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Always ends with `/` so command paths join underneath it.
    pub base_url: Url,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn with_base_url(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            ..Default::default()
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:8080/").expect("static url"),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = GatewayConfig::with_base_url("http://localhost:9000/manager").unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:9000/manager/");
        assert_eq!(
            config.base_url.join("commands/run_service").unwrap().as_str(),
            "http://localhost:9000/manager/commands/run_service"
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(GatewayConfig::with_base_url("not a url").is_err());
    }
}

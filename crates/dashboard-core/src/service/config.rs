use std::time::Duration;

use crate::errors::ClientError;

pub(crate) const DEFAULT_BASE_URL: &str = "http://127.0.0.1:2024";
pub(crate) const DEFAULT_ASSISTANT_ID: &str = "fashion_analysis";

/// Configuration for the HTTP orchestration service client.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base URL of the service.
    pub base_url: String,
    /// Graph to run.
    pub assistant_id: String,
    /// Sent as `x-api-key` when set.
    pub api_key: Option<String>,
    /// Connect timeout. Streams themselves have no deadline.
    pub connect_timeout: Duration,
}

impl ServiceConfig {
    /// Creates a config pointing at a local development server.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `DASHBOARD_API_URL`, `DASHBOARD_ASSISTANT_ID` and
    /// `DASHBOARD_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::new();
        if let Some(base_url) = non_empty_var("DASHBOARD_API_URL") {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ClientError::Config(format!(
                    "DASHBOARD_API_URL must be an http(s) URL, got {base_url}"
                )));
            }
            config = config.base_url(base_url);
        }
        if let Some(assistant_id) = non_empty_var("DASHBOARD_ASSISTANT_ID") {
            config = config.assistant_id(assistant_id);
        }
        if let Some(api_key) = non_empty_var("DASHBOARD_API_KEY") {
            config = config.api_key(api_key);
        }
        Ok(config)
    }

    /// Overrides the service base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = assistant_id.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let config = ServiceConfig::new().base_url("http://localhost:8123/");
        assert_eq!(config.url("/threads"), "http://localhost:8123/threads");
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ServiceConfig::default()
            .assistant_id("other_graph")
            .api_key("secret")
            .connect_timeout(Duration::from_secs(3));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.assistant_id, "other_graph");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }
}

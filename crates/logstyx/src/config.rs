use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ErrorCallback;
use crate::error::ConfigError;
use crate::queue::DEFAULT_MAX_LOG_IN_QUEUE;
use crate::signature::Signer;
use crate::transport::Transport;

/// Configuration for a [`crate::Client`].
#[derive(Clone)]
pub struct ClientConfig {
    pub project_id: Option<String>,
    /// Key handed to the signer; never sent in the payload.
    pub api_key: Option<String>,
    /// Mobile application identity.
    pub appid: Option<String>,
    /// Collector URL.
    pub endpoint: String,
    /// Device metadata sent with every payload.
    pub device: Option<serde_json::Value>,
    /// Queue capacity before the oldest entries are dropped.
    pub max_log_in_queue: usize,
    /// HTTPS proxy for the default transport.
    pub https_proxy: Option<String>,
    /// Per-request timeout of the default transport. None means no timeout.
    pub request_timeout: Option<Duration>,
    /// Replaces the default `reqwest` transport.
    pub transport: Option<Arc<dyn Transport>>,
    pub signer: Option<Arc<dyn Signer>>,
    pub on_error: Option<ErrorCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            api_key: None,
            appid: None,
            endpoint: String::new(),
            device: None,
            max_log_in_queue: DEFAULT_MAX_LOG_IN_QUEUE,
            https_proxy: None,
            request_timeout: None,
            transport: None,
            signer: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("appid", &self.appid)
            .field("endpoint", &self.endpoint)
            .field("device", &self.device)
            .field("max_log_in_queue", &self.max_log_in_queue)
            .field("https_proxy", &self.https_proxy)
            .field("request_timeout", &self.request_timeout)
            .field("transport", &self.transport.is_some())
            .field("signer", &self.signer.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ClientConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device = match lookup("LOGSTYX_DEVICE") {
            Some(raw) => Some(serde_json::from_str::<serde_json::Value>(&raw).map_err(|_| {
                ConfigError::InvalidEnvVar {
                    name: "LOGSTYX_DEVICE",
                    value: raw.clone(),
                }
            })?),
            None => None,
        };
        let max_log_in_queue = match lookup("LOGSTYX_MAX_LOG_IN_QUEUE") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidEnvVar {
                    name: "LOGSTYX_MAX_LOG_IN_QUEUE",
                    value: raw.clone(),
                })?,
            None => DEFAULT_MAX_LOG_IN_QUEUE,
        };
        let request_timeout = match lookup("LOGSTYX_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.trim().parse::<u64>().map_err(
                |_| ConfigError::InvalidEnvVar {
                    name: "LOGSTYX_REQUEST_TIMEOUT_SECS",
                    value: raw.clone(),
                },
            )?)),
            None => None,
        };

        let config = Self {
            project_id: lookup("LOGSTYX_PROJECT_ID"),
            api_key: lookup("LOGSTYX_API_KEY"),
            appid: lookup("LOGSTYX_APPID"),
            endpoint: lookup("LOGSTYX_ENDPOINT").unwrap_or_default(),
            device,
            max_log_in_queue,
            https_proxy: lookup("LOGSTYX_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY")),
            request_timeout,
            ..Default::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.max_log_in_queue == 0 {
            return Err(ConfigError::InvalidQueueCapacity(self.max_log_in_queue));
        }
        Ok(())
    }
}

//! HTTP transport for the agent bridge.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;

use crate::config::PlayerConfig;
use crate::error::{ConfigError, SimError, SimResult, TransportError};

use super::{AgentClient, AgentConnector, AgentReply, AgentRequest};

/// Longest error body kept in a `HttpStatus` error.
const MAX_ERROR_BODY: usize = 512;

/// Blocking JSON-over-HTTP client for one agent endpoint.
///
/// Must be created and dropped outside an async runtime.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: Client,
    url: Url,
    token: Option<String>,
}

impl HttpAgentClient {
    /// Client for the agent at `uri`. `timeout` bounds each request.
    pub fn new(uri: &str, token: Option<String>, timeout: Duration) -> SimResult<Self> {
        let url = Url::parse(uri).map_err(|e| ConfigError::InvalidAgentUri {
            index: 0,
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed {
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client, url, token })
    }

    /// Endpoint requests are posted to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl AgentClient for HttpAgentClient {
    fn execute(&self, request: &AgentRequest) -> Result<AgentReply, TransportError> {
        let mut builder = self.client.post(self.url.clone()).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().map_err(|e| {
            if e.is_builder() {
                TransportError::SerializationFailed {
                    message: e.to_string(),
                }
            } else {
                TransportError::ConnectionFailed {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        response
            .json::<AgentReply>()
            .map_err(|e| TransportError::MalformedReply {
                message: e.to_string(),
            })
    }
}

/// Connects players to [`HttpAgentClient`]s.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    /// Connector whose clients use `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AgentConnector for HttpConnector {
    fn connect(&self, player: &PlayerConfig) -> SimResult<Arc<dyn AgentClient>> {
        let uri = player.uri.as_deref().ok_or(SimError::Config(ConfigError::NoAgent))?;
        let client = HttpAgentClient::new(uri, player.token.clone(), self.timeout)?;
        tracing::debug!(url = %client.url(), "agent client created");
        Ok(Arc::new(client))
    }
}

use super::{Engine, EngineSnapshot, StepRequest};
use crate::error::EngineError;
use crate::model::{MachineDescriptor, RunConfig};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    machine: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Engine reached over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    http: Client,
    base_url: Url,
}

impl HttpEngine {
    pub fn new(cfg: &RunConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()?;
        let base_url = Url::parse(&cfg.base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base URL {} cannot carry a path", cfg.base_url);
        }
        Ok(Self { http, base_url })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, EngineError> {
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }
        serde_json::from_slice(&body).map_err(|e| EngineError::Malformed(e.to_string()))
    }
}

/// Build the error for a non-2xx response, preferring the engine's own message.
fn rejection(status: StatusCode, body: &[u8]) -> EngineError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            }
        });
    EngineError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Engine for HttpEngine {
    async fn list_machines(&self) -> Result<Vec<String>, EngineError> {
        let resp = self.http.get(self.endpoint(&["machines"])).send().await?;
        Self::decode(resp).await
    }

    async fn machine_descriptor(&self, machine: &str) -> Result<MachineDescriptor, EngineError> {
        let resp = self
            .http
            .get(self.endpoint(&["machine", machine]))
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn init_run(&self, machine: &str, input: &str) -> Result<EngineSnapshot, EngineError> {
        let resp = self
            .http
            .post(self.endpoint(&["simulate", "init"]))
            .json(&InitRequest { machine, input })
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn step_run(&self, request: StepRequest<'_>) -> Result<EngineSnapshot, EngineError> {
        let resp = self
            .http
            .post(self.endpoint(&["simulate", "step"]))
            .json(&request)
            .send()
            .await?;
        Self::decode(resp).await
    }
}

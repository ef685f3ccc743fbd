use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{Decision, DecisionClient};
use crate::{
    capture::Frame,
    config::{SessionConfig, StimulusKind},
    error::{MonitorError, Result},
    BoxFuture,
};

const MONITOR_PATH: &str = "/api/monitor/";
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Serialize)]
struct MonitorRequest<'a> {
    base64_encoded_image: String,
    focus_description: &'a str,
    stimulus_type: StimulusKind,
    /// The backend forwards device stimuli itself when this is set.
    pavlok_token: Option<&'a str>,
}

/// [`DecisionClient`] that posts JSON to the classifier's monitor endpoint.
pub struct HttpDecisionClient {
    client: Client,
    monitor_url: String,
}

impl HttpDecisionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| MonitorError::InvalidConfig(format!("http client: {err}")))?;

        Ok(Self {
            client,
            monitor_url: format!("{}{MONITOR_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub fn monitor_url(&self) -> &str {
        &self.monitor_url
    }

    async fn post(&self, frame: &Frame, config: &SessionConfig) -> Result<Decision> {
        let body = MonitorRequest {
            base64_encoded_image: frame.to_base64(),
            focus_description: config.focus_description(),
            stimulus_type: config.stimulus(),
            pavlok_token: config.device_token(),
        };

        let response = self.client.post(&self.monitor_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(MonitorError::SubmissionFailed(format!(
                "classifier returned {status}: {preview}"
            )));
        }

        let bytes = response.bytes().await?;
        let payload: Value = serde_json::from_slice(&bytes)
            .map_err(|err| MonitorError::SubmissionFailed(format!("malformed decision: {err}")))?;

        Ok(Decision::from_payload(payload))
    }
}

impl DecisionClient for HttpDecisionClient {
    fn submit<'a>(
        &'a self,
        frame: &'a Frame,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(self.post(frame, config))
    }
}

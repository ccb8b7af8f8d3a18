/// HTTP client for the external prediction model.
///
/// Sends `{"inputs": ...}` to the configured URL with the synchronous `ureq`
/// client and reads the prediction out of the JSON reply.
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::schema::ModelConfig;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    inputs: &'a Value,
}

/// A single model reply.
#[derive(Debug, Clone)]
pub struct ModelReply {
    /// `prediction`, else `output`, else `null`.
    pub prediction: Value,
    pub raw: Value,
}

/// Synchronous model client, built per request from the resolved config.
#[derive(Debug)]
pub struct ModelClient {
    url: String,
    name: String,
    timeout: Duration,
}

impl ModelClient {
    /// `None` when no model URL is configured.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            url: config.url.trim().to_string(),
            name: config.name.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predict(&self, inputs: &Value) -> Result<ModelReply> {
        let resp = ureq::post(&self.url)
            .timeout(self.timeout)
            .send_json(PredictRequest { inputs })
            .context("model API request failed")?;

        let raw: Value = resp
            .into_json()
            .context("failed to parse model API response")?;

        Ok(ModelReply {
            prediction: extract_prediction(&raw),
            raw,
        })
    }
}

/// Pull the predicted value out of a model reply.
pub fn extract_prediction(reply: &Value) -> Value {
    reply
        .get("prediction")
        .or_else(|| reply.get("output"))
        .cloned()
        .unwrap_or(Value::Null)
}

//! HTTP client for the operation-execution service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::providers::ProviderError;
use crate::traits::ToolRunner;
use crate::types::{RunnerRequest, RunnerResponse};

/// Dispatches tool steps to the execution service over HTTP. The service owns
/// wallets, signing, and chain access; this side only speaks the wire format.
pub struct HttpToolRunner {
    client: Client,
    endpoint: String,
}

impl HttpToolRunner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let client = crate::providers::build_http_client(timeout)?;
        Ok(Self {
            client,
            endpoint: format!("{}/execute", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ToolRunner for HttpToolRunner {
    async fn run(&self, request: &RunnerRequest) -> anyhow::Result<RunnerResponse> {
        let tool = request
            .tools
            .first()
            .map(|t| t.tool.as_str())
            .unwrap_or("<none>");
        info!(tool, url = %self.endpoint, "Dispatching tool step");

        let resp = match self.client.post(&self.endpoint).json(request).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(tool, "Tool dispatch failed: {}", e);
                return Err(ProviderError::network(&e).into());
            }
        };

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            error!(tool, status = %status, "Execution service error: {}", text);
            anyhow::bail!("execution service returned {}: {}", status, text);
        }

        debug!(tool, bytes = text.len(), "Execution service response");
        let response: RunnerResponse = serde_json::from_str(&text)?;
        Ok(response)
    }
}

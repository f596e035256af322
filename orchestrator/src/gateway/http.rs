//! Remote execution agent over HTTP

use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::{
    ExecutionAck, ExecutionEnvironment, ExecutionStatusResponse, StartExecutionRequest,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::OrchestratorError;
use crate::gateway::{ExecutionGateway, ExecutionReport, ExecutionRequest};
use crate::models::TaskId;

/// HTTP client for the execution agent
pub struct HttpExecutionGateway {
    client: Client,
    base_url: String,
}

impl HttpExecutionGateway {
    /// Create a new gateway client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, OrchestratorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP GET failed: {} - {}", status, body);
            return Err(OrchestratorError::GatewayError(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, OrchestratorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP POST failed: {} - {}", status, body);
            return Err(OrchestratorError::GatewayError(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

fn to_wire(request: &ExecutionRequest) -> StartExecutionRequest {
    let environment = &request.environment;
    StartExecutionRequest {
        task_id: request.task_id.as_uuid(),
        installation_id: request.installation_id.as_uuid(),
        script_ref: request.script_ref.clone(),
        parameters: request.parameters.clone(),
        environment: ExecutionEnvironment {
            environment_id: environment.id.as_uuid(),
            name: environment.name.clone(),
            server_host: environment.server_host.clone(),
            connection_string: environment.connection_string.clone(),
            config: environment.config.clone(),
        },
    }
}

#[async_trait]
impl ExecutionGateway for HttpExecutionGateway {
    async fn start_execution(&self, request: &ExecutionRequest) -> Result<bool, OrchestratorError> {
        let ack: ExecutionAck = self.post("/executions", &to_wire(request)).await?;
        if !ack.accepted {
            debug!(
                "Agent declined task {}: {}",
                request.task_id,
                ack.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(ack.accepted)
    }

    async fn cancel_execution(&self, task_id: TaskId) -> Result<bool, OrchestratorError> {
        let ack: ExecutionAck = self
            .post(&format!("/executions/{}/cancel", task_id), &serde_json::json!({}))
            .await?;
        Ok(ack.accepted)
    }

    async fn poll_status(&self, task_id: TaskId) -> Result<ExecutionReport, OrchestratorError> {
        let response: ExecutionStatusResponse =
            self.get(&format!("/executions/{}", task_id)).await?;
        Ok(ExecutionReport {
            status: response.status,
            progress: response.progress,
            message: response.message,
            error: response.error,
        })
    }
}

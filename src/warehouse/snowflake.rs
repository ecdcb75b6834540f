//! Snowflake SQL API connector
//!
//! The SQL API is stateless HTTP, so a "session" is a handle that owns the
//! client and profile for the duration of one stage.

use super::{ConnectionProfile, Row, WarehouseConnector, WarehouseSession};
use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

// SQL API: POST /api/v2/statements with a JSON body, 200 = finished,
// 202 = still running (poll the statement handle), anything else = failure.

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    data: Option<Vec<Row>>,
    statement_handle: Option<String>,
    message: Option<String>,
    code: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

pub struct SnowflakeConnector {
    profile: ConnectionProfile,
    client: Client,
    statement_timeout_secs: u64,
    poll_interval: Duration,
    max_polls: u32,
}

impl SnowflakeConnector {
    pub fn new(profile: ConnectionProfile) -> Result<Self> {
        profile.validate()?;
        if profile.token.trim().is_empty() {
            return Err(OptimizerError::Warehouse(
                "Snowflake SQL API requires a token (OAuth, key-pair JWT or programmatic access token)".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OptimizerError::Config(format!("Failed to create HTTP client for Snowflake: {}", e)))?;

        Ok(Self {
            profile,
            client,
            statement_timeout_secs: 60,
            poll_interval: Duration::from_millis(500),
            max_polls: 120,
        })
    }

    /// Server-side statement timeout sent with each request
    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = secs;
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }
}

#[async_trait]
impl WarehouseConnector for SnowflakeConnector {
    fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    async fn connect(&self) -> Result<Box<dyn WarehouseSession>> {
        debug!("Opening Snowflake session for {}@{}", self.profile.user, self.profile.account);
        Ok(Box::new(SnowflakeSession {
            client: self.client.clone(),
            profile: self.profile.clone(),
            base_url: self.profile.account_url(),
            statement_timeout_secs: self.statement_timeout_secs,
            poll_interval: self.poll_interval,
            max_polls: self.max_polls,
            running: None,
            open: true,
        }))
    }
}

struct SnowflakeSession {
    client: Client,
    profile: ConnectionProfile,
    base_url: String,
    statement_timeout_secs: u64,
    poll_interval: Duration,
    max_polls: u32,
    /// Handle of a statement the server reported as still running
    running: Option<String>,
    open: bool,
}

impl SnowflakeSession {
    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.profile.token)
            .header("X-Snowflake-Authorization-Token-Type", self.profile.token_type.header_value())
            .header("Accept", "application/json")
            .header("User-Agent", concat!("queryverse/", env!("CARGO_PKG_VERSION")))
    }

    async fn submit(&self, sql: &str) -> Result<(StatusCode, StatementResponse)> {
        let url = format!(
            "{}/api/v2/statements?requestId={}",
            self.base_url,
            uuid::Uuid::new_v4()
        );
        let body = StatementRequest {
            statement: sql,
            timeout: self.statement_timeout_secs,
            database: &self.profile.database,
            schema: &self.profile.schema,
            warehouse: &self.profile.warehouse,
            role: self.profile.role.as_deref(),
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| OptimizerError::Warehouse(format!("Failed to submit Snowflake statement: {}", e)))?;
        read_response(response).await
    }

    async fn fetch(&self, handle: &str, partition: Option<usize>) -> Result<(StatusCode, StatementResponse)> {
        let mut url = format!("{}/api/v2/statements/{}", self.base_url, handle);
        if let Some(p) = partition {
            url.push_str(&format!("?partition={}", p));
        }
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| OptimizerError::Warehouse(format!("Failed to fetch Snowflake statement {}: {}", handle, e)))?;
        read_response(response).await
    }
}

async fn read_response(response: reqwest::Response) -> Result<(StatusCode, StatementResponse)> {
    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::ACCEPTED {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StatementResponse>(&text)
            .ok()
            .and_then(|r| r.message)
            .unwrap_or(text);
        return Err(OptimizerError::Warehouse(format!(
            "Snowflake statement failed with status {}: {}",
            status, message
        )));
    }
    let parsed: StatementResponse = response
        .json()
        .await
        .map_err(|e| OptimizerError::Warehouse(format!("Failed to parse Snowflake response: {}", e)))?;
    Ok((status, parsed))
}

#[async_trait]
impl WarehouseSession for SnowflakeSession {
    async fn execute(&mut self, sql: &str) -> Result<Vec<Row>> {
        if !self.open {
            return Err(OptimizerError::Warehouse("session is closed".to_string()));
        }

        let (mut status, mut response) = self.submit(sql).await?;

        let mut polls = 0;
        while status == StatusCode::ACCEPTED {
            let handle = response.statement_handle.clone().ok_or_else(|| {
                OptimizerError::Warehouse("statement still running but no handle was returned".to_string())
            })?;
            if polls >= self.max_polls {
                return Err(OptimizerError::Warehouse(format!(
                    "statement {} still running after {} polls",
                    handle, polls
                )));
            }
            polls += 1;
            self.running = Some(handle.clone());
            tokio::time::sleep(self.poll_interval).await;
            let (next_status, next_response) = self.fetch(&handle, None).await?;
            status = next_status;
            response = next_response;
        }

        self.running = None;
        let mut rows = response.data.take().unwrap_or_default();

        let partitions = response
            .result_set_meta_data
            .as_ref()
            .map(|m| m.partition_info.len())
            .unwrap_or(0);
        if partitions > 1 {
            let handle = response.statement_handle.clone().ok_or_else(|| {
                OptimizerError::Warehouse("partitioned result without a statement handle".to_string())
            })?;
            for partition in 1..partitions {
                let (_, part) = self.fetch(&handle, Some(partition)).await?;
                rows.extend(part.data.unwrap_or_default());
            }
        }

        if let Some(code) = &response.code {
            debug!("Snowflake statement finished with code {} ({} rows)", code, rows.len());
        }
        Ok(rows)
    }

    async fn cancel(&mut self) -> Result<()> {
        let Some(handle) = self.running.take() else {
            return Ok(());
        };
        let url = format!("{}/api/v2/statements/{}/cancel", self.base_url, handle);
        let response = self
            .authorized(self.client.post(&url))
            .send()
            .await
            .map_err(|e| OptimizerError::Warehouse(format!("Failed to cancel Snowflake statement {}: {}", handle, e)))?;
        if !response.status().is_success() {
            return Err(OptimizerError::Warehouse(format!(
                "Cancelling Snowflake statement {} failed with status {}",
                handle,
                response.status()
            )));
        }
        info!("Cancelled Snowflake statement {}", handle);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            debug!("Closed Snowflake session for {}", self.profile.user);
        } else {
            warn!("Snowflake session closed twice");
        }
        Ok(())
    }
}

impl Drop for SnowflakeSession {
    fn drop(&mut self) {
        if self.open {
            info!("Snowflake session for {} dropped without close", self.profile.user);
        }
    }
}

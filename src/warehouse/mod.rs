//! Warehouse collaborator
//!
//! - [`WarehouseConnector`] opens a fresh [`WarehouseSession`] per stage
//! - [`explain_plan`] / [`describe_table`] run one statement in a scoped
//!   session. Connect and the statement are timeout-bounded; a timed-out
//!   statement is cancelled and the session is closed on every path
//! - [`SnowflakeConnector`] talks to the Snowflake SQL API over HTTP

pub mod snowflake;

use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub use snowflake::SnowflakeConnector;

/// One result row; SQL NULL is `None`
pub type Row = Vec<Option<String>>;

/// How the bearer token in a [`ConnectionProfile`] was issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    #[default]
    #[serde(rename = "OAUTH")]
    OAuth,
    #[serde(rename = "KEYPAIR_JWT")]
    KeyPairJwt,
    #[serde(rename = "PROGRAMMATIC_ACCESS_TOKEN")]
    ProgrammaticAccessToken,
}

impl TokenType {
    pub fn header_value(&self) -> &'static str {
        match self {
            TokenType::OAuth => "OAUTH",
            TokenType::KeyPairJwt => "KEYPAIR_JWT",
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

/// A named warehouse connection as stored by the connections page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub account: String,
    pub user: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub token_type: TokenType,
    /// Overrides `https://<account>.snowflakecomputing.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ConnectionProfile {
    pub fn new(
        account: impl Into<String>,
        user: impl Into<String>,
        warehouse: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            user: user.into(),
            warehouse: warehouse.into(),
            database: database.into(),
            schema: schema.into(),
            role: None,
            token: token.into(),
            token_type: TokenType::default(),
            base_url: None,
        }
    }

    /// All of account, user, warehouse, database and schema must be non-empty
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("account", &self.account),
            ("user", &self.user),
            ("warehouse", &self.warehouse),
            ("database", &self.database),
            ("schema", &self.schema),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OptimizerError::Warehouse(format!(
                "Missing required connection fields: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn account_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}

#[async_trait]
pub trait WarehouseSession: Send {
    /// Run one statement and return its rows
    async fn execute(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// `EXPLAIN USING TEXT`; the plan is the first column of each row, one per line
    async fn execute_plan(&mut self, query: &str) -> Result<String> {
        let rows = self.execute(&format!("EXPLAIN USING TEXT {}", query)).await?;
        Ok(first_column(rows).join("\n"))
    }

    /// `DESC TABLE`; column names are the first column of each row
    async fn describe_table(&mut self, qualified_name: &str) -> Result<Vec<String>> {
        let rows = self.execute(&format!("DESC TABLE {}", qualified_name)).await?;
        Ok(first_column(rows))
    }

    /// Abort whatever statement is still running server-side
    async fn cancel(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    fn profile(&self) -> &ConnectionProfile;

    async fn connect(&self) -> Result<Box<dyn WarehouseSession>>;
}

fn first_column(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .collect()
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| OptimizerError::Timeout(timeout.as_secs()))?
}

/// Finish a scoped session: cancel a timed-out statement, then close.
/// Both steps are bounded so a stuck session cannot hold the caller.
async fn settle<T>(session: &mut dyn WarehouseSession, outcome: Result<T>, timeout: Duration) -> Result<T> {
    if let Err(OptimizerError::Timeout(_)) = outcome {
        match tokio::time::timeout(timeout, session.cancel()).await {
            Ok(Ok(())) => debug!("Cancelled timed-out warehouse statement"),
            Ok(Err(e)) => warn!("Failed to cancel warehouse statement: {}", e),
            Err(_) => warn!("Cancelling warehouse statement timed out"),
        }
    }
    match tokio::time::timeout(timeout, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to close warehouse session: {}", e),
        Err(_) => warn!("Closing warehouse session timed out"),
    }
    outcome
}

/// Plan text for `query` using a dedicated session
pub async fn explain_plan(connector: &dyn WarehouseConnector, query: &str, timeout: Duration) -> Result<String> {
    debug!("Running EXPLAIN for {} chars of SQL", query.len());
    let mut session = bounded(timeout, connector.connect()).await?;
    let plan = bounded(timeout, session.execute_plan(query)).await;
    settle(session.as_mut(), plan, timeout).await
}

/// Column names of `qualified_name` using a dedicated session
pub async fn describe_table(
    connector: &dyn WarehouseConnector,
    qualified_name: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let mut session = bounded(timeout, connector.connect()).await?;
    let columns = bounded(timeout, session.describe_table(qualified_name)).await;
    settle(session.as_mut(), columns, timeout).await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    pub user: String,
    pub timestamp: String,
}

/// Run `SELECT CURRENT_USER(), CURRENT_TIMESTAMP()` to confirm the profile works
pub async fn check_connection(connector: &dyn WarehouseConnector, timeout: Duration) -> Result<ConnectionCheck> {
    connector.profile().validate()?;
    let mut session = bounded(timeout, connector.connect()).await?;
    let rows = bounded(timeout, session.execute("SELECT CURRENT_USER(), CURRENT_TIMESTAMP()")).await;
    let rows = settle(session.as_mut(), rows, timeout).await?;

    let mut row = rows
        .into_iter()
        .next()
        .ok_or_else(|| OptimizerError::Warehouse("connection check returned no rows".to_string()))?
        .into_iter();
    Ok(ConnectionCheck {
        user: row.next().flatten().unwrap_or_default(),
        timestamp: row.next().flatten().unwrap_or_default(),
    })
}

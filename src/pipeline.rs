//! Query optimization pipeline
//!
//! One run walks the stages strictly in order:
//!
//! ```text
//! Idle -> Classified -> PlanOriginal -> Prompted -> ModelCalled -> Sanitized
//!      -> ValidCandidate -> PlanOptimized -> Compared -> Done
//!                    \-> InvalidCandidate -> Done
//!      \-> Rejected
//! ```
//!
//! Nothing is shared between runs; each warehouse stage opens and closes its
//! own session. The run never returns an error: every failure is folded into
//! the [`OptimizationOutcome`].

use crate::compare::PlanComparator;
use crate::config::OptimizerConfig;
use crate::credentials::{ChainedCredentialStore, CredentialStore, EnvCredentialStore, JsonCredentialStore};
use crate::error::Result;
use crate::llm::{self, GatewayError, ModelGateway, ProviderSelection};
use crate::prompt;
use crate::query::QueryClassification;
use crate::sanitize;
use crate::schema::SchemaIntrospector;
use crate::warehouse::{self, WarehouseConnector};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

pub const REJECTED_MESSAGE: &str = "Only SELECT or WITH queries are supported.";
pub const INVALID_CANDIDATE_MESSAGE: &str = "Optimized output is not a valid SELECT/WITH query.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Idle,
    Classified,
    Rejected,
    PlanOriginal,
    Prompted,
    ModelCalled,
    Sanitized,
    ValidCandidate,
    InvalidCandidate,
    PlanOptimized,
    Compared,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub run_id: String,
    pub original_query: String,
    pub classification: QueryClassification,
    pub schema_columns: Vec<String>,
    pub selection: ProviderSelection,
    pub original_plan: String,
    pub raw_response: String,
    pub optimized_query: String,
    pub optimized_plan: String,
    pub comparison: String,
    pub stages: Vec<PipelineStage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidCandidate {
    pub run_id: String,
    pub message: String,
    pub original_plan: String,
    /// Model text, or the rendered gateway error when the call failed
    pub raw_response: String,
    pub candidate: String,
    pub gateway_error: Option<GatewayError>,
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OptimizationOutcome {
    /// Input was not a SELECT/WITH statement; no network call was made
    Rejected {
        reason: String,
        stages: Vec<PipelineStage>,
    },
    /// The model produced nothing usable; the comparison was skipped
    InvalidCandidate(InvalidCandidate),
    Compared(OptimizationReport),
}

impl OptimizationOutcome {
    pub fn stages(&self) -> &[PipelineStage] {
        match self {
            OptimizationOutcome::Rejected { stages, .. } => stages,
            OptimizationOutcome::InvalidCandidate(c) => &c.stages,
            OptimizationOutcome::Compared(r) => &r.stages,
        }
    }

    pub fn is_compared(&self) -> bool {
        matches!(self, OptimizationOutcome::Compared(_))
    }
}

struct RunTrace {
    run_id: String,
    stages: Vec<PipelineStage>,
}

impl RunTrace {
    fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            stages: vec![PipelineStage::Idle],
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        debug!(?stage, "Pipeline stage");
        self.stages.push(stage);
    }
}

pub struct QueryOptimizer {
    gateway: ModelGateway,
    comparator: PlanComparator,
    introspector: SchemaIntrospector,
    credentials: Arc<dyn CredentialStore>,
    default_selection: ProviderSelection,
    warehouse_timeout: Duration,
}

impl QueryOptimizer {
    pub fn new(config: &OptimizerConfig, gateway: ModelGateway, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            comparator: PlanComparator::new(gateway.clone()),
            gateway,
            introspector: SchemaIntrospector::new(config.warehouse_timeout),
            credentials,
            default_selection: ProviderSelection::new(config.default_provider, config.default_model.clone()),
            warehouse_timeout: config.warehouse_timeout,
        }
    }

    /// Optimizer reading credentials from the configured file, then the environment
    pub fn from_config(config: &OptimizerConfig) -> Result<Self> {
        let credentials: Arc<dyn CredentialStore> = Arc::new(ChainedCredentialStore::new(vec![
            Arc::new(JsonCredentialStore::new(&config.credentials_file)),
            Arc::new(EnvCredentialStore::from_env()),
        ]));
        let gateway = ModelGateway::from_config(config, credentials.clone())?;
        Ok(Self::new(config, gateway, credentials))
    }

    pub fn comparator(&self) -> &PlanComparator {
        &self.comparator
    }

    pub fn resolve_selection(&self, requested: Option<ProviderSelection>) -> ProviderSelection {
        llm::resolve_selection(
            requested,
            self.default_selection.provider,
            &self.default_selection.model,
            self.credentials.as_ref(),
        )
    }

    /// Run the whole pipeline for one query
    pub async fn optimize(
        &self,
        query: &str,
        selection: Option<ProviderSelection>,
        connector: &dyn WarehouseConnector,
    ) -> OptimizationOutcome {
        let mut trace = RunTrace::new();
        let span = info_span!("optimize", run_id = %trace.run_id);
        async move {
            let started_at = Utc::now();
            let query = query.trim();

            let classification = QueryClassification::classify(query);
            trace.advance(PipelineStage::Classified);
            if !classification.is_eligible() {
                warn!("Rejected query that is not SELECT/WITH");
                trace.advance(PipelineStage::Rejected);
                return OptimizationOutcome::Rejected {
                    reason: REJECTED_MESSAGE.to_string(),
                    stages: trace.stages,
                };
            }
            info!(%classification, "Optimizing query");

            trace.advance(PipelineStage::PlanOriginal);
            let original_plan = self.plan_text(connector, query).await;

            let schema_columns = match classification {
                QueryClassification::With => {
                    debug!("CTE query, skipping schema introspection");
                    Vec::new()
                }
                _ => self.introspector.columns_for(query, connector).await,
            };
            let prompt = prompt::build_optimization_prompt(query, &prompt::schema_hint(&schema_columns));
            trace.advance(PipelineStage::Prompted);

            let selection = self.resolve_selection(selection);
            info!(provider = %selection.provider, model = %selection.model, "Requesting optimized query");
            let response = self.gateway.invoke(&prompt, &selection.model, selection.provider).await;
            trace.advance(PipelineStage::ModelCalled);

            let raw_response = match response {
                Ok(text) => text,
                Err(e) => {
                    trace.advance(PipelineStage::InvalidCandidate);
                    trace.advance(PipelineStage::Done);
                    return OptimizationOutcome::InvalidCandidate(InvalidCandidate {
                        run_id: trace.run_id,
                        message: e.to_string(),
                        original_plan,
                        raw_response: e.to_string(),
                        candidate: String::new(),
                        gateway_error: Some(e),
                        stages: trace.stages,
                    });
                }
            };
            debug!("Raw LLM response:\n{}", raw_response);

            let optimized_query = sanitize::sanitize(&raw_response);
            trace.advance(PipelineStage::Sanitized);

            if !QueryClassification::classify_candidate(&optimized_query).is_eligible() {
                warn!("{}", INVALID_CANDIDATE_MESSAGE);
                trace.advance(PipelineStage::InvalidCandidate);
                trace.advance(PipelineStage::Done);
                return OptimizationOutcome::InvalidCandidate(InvalidCandidate {
                    run_id: trace.run_id,
                    message: INVALID_CANDIDATE_MESSAGE.to_string(),
                    original_plan,
                    raw_response,
                    candidate: optimized_query,
                    gateway_error: None,
                    stages: trace.stages,
                });
            }
            trace.advance(PipelineStage::ValidCandidate);

            let optimized_plan = self.plan_text(connector, &optimized_query).await;
            trace.advance(PipelineStage::PlanOptimized);

            let comparison = self
                .comparator
                .compare(&original_plan, &optimized_plan, &selection)
                .await;
            trace.advance(PipelineStage::Compared);
            trace.advance(PipelineStage::Done);
            info!("Optimization finished");

            OptimizationOutcome::Compared(OptimizationReport {
                run_id: trace.run_id,
                original_query: query.to_string(),
                classification,
                schema_columns,
                selection,
                original_plan,
                raw_response,
                optimized_query,
                optimized_plan,
                comparison,
                stages: trace.stages,
                started_at,
                finished_at: Utc::now(),
            })
        }
        .instrument(span)
        .await
    }

    /// EXPLAIN text, or `Error: ...` when the warehouse call fails
    async fn plan_text(&self, connector: &dyn WarehouseConnector, query: &str) -> String {
        match warehouse::explain_plan(connector, query, self.warehouse_timeout).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("EXPLAIN failed: {}", e);
                format!("Error: {}", e)
            }
        }
    }
}

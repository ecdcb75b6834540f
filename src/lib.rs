//! QueryVerse: LLM-assisted SQL optimization against a cloud warehouse
//!
//! A read-only query is classified, explained, rewritten by a language model,
//! sanitized, explained again and finally compared by the model.

pub mod compare;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod sanitize;
pub mod schema;
pub mod warehouse;

pub use compare::PlanComparator;
pub use config::OptimizerConfig;
pub use credentials::{
    ChainedCredentialStore, CredentialStore, EnvCredentialStore, InMemoryCredentialStore, JsonCredentialStore,
    ProviderCredentials,
};
pub use error::{OptimizerError, Result};
pub use llm::{GatewayError, GatewayErrorKind, ModelGateway, ModelProvider, ProviderKind, ProviderSelection};
pub use pipeline::{InvalidCandidate, OptimizationOutcome, OptimizationReport, PipelineStage, QueryOptimizer};
pub use query::QueryClassification;
pub use sanitize::sanitize;
pub use schema::SchemaIntrospector;
pub use warehouse::snowflake::SnowflakeConnector;
pub use warehouse::{ConnectionProfile, WarehouseConnector, WarehouseSession};

//! Plan Comparator
//!
//! Asks the model for a plain-language verdict on two EXPLAIN plans. The plans
//! are embedded verbatim and never parsed here.

use crate::llm::{ModelGateway, ProviderSelection};
use tracing::{info, warn};

pub fn build_comparison_prompt(original_plan: &str, optimized_plan: &str) -> String {
    format!(
        "You are a Snowflake SQL optimization expert.

Compare these two EXPLAIN plans and give a plain-language summary a non-expert can follow. Point out differences in partitions scanned, pruning, joins and bytes read.

1. Original Plan:
{}

2. Optimized Plan:
{}

Clearly explain whether performance improved, worsened, or stayed the same.",
        original_plan, optimized_plan
    )
}

#[derive(Clone)]
pub struct PlanComparator {
    gateway: ModelGateway,
}

impl PlanComparator {
    pub fn new(gateway: ModelGateway) -> Self {
        Self { gateway }
    }

    /// The model's answer unmodified; a failed call yields the rendered
    /// gateway error, which starts with the failure marker.
    pub async fn compare(&self, original_plan: &str, optimized_plan: &str, selection: &ProviderSelection) -> String {
        let prompt = build_comparison_prompt(original_plan, optimized_plan);
        info!(provider = %selection.provider, model = %selection.model, "Comparing EXPLAIN plans");

        match self.gateway.invoke(&prompt, &selection.model, selection.provider).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Plan comparison failed: {}", e);
                e.to_string()
            }
        }
    }
}

//! get_organization_health - composite vault health score.

use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{ToolOutput, ValidateParams};
use crate::analytics;
use crate::context::ServerContext;
use crate::error::Result;
use crate::store::DEFAULT_SCAN_CONCURRENCY;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Include the recommendation list
    #[serde(default = "default_true")]
    pub include_recommendations: bool,
    /// Include the ratio breakdown behind the score
    #[serde(default = "default_true")]
    pub include_breakdown: bool,
}

fn default_true() -> bool {
    true
}

impl ValidateParams for Params {}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    let corpus = ctx.store.load_all(true, DEFAULT_SCAN_CONCURRENCY).await?;
    let health = analytics::organization_health(&corpus, Utc::now());

    let mut text = format!(
        "Organization health: {:.0}/100 (grade {}).",
        health.score, health.grade
    );
    if params.include_breakdown {
        text.push_str(&format!(
            "\n\n**Orphan ratio:** {:.2}\n**Stale ratio (30d):** {:.2}\n**Category balance:** {:.0}/100",
            health.orphan_ratio, health.stale_ratio, health.category_balance
        ));
    }
    if params.include_recommendations && !health.recommendations.is_empty() {
        text.push_str("\n\n**Recommendations:**");
        for recommendation in &health.recommendations {
            text.push_str(&format!("\n- {recommendation}"));
        }
    }

    let mut metadata = json!({
        "score": health.score,
        "grade": health.grade.to_string(),
    });
    if params.include_breakdown {
        metadata["orphanRatio"] = json!(health.orphan_ratio);
        metadata["staleRatio"] = json!(health.stale_ratio);
        metadata["categoryBalance"] = json!(health.category_balance);
    }
    if params.include_recommendations {
        metadata["recommendations"] = json!(health.recommendations);
    }

    Ok(ToolOutput::new(text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn empty_vault_is_grade_a() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let params: Params = serde_json::from_value(json!({})).unwrap();
        let output = execute(&ctx, params).await.unwrap();

        assert_eq!(output.metadata["score"], 100.0);
        assert_eq!(output.metadata["grade"], "A");
        ctx.cleanup().await;
    }
}

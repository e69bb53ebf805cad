//! get_metrics - server introspection.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    Json,
    Prometheus,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Output format
    #[serde(default = "default_format")]
    pub format: MetricsFormat,
    /// Clear the collected samples after reading
    #[serde(default)]
    pub reset: bool,
}

fn default_format() -> MetricsFormat {
    MetricsFormat::Json
}

impl ValidateParams for Params {}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    let output = match params.format {
        MetricsFormat::Json => {
            let summary = ctx.metrics.summary();
            let value = serde_json::to_value(&summary)
                .map_err(|err| ServerError::internal(format!("metrics encoding: {err}")))?;
            let text = format!(
                "Uptime {} ms; {} tool(s) seen; recovery queue size {}.",
                summary.uptime_ms,
                summary.tools.len(),
                summary.queue.current_size
            );
            ToolOutput::new(text, json!({ "format": "json", "summary": value }))
        }
        MetricsFormat::Prometheus => {
            let text = ctx.metrics.to_prometheus_format();
            let metadata = json!({ "format": "prometheus" });
            ToolOutput::new(text, metadata)
        }
    };

    if params.reset {
        ctx.metrics.reset();
    }
    Ok(output)
}

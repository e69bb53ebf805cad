//! search_memory - ranked full-text search with snippets.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{parse_category, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::Result;
use crate::index::SearchOptions;

const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Full-text query over titles, bodies, tags, categories, and projects
    pub query: String,
    /// Filter to one PARA category
    #[serde(default)]
    pub category: Option<String>,
    /// Keep notes carrying any of these tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Result cap, at most 100 (server default when omitted)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Result offset for paging
    #[serde(default)]
    pub offset: usize,
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        if matches!(self.limit, Some(limit) if limit == 0 || limit > MAX_LIMIT) {
            return Err(format!("limit must be between 1 and {MAX_LIMIT}"));
        }
        if let Some(category) = &self.category {
            parse_category(category)?;
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    let index = ctx.index().await?;
    let limit = params.limit.unwrap_or(ctx.config.search_default_limit);

    let response = index
        .search(
            &params.query,
            SearchOptions {
                limit,
                offset: params.offset,
                category: params.category.clone(),
                tags: params.tags.clone().unwrap_or_default(),
            },
        )
        .await?;

    let mut text = format!(
        "{} result(s) for \"{}\" in {} ms.\n",
        response.total_count, params.query, response.total_ms
    );
    for (rank, hit) in response.results.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({})\n   {}",
            rank + 1,
            hit.title,
            hit.uid,
            hit.snippet.replace('\n', " "),
        ));
    }

    let metadata = json!({
        "query": params.query,
        "response": response,
    });

    Ok(ToolOutput::new(text, metadata))
}

//! find_stale_notes - notes untouched for longer than a cutoff.

use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{parse_category, ToolOutput, ValidateParams};
use crate::analytics;
use crate::context::ServerContext;
use crate::error::Result;
use crate::store::DEFAULT_SCAN_CONCURRENCY;

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StaleSort {
    Oldest,
    Newest,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Notes whose `updated` is older than this many days are stale
    pub stale_days: i64,
    /// Filter to one PARA category
    #[serde(default)]
    pub category: Option<String>,
    /// Leave archived notes out of the report
    #[serde(default = "default_true")]
    pub exclude_archives: bool,
    /// Sort order
    #[serde(default = "default_sort")]
    pub sort: StaleSort,
}

fn default_true() -> bool {
    true
}

fn default_sort() -> StaleSort {
    StaleSort::Oldest
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.stale_days < 1 {
            return Err("staleDays must be at least 1".into());
        }
        if let Some(category) = &self.category {
            parse_category(category)?;
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    let corpus = ctx.store.load_all(true, DEFAULT_SCAN_CONCURRENCY).await?;
    let mut stale = analytics::stale_notes(
        &corpus,
        params.stale_days,
        !params.exclude_archives,
        Utc::now(),
    );

    if let Some(category) = &params.category {
        let filter = parse_category(category).ok().map(|c| c.as_str().to_string());
        stale.retain(|note| note.category == filter);
    }
    if matches!(params.sort, StaleSort::Newest) {
        stale.reverse();
    }

    let mut text = format!(
        "{} note(s) older than {} day(s).\n",
        stale.len(),
        params.stale_days
    );
    for note in &stale {
        text.push_str(&format!(
            "\n- {} ({}) — {} day(s) ago",
            note.title, note.uid, note.days_ago
        ));
    }

    let metadata = json!({
        "staleDays": params.stale_days,
        "totalCount": stale.len(),
        "notes": stale,
    });

    Ok(ToolOutput::new(text, metadata))
}

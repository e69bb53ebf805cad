//! get_vault_stats - corpus-wide roll-up numbers.

use std::sync::Arc;

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
    /// Include the per-category histogram
    #[serde(default = "default_true")]
    pub include_categories: bool,
    /// Include the top-tag histogram
    #[serde(default = "default_true")]
    pub include_tags: bool,
    /// Include link totals and orphan counts
    #[serde(default = "default_true")]
    pub include_links: bool,
}

fn default_true() -> bool {
    true
}

impl ValidateParams for Params {}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    let corpus = ctx.store.load_all(true, DEFAULT_SCAN_CONCURRENCY).await?;
    let stats = analytics::vault_stats(&corpus);

    let mut text = format!(
        "Vault: {} note(s), {} words total.",
        stats.note_count, stats.total_words
    );
    if params.include_categories && !stats.categories.is_empty() {
        text.push_str("\n\n**Categories:**");
        for (category, count) in &stats.categories {
            text.push_str(&format!("\n- {category}: {count}"));
        }
    }
    if params.include_tags && !stats.top_tags.is_empty() {
        text.push_str("\n\n**Top tags:**");
        for entry in stats.top_tags.iter().take(10) {
            text.push_str(&format!("\n- {}: {}", entry.tag, entry.count));
        }
    }
    if params.include_links {
        text.push_str(&format!(
            "\n\n**Links:** {} total, {:.1} per note, {} orphan note(s).",
            stats.total_links, stats.avg_links_per_note, stats.orphan_count
        ));
    }

    let mut metadata = json!({
        "noteCount": stats.note_count,
        "totalWords": stats.total_words,
    });
    if params.include_categories {
        metadata["categories"] = json!(stats.categories);
    }
    if params.include_tags {
        metadata["topTags"] = json!(stats.top_tags);
    }
    if params.include_links {
        metadata["totalLinks"] = json!(stats.total_links);
        metadata["avgLinksPerNote"] = json!(stats.avg_links_per_note);
        metadata["orphanCount"] = json!(stats.orphan_count);
    }

    Ok(ToolOutput::new(text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, Category, FrontMatter, Note};

    #[tokio::test]
    async fn sections_follow_the_toggles() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut note = Note::new(FrontMatter::new(mint_uid(), "Stat Me".into()), "one two".into());
        note.front.category = Some(Category::Areas);
        note.front.tags = vec!["tag1".into()];
        ctx.store.save(&mut note).await.unwrap();

        let all = execute(
            &ctx,
            Params {
                include_categories: true,
                include_tags: true,
                include_links: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(all.metadata["noteCount"], 1);
        assert_eq!(all.metadata["categories"]["Areas"], 1);
        assert_eq!(all.metadata["topTags"][0]["tag"], "tag1");
        assert_eq!(all.metadata["orphanCount"], 1);

        let bare = execute(
            &ctx,
            Params {
                include_categories: false,
                include_tags: false,
                include_links: false,
            },
        )
        .await
        .unwrap();
        assert!(bare.metadata.get("categories").is_none());
        assert!(bare.metadata.get("topTags").is_none());
        assert!(bare.metadata.get("orphanCount").is_none());
        ctx.cleanup().await;
    }
}

//! find_orphan_notes - notes with no links in either direction.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{parse_category, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::Result;

const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrphanSort {
    Updated,
    Created,
    Title,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Result cap
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Filter to one PARA category
    #[serde(default)]
    pub category: Option<String>,
    /// Sort key
    #[serde(default = "default_sort")]
    pub sort: OrphanSort,
}

fn default_limit() -> usize {
    50
}

fn default_sort() -> OrphanSort {
    OrphanSort::Updated
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
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
    let mut orphans = index.get_orphan_notes().await?;

    if let Some(category) = &params.category {
        let filter = parse_category(category)
            .ok()
            .map(|c| c.as_str().to_string());
        orphans.retain(|note| note.category == filter);
    }

    // Timestamps are RFC 3339 strings, so ordering them as text is
    // chronological
    match params.sort {
        OrphanSort::Updated => orphans.sort_by(|a, b| b.updated.cmp(&a.updated)),
        OrphanSort::Created => orphans.sort_by(|a, b| b.created.cmp(&a.created)),
        OrphanSort::Title => orphans.sort_by(|a, b| a.title.cmp(&b.title)),
    }

    let total = orphans.len();
    orphans.truncate(params.limit);

    let mut text = format!("{total} orphan note(s) found.\n");
    for note in &orphans {
        text.push_str(&format!("\n- {} ({})", note.title, note.uid));
    }

    let notes: Vec<_> = orphans
        .iter()
        .map(|note| {
            json!({
                "uid": note.uid,
                "title": note.title,
                "category": note.category,
                "filePath": note.file_path,
                "updated": note.updated,
            })
        })
        .collect();

    let metadata = json!({
        "totalCount": total,
        "notes": notes,
    });

    Ok(ToolOutput::new(text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, Category, FrontMatter, Note};

    #[tokio::test]
    async fn linked_notes_are_not_orphans() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut target = Note::new(FrontMatter::new(mint_uid(), "Target".into()), "t".into());
        ctx.store.save(&mut target).await.unwrap();

        let mut source = Note::new(FrontMatter::new(mint_uid(), "Source".into()), "s".into());
        source.front.links = vec![target.front.id.clone()];
        ctx.store.save(&mut source).await.unwrap();

        let mut orphan = Note::new(FrontMatter::new(mint_uid(), "Orphan".into()), "o".into());
        ctx.store.save(&mut orphan).await.unwrap();

        let params: Params = serde_json::from_value(json!({})).unwrap();
        let output = execute(&ctx, params).await.unwrap();

        assert_eq!(output.metadata["totalCount"], 1);
        assert_eq!(output.metadata["notes"][0]["uid"], orphan.front.id.as_str());
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn category_filter_narrows_the_report() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut resource = Note::new(FrontMatter::new(mint_uid(), "Res".into()), "r".into());
        resource.front.category = Some(Category::Resources);
        ctx.store.save(&mut resource).await.unwrap();

        let mut project = Note::new(FrontMatter::new(mint_uid(), "Proj".into()), "p".into());
        project.front.category = Some(Category::Projects);
        ctx.store.save(&mut project).await.unwrap();

        let params: Params = serde_json::from_value(json!({"category": "Resources"})).unwrap();
        let output = execute(&ctx, params).await.unwrap();

        assert_eq!(output.metadata["totalCount"], 1);
        assert_eq!(output.metadata["notes"][0]["uid"], resource.front.id.as_str());
        ctx.cleanup().await;
    }
}

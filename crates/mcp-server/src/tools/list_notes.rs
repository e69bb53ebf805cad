//! list_notes - filter and paginate the indexed notes.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{parse_category, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::Result;
use crate::index::{ListOptions, SortBy, SortOrder};

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Created,
    Updated,
    Title,
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Filter to one PARA category
    #[serde(default)]
    pub category: Option<String>,
    /// Keep notes carrying any of these tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Filter to one project
    #[serde(default)]
    pub project: Option<String>,
    /// Page size, at most 1000
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Page offset
    #[serde(default)]
    pub offset: usize,
    /// Sort key: created, updated, or title
    #[serde(default = "default_sort_by")]
    pub sort_by: SortField,
    /// Sort direction
    #[serde(default = "default_sort_order")]
    pub sort_order: SortDirection,
}

fn default_limit() -> usize {
    100
}

fn default_sort_by() -> SortField {
    SortField::Updated
}

fn default_sort_order() -> SortDirection {
    SortDirection::Desc
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

    let options = ListOptions {
        category: params.category.clone(),
        tags: params.tags.clone().unwrap_or_default(),
        project: params.project.clone(),
        limit: params.limit,
        offset: params.offset,
        sort_by: match params.sort_by {
            SortField::Created => SortBy::Created,
            SortField::Updated => SortBy::Updated,
            SortField::Title => SortBy::Title,
        },
        sort_order: match params.sort_order {
            SortDirection::Asc => SortOrder::Asc,
            SortDirection::Desc => SortOrder::Desc,
        },
    };

    let (notes, total_count) = index.list_notes(options).await?;

    let mut text = format!(
        "{total_count} note(s) matched; showing {} from offset {}.\n",
        notes.len(),
        params.offset
    );
    for note in &notes {
        text.push_str(&format!(
            "\n- {} ({}){}",
            note.title,
            note.uid,
            note.category
                .as_deref()
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default(),
        ));
    }

    let metadata = json!({
        "notes": notes,
        "totalCount": total_count,
        "limit": params.limit,
        "offset": params.offset,
    });

    Ok(ToolOutput::new(text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, Category, FrontMatter, Note};

    #[test]
    fn limit_bounds_are_validated() {
        let raw = json!({"limit": 0});
        let p: Params = serde_json::from_value(raw).unwrap();
        assert!(p.validate().is_err());

        let p: Params = serde_json::from_value(json!({"limit": 1001})).unwrap();
        assert!(p.validate().is_err());

        let p: Params = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.limit, 100);
        assert!(p.validate().is_ok());
    }

    #[tokio::test]
    async fn filters_by_category() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        for (title, category) in [
            ("In Projects", Some(Category::Projects)),
            ("In Resources", Some(Category::Resources)),
            ("Uncategorized", None),
        ] {
            let mut note = Note::new(FrontMatter::new(mint_uid(), title.into()), "x".into());
            note.front.category = category;
            ctx.store.save(&mut note).await.unwrap();
        }

        let params: Params = serde_json::from_value(json!({"category": "Projects"})).unwrap();
        let output = execute(&ctx, params).await.unwrap();

        assert_eq!(output.metadata["totalCount"], 1);
        assert_eq!(output.metadata["notes"][0]["title"], "In Projects");
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn paginates_with_total_count() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        for i in 0..5 {
            let mut note = Note::new(
                FrontMatter::new(mint_uid(), format!("Note {i}")),
                "x".into(),
            );
            ctx.store.save(&mut note).await.unwrap();
        }

        let params: Params = serde_json::from_value(
            json!({"limit": 2, "offset": 2, "sortBy": "title", "sortOrder": "asc"}),
        )
        .unwrap();
        let output = execute(&ctx, params).await.unwrap();

        assert_eq!(output.metadata["totalCount"], 5);
        assert_eq!(output.metadata["notes"][0]["title"], "Note 2");
        assert_eq!(output.metadata["notes"][1]["title"], "Note 3");
        ctx.cleanup().await;
    }
}

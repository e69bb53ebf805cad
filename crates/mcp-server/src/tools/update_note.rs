//! update_note - partial mutation of an existing note.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use vault_notes::FrontMatterUpdate;

use super::{parse_category, require_uid_shape, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::{Result, ServerError};
use crate::recovery::RecoveryOperation;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// UID of the note to update
    pub uid: String,
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New Markdown body (replaces the whole body)
    #[serde(default)]
    pub content: Option<String>,
    /// New PARA category
    #[serde(default)]
    pub category: Option<String>,
    /// New tag list (replaces the current tags)
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// New project
    #[serde(default)]
    pub project: Option<String>,
    /// New front matter link list (replaces the current links)
    #[serde(default)]
    pub links: Option<Vec<String>>,
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.title.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.project.is_none()
            && self.links.is_none()
        {
            return Err("at least one field to update is required".into());
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err("title must not be empty".into());
        }
        if let Some(category) = &self.category {
            parse_category(category)?;
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    require_uid_shape(&params.uid)?;

    let (path, _) = ctx
        .store
        .find_by_uid(&params.uid)
        .await?
        .ok_or_else(|| ServerError::resource_not_found(&params.uid))?;

    // Strict reload so a targeted mutation of a malformed note fails
    // loudly instead of rewriting it with defaults.
    let mut note = ctx.store.load(&path).await?;

    let update = FrontMatterUpdate {
        title: params.title,
        category: params
            .category
            .as_deref()
            .and_then(|raw| parse_category(raw).ok()),
        tags: params.tags,
        project: params.project,
        links: params.links,
    };
    let mut changed: Vec<&str> = note.front.apply_update(update);
    if let Some(content) = params.content {
        if content != note.body {
            note.body = content;
            changed.push("content");
        }
    }

    // The file keeps its path: the UID at the tail is the identity,
    // the slug is cosmetic.
    ctx.store.save_at(&mut note, &path).await?;
    let warning = ctx
        .index_upsert_or_enqueue(RecoveryOperation::Update, &note, &path)
        .await;

    let text = if changed.is_empty() {
        format!(
            "No field changes for: {} (timestamp refreshed)",
            note.front.title
        )
    } else {
        format!(
            "Updated note: {}\n\n**Changed:** {}\n**Updated:** {}",
            note.front.title,
            changed.join(", "),
            note.front.updated.to_rfc3339(),
        )
    };

    let metadata = json!({
        "uid": note.front.id,
        "title": note.front.title,
        "changedFields": changed,
        "updated": note.front.updated.to_rfc3339(),
    });

    Ok(ToolOutput::new(text, metadata).warn(warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorCode;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, Category, FrontMatter, Note};

    fn empty_params(uid: &str) -> Params {
        Params {
            uid: uid.into(),
            title: None,
            content: None,
            category: None,
            tags: None,
            project: None,
            links: None,
        }
    }

    #[test]
    fn at_least_one_field_is_required() {
        assert!(empty_params("x").validate().is_err());
        let mut p = empty_params("x");
        p.content = Some("new".into());
        assert!(p.validate().is_ok());
    }

    #[tokio::test]
    async fn updates_body_and_refreshes_timestamp() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut note = Note::new(FrontMatter::new(mint_uid(), "Subject".into()), "v1".into());
        let path = ctx.store.save(&mut note).await.unwrap();
        let before = note.front.updated;

        let mut p = empty_params(&note.front.id);
        p.content = Some("v2".into());
        let output = execute(&ctx, p).await.unwrap();

        assert_eq!(output.metadata["changedFields"][0], "content");
        let reloaded = ctx.store.load(&path).await.unwrap();
        assert_eq!(reloaded.body, "v2");
        assert!(reloaded.front.updated > before);
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn category_change_is_reported() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut note = Note::new(FrontMatter::new(mint_uid(), "Move Me".into()), "b".into());
        note.front.category = Some(Category::Projects);
        let path = ctx.store.save(&mut note).await.unwrap();

        let mut p = empty_params(&note.front.id);
        p.category = Some("Archives".into());
        let output = execute(&ctx, p).await.unwrap();

        assert_eq!(output.metadata["changedFields"][0], "category");
        let reloaded = ctx.store.load(&path).await.unwrap();
        assert_eq!(reloaded.front.category, Some(Category::Archives));
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn unknown_uid_is_resource_not_found() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut p = empty_params(&mint_uid());
        p.content = Some("x".into());
        let err = execute(&ctx, p).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
        ctx.cleanup().await;
    }
}

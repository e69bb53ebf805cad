//! create_note - mint a UID and write a new note.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use vault_notes::{mint_uid, FrontMatter, Note};

use super::{parse_category, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::Result;
use crate::recovery::RecoveryOperation;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Title of the new note
    pub title: String,
    /// Markdown body of the note
    pub content: String,
    /// PARA category: Projects, Areas, Resources, or Archives
    #[serde(default)]
    pub category: Option<String>,
    /// Tags to attach to the note
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Project this note belongs to
    #[serde(default)]
    pub project: Option<String>,
    /// UIDs of notes to link from the front matter
    #[serde(default)]
    pub links: Option<Vec<String>>,
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        if let Some(category) = &self.category {
            parse_category(category)?;
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    // The one and only UID mint for this note: the filename and the
    // front matter id both derive from it.
    let uid = mint_uid();

    let mut front = FrontMatter::new(uid.clone(), params.title.clone());
    if let Some(category) = &params.category {
        // Validated at the schema layer; re-parse to get the enum
        front.category = parse_category(category).ok();
    }
    front.tags = params.tags.unwrap_or_default();
    front.project = params.project;
    front.links = params.links.unwrap_or_default();

    let mut note = Note::new(front, params.content);
    let path = ctx.store.save(&mut note).await?;
    let warning = ctx
        .index_upsert_or_enqueue(RecoveryOperation::Index, &note, &path)
        .await;

    let rel_path = ctx.store.rel_path(&path);
    let text = format!(
        "Created note: {}\n\n**UID:** {}\n**File:** {}\n**Category:** {}\n**Tags:** {}",
        note.front.title,
        uid,
        rel_path,
        note.front
            .category
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| "none".into()),
        if note.front.tags.is_empty() {
            "none".to_string()
        } else {
            note.front.tags.join(", ")
        },
    );

    let metadata = json!({
        "uid": uid,
        "title": note.front.title,
        "filePath": rel_path,
        "category": note.front.category.map(|c| c.as_str()),
        "tags": note.front.tags,
        "project": note.front.project,
        "links": note.front.links,
        "created": note.front.created.to_rfc3339(),
        "updated": note.front.updated.to_rfc3339(),
    });

    Ok(ToolOutput::new(text, metadata).warn(warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn params(title: &str) -> Params {
        Params {
            title: title.into(),
            content: "body".into(),
            category: None,
            tags: None,
            project: None,
            links: None,
        }
    }

    #[test]
    fn empty_title_fails_validation() {
        assert!(params("  ").validate().is_err());
        assert!(params("ok").validate().is_ok());
    }

    #[test]
    fn unknown_category_fails_validation() {
        let mut p = params("ok");
        p.category = Some("Inbox".into());
        assert!(p.validate().is_err());
        p.category = Some("Resources".into());
        assert!(p.validate().is_ok());
    }

    #[tokio::test]
    async fn creates_file_with_matching_uid_in_name_and_front_matter() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut p = params("My First Note");
        p.category = Some("Resources".into());
        p.tags = Some(vec!["alpha".into()]);
        let output = execute(&ctx, p).await.unwrap();

        let uid = output.metadata["uid"].as_str().unwrap().to_string();
        let file_path = output.metadata["filePath"].as_str().unwrap();
        assert!(file_path.contains(&uid), "filename should embed the uid");

        let loaded = ctx
            .store
            .load(&temp.path().join(file_path))
            .await
            .unwrap();
        assert_eq!(loaded.front.id, uid);
        assert_eq!(loaded.front.title, "My First Note");
        assert_eq!(loaded.body, "body");

        // The index row landed synchronously (no warning)
        assert!(output.warning.is_none());
        let index = ctx.index().await.unwrap();
        assert!(index.get_note(&uid).await.unwrap().is_some());

        ctx.cleanup().await;
    }
}

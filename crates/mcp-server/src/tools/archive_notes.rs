//! archive_notes - bulk recategorization into Archives.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use vault_notes::Category;

use super::{ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::Result;
use crate::recovery::RecoveryOperation;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// UIDs of the notes to archive
    pub uids: Vec<String>,
    /// Report what would change without touching any file
    #[serde(default)]
    pub dry_run: bool,
    /// Must be literally true when dryRun is false
    #[serde(default)]
    pub confirm: bool,
    /// Free-form reason recorded in the result
    #[serde(default)]
    pub reason: Option<String>,
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.uids.is_empty() {
            return Err("uids must not be empty".into());
        }
        if !self.dry_run && !self.confirm {
            return Err("confirm must be true when dryRun is false".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Success,
    Skipped,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
    pub uid: String,
    pub status: ArchiveStatus,
    pub detail: String,
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    let mut outcomes = Vec::with_capacity(params.uids.len());
    let mut warnings: Vec<String> = Vec::new();

    for uid in &params.uids {
        let Some((path, mut note)) = ctx.store.find_by_uid(uid).await? else {
            outcomes.push(ArchiveOutcome {
                uid: uid.clone(),
                status: ArchiveStatus::NotFound,
                detail: "no note with this uid".into(),
            });
            continue;
        };

        if note.front.category == Some(Category::Archives) {
            outcomes.push(ArchiveOutcome {
                uid: uid.clone(),
                status: ArchiveStatus::Skipped,
                detail: "already archived".into(),
            });
            continue;
        }

        if params.dry_run {
            outcomes.push(ArchiveOutcome {
                uid: uid.clone(),
                status: ArchiveStatus::Success,
                detail: format!(
                    "would move from {} to Archives",
                    note.front
                        .category
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_else(|| "Uncategorized".into())
                ),
            });
            continue;
        }

        note.front.category = Some(Category::Archives);
        ctx.store.save_at(&mut note, &path).await?;
        if let Some(warning) = ctx
            .index_upsert_or_enqueue(RecoveryOperation::Update, &note, &path)
            .await
        {
            warnings.push(warning);
        }
        outcomes.push(ArchiveOutcome {
            uid: uid.clone(),
            status: ArchiveStatus::Success,
            detail: "archived".into(),
        });
    }

    let archived = outcomes
        .iter()
        .filter(|o| o.status == ArchiveStatus::Success)
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| o.status == ArchiveStatus::Skipped)
        .count();
    let missing = outcomes
        .iter()
        .filter(|o| o.status == ArchiveStatus::NotFound)
        .count();

    let mut text = format!(
        "{}{} archived, {} skipped, {} not found.\n",
        if params.dry_run { "[dry run] " } else { "" },
        archived,
        skipped,
        missing
    );
    for outcome in &outcomes {
        text.push_str(&format!(
            "\n- {}: {} ({})",
            outcome.uid,
            match outcome.status {
                ArchiveStatus::Success => "success",
                ArchiveStatus::Skipped => "skipped",
                ArchiveStatus::NotFound => "not_found",
            },
            outcome.detail
        ));
    }

    let metadata = json!({
        "dryRun": params.dry_run,
        "reason": params.reason,
        "results": outcomes,
        "archivedCount": archived,
        "skippedCount": skipped,
        "notFoundCount": missing,
    });

    warnings.dedup();
    Ok(ToolOutput::new(text, metadata).warn(warnings.into_iter().next()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, FrontMatter, Note};

    fn params(uids: Vec<String>, dry_run: bool) -> Params {
        Params {
            uids,
            dry_run,
            confirm: !dry_run,
            reason: None,
        }
    }

    #[test]
    fn confirm_gate_applies_only_to_wet_runs() {
        let mut p = params(vec!["u".into()], false);
        p.confirm = false;
        assert!(p.validate().is_err());

        let mut p = params(vec!["u".into()], true);
        p.confirm = false;
        assert!(p.validate().is_ok());

        assert!(params(vec![], true).validate().is_err());
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut note = Note::new(FrontMatter::new(mint_uid(), "Keep".into()), "b".into());
        note.front.category = Some(Category::Resources);
        let path = ctx.store.save(&mut note).await.unwrap();

        let output = execute(&ctx, params(vec![note.front.id.clone()], true))
            .await
            .unwrap();

        assert_eq!(output.metadata["archivedCount"], 1);
        let reloaded = ctx.store.load(&path).await.unwrap();
        assert_eq!(reloaded.front.category, Some(Category::Resources));
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn wet_run_flips_category_and_reports_per_uid() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut active = Note::new(FrontMatter::new(mint_uid(), "Active".into()), "b".into());
        active.front.category = Some(Category::Projects);
        let path = ctx.store.save(&mut active).await.unwrap();

        let mut archived = Note::new(FrontMatter::new(mint_uid(), "Done".into()), "b".into());
        archived.front.category = Some(Category::Archives);
        ctx.store.save(&mut archived).await.unwrap();

        let ghost = mint_uid();
        let output = execute(
            &ctx,
            params(
                vec![active.front.id.clone(), archived.front.id.clone(), ghost],
                false,
            ),
        )
        .await
        .unwrap();

        assert_eq!(output.metadata["archivedCount"], 1);
        assert_eq!(output.metadata["skippedCount"], 1);
        assert_eq!(output.metadata["notFoundCount"], 1);

        let reloaded = ctx.store.load(&path).await.unwrap();
        assert_eq!(reloaded.front.category, Some(Category::Archives));
        ctx.cleanup().await;
    }
}

//! suggest_links - rank candidate notes worth linking to a target.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{require_uid_shape, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::{Result, ServerError};
use crate::links::{self, SuggestionWeights};
use crate::store::DEFAULT_SCAN_CONCURRENCY;

const MAX_LIMIT: usize = 50;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// UID of the note to suggest links for
    pub uid: String,
    /// How many candidates to return
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum composite score to keep a candidate
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Drop candidates already linked to or from the target
    #[serde(default = "default_true")]
    pub exclude_existing: bool,
}

fn default_limit() -> usize {
    5
}

fn default_min_score() -> f64 {
    0.3
}

fn default_true() -> bool {
    true
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(format!("limit must be between 1 and {MAX_LIMIT}"));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err("minScore must be between 0 and 1".into());
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    require_uid_shape(&params.uid)?;

    // The link graph in the index knows what is already connected in
    // either direction
    let mut exclude: std::collections::HashSet<String> = std::collections::HashSet::new();
    if params.exclude_existing {
        let index = ctx.index().await?;
        exclude = index
            .get_connected_nodes(&params.uid)
            .await?
            .into_iter()
            .collect();
    }

    let corpus = ctx.store.load_all(true, DEFAULT_SCAN_CONCURRENCY).await?;
    let suggestions = links::suggest_links(
        &corpus,
        &params.uid,
        SuggestionWeights::default(),
        params.min_score,
        &exclude,
        params.limit,
    )
    .ok_or_else(|| ServerError::resource_not_found(&params.uid))?;

    let mut text = format!(
        "{} link candidate(s) for {} (min score {:.2}).\n",
        suggestions.len(),
        params.uid,
        params.min_score
    );
    for suggestion in &suggestions {
        text.push_str(&format!(
            "\n- {} ({}) score {:.2} [tags {:.2}, category {:.1}, project {:.1}, keywords {:.2}]",
            suggestion.title,
            suggestion.uid,
            suggestion.score,
            suggestion.tag_score,
            suggestion.category_score,
            suggestion.project_score,
            suggestion.keyword_score,
        ));
    }

    let metadata = json!({
        "uid": params.uid,
        "minScore": params.min_score,
        "suggestions": suggestions,
    });

    Ok(ToolOutput::new(text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorCode;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, FrontMatter, Note};

    #[tokio::test]
    async fn ranks_tag_overlap_highest() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut target = Note::new(FrontMatter::new(mint_uid(), "Target".into()), "t".into());
        target.front.tags = vec!["a".into(), "b".into()];
        ctx.store.save(&mut target).await.unwrap();

        let mut strong = Note::new(FrontMatter::new(mint_uid(), "Strong".into()), "s".into());
        strong.front.tags = vec!["a".into(), "b".into()];
        ctx.store.save(&mut strong).await.unwrap();

        let mut weak = Note::new(FrontMatter::new(mint_uid(), "Weak".into()), "w".into());
        weak.front.tags = vec!["a".into()];
        ctx.store.save(&mut weak).await.unwrap();

        let mut unrelated = Note::new(FrontMatter::new(mint_uid(), "Unrelated".into()), "u".into());
        ctx.store.save(&mut unrelated).await.unwrap();

        let output = execute(
            &ctx,
            Params {
                uid: target.front.id.clone(),
                limit: 10,
                min_score: 0.0,
                exclude_existing: true,
            },
        )
        .await
        .unwrap();

        let suggestions = output.metadata["suggestions"].as_array().unwrap();
        assert_eq!(suggestions[0]["title"], "Strong");
        assert_eq!(suggestions[1]["title"], "Weak");
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn already_linked_candidates_are_excluded() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let mut linked = Note::new(FrontMatter::new(mint_uid(), "Linked".into()), "l".into());
        linked.front.tags = vec!["a".into()];
        ctx.store.save(&mut linked).await.unwrap();

        let mut target = Note::new(FrontMatter::new(mint_uid(), "Target".into()), "t".into());
        target.front.tags = vec!["a".into()];
        target.front.links = vec![linked.front.id.clone()];
        ctx.store.save(&mut target).await.unwrap();

        let output = execute(
            &ctx,
            Params {
                uid: target.front.id.clone(),
                limit: 10,
                min_score: 0.0,
                exclude_existing: true,
            },
        )
        .await
        .unwrap();
        assert!(output.metadata["suggestions"].as_array().unwrap().is_empty());

        let output = execute(
            &ctx,
            Params {
                uid: target.front.id.clone(),
                limit: 10,
                min_score: 0.0,
                exclude_existing: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(output.metadata["suggestions"].as_array().unwrap().len(), 1);
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn unknown_target_is_resource_not_found() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let err = execute(
            &ctx,
            Params {
                uid: mint_uid(),
                limit: 5,
                min_score: 0.3,
                exclude_existing: true,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
        ctx.cleanup().await;
    }
}

//! get_backlinks - notes referring to a target, with previews.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{require_uid_shape, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::{Result, ServerError};
use crate::store::{context_snippets, Backlink, DEFAULT_CONTEXT_LINES};

const MAX_LIMIT: usize = 100;
const MAX_CONTEXT_LINES: usize = 10;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// UID of the note whose inbound links to collect
    pub uid: String,
    /// Result cap, at most 100
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Lines of context above and below each matching line
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

fn default_limit() -> usize {
    20
}

fn default_context_lines() -> usize {
    DEFAULT_CONTEXT_LINES
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(format!("limit must be between 1 and {MAX_LIMIT}"));
        }
        if self.context_lines > MAX_CONTEXT_LINES {
            return Err(format!("contextLines must be at most {MAX_CONTEXT_LINES}"));
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    require_uid_shape(&params.uid)?;

    // The disk decides whether the target exists at all
    let (_, target) = ctx
        .store
        .find_by_uid(&params.uid)
        .await?
        .ok_or_else(|| ServerError::resource_not_found(&params.uid))?;

    // The link graph comes from the index; sources whose files have
    // vanished since their last indexing are silently dropped
    let index = ctx.index().await?;
    let rows = index.get_backlinks(&params.uid).await?;
    let total = rows.len();

    let mut backlinks: Vec<Backlink> = Vec::new();
    for row in rows.into_iter().take(params.limit) {
        let Some(source) = index.get_note(&row.source_uid).await? else {
            continue;
        };
        let path = ctx.store.vault_path().join(&source.file_path);
        let note = match ctx.store.load_lenient(&path).await {
            Ok(note) if note.front.id == row.source_uid => note,
            _ => continue,
        };
        backlinks.push(Backlink {
            source_uid: note.front.id.clone(),
            source_title: note.front.title.clone(),
            source_path: path,
            contexts: context_snippets(&note.body, &params.uid, params.context_lines),
        });
    }

    let mut text = format!(
        "{total} note(s) link to {} ({}).\n",
        target.front.title, params.uid
    );
    for backlink in &backlinks {
        text.push_str(&format!(
            "\n**{}** ({})",
            backlink.source_title, backlink.source_uid
        ));
        for context in &backlink.contexts {
            text.push_str(&format!(
                "\n  line {} [{}]:\n  {}",
                context.line,
                context.kind.as_str(),
                context.snippet.replace('\n', "\n  "),
            ));
        }
        text.push('\n');
    }

    let metadata = json!({
        "uid": params.uid,
        "title": target.front.title,
        "totalCount": total,
        "backlinks": backlinks,
    });

    Ok(ToolOutput::new(text, metadata))
}

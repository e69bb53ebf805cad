//! read_note - load one note by UID.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::{require_uid_shape, ToolOutput, ValidateParams};
use crate::context::ServerContext;
use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// UID of the note to read
    pub uid: String,
    /// Include the full front matter in the result metadata
    #[serde(default)]
    pub include_metadata: bool,
    /// Include outbound/inbound/broken link analysis
    #[serde(default)]
    pub include_links: bool,
}

impl ValidateParams for Params {}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    require_uid_shape(&params.uid)?;

    let (path, _) = ctx
        .store
        .find_by_uid(&params.uid)
        .await?
        .ok_or_else(|| ServerError::resource_not_found(&params.uid))?;

    // Targeted read: malformed front matter surfaces instead of being
    // papered over with defaults.
    let note = ctx.store.load(&path).await?;

    let mut metadata = json!({
        "uid": note.front.id,
        "title": note.front.title,
        "filePath": ctx.store.rel_path(&path),
        "body": note.body,
    });

    if params.include_metadata {
        metadata["frontMatter"] = json!({
            "id": note.front.id,
            "title": note.front.title,
            "category": note.front.category.map(|c| c.as_str()),
            "tags": note.front.tags,
            "project": note.front.project,
            "created": note.front.created.to_rfc3339(),
            "updated": note.front.updated.to_rfc3339(),
            "links": note.front.links,
        });
    }

    if params.include_links {
        // Outbound and inbound edges come from the index; a broken
        // link is an outbound target with no note row behind it
        let index = ctx.index().await?;
        let outbound: Vec<String> = index
            .get_outgoing_links(&params.uid)
            .await?
            .into_iter()
            .map(|row| row.target_uid)
            .collect();
        let inbound: Vec<String> = index
            .get_backlinks(&params.uid)
            .await?
            .into_iter()
            .map(|row| row.source_uid)
            .collect();
        let mut broken = Vec::new();
        for target in &outbound {
            if index.get_note(target).await?.is_none() {
                broken.push(target.clone());
            }
        }

        metadata["links"] = json!({
            "outbound": outbound,
            "inbound": inbound,
            "broken": broken,
        });
    }

    // The text payload is the note body itself
    Ok(ToolOutput::new(note.body.clone(), metadata))
}

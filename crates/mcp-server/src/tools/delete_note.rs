//! delete_note - remove a note, gated on an explicit confirmation.

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
    /// UID of the note to delete
    pub uid: String,
    /// Must be literally true; deletion is permanent
    #[serde(default)]
    pub confirm: bool,
}

impl ValidateParams for Params {
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.confirm {
            return Err("confirm must be true to delete a note".into());
        }
        Ok(())
    }
}

pub async fn execute(ctx: &Arc<ServerContext>, params: Params) -> Result<ToolOutput> {
    require_uid_shape(&params.uid)?;

    let (path, note) = ctx
        .store
        .find_by_uid(&params.uid)
        .await?
        .ok_or_else(|| ServerError::resource_not_found(&params.uid))?;

    ctx.store.delete(&path).await?;
    let warning = ctx.index_remove_or_enqueue(&params.uid).await;

    let rel_path = ctx.store.rel_path(&path);
    let text = format!(
        "Deleted note: {}\n\n**UID:** {}\n**File:** {}",
        note.front.title, note.front.id, rel_path,
    );

    let metadata = json!({
        "uid": note.front.id,
        "title": note.front.title,
        "filePath": rel_path,
        "category": note.front.category.map(|c| c.as_str()),
    });

    Ok(ToolOutput::new(text, metadata).warn(warning))
}

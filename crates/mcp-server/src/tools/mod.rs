//! Tool handlers.
//!
//! One module per tool. Each defines a `Params` struct (serde +
//! schemars, camelCase on the wire) and an `execute` function taking
//! the shared [`ServerContext`]. Handlers return a [`ToolOutput`];
//! the dispatcher turns it into the MCP result.

pub mod archive_notes;
pub mod create_note;
pub mod delete_note;
pub mod find_orphan_notes;
pub mod find_stale_notes;
pub mod get_backlinks;
pub mod get_metrics;
pub mod get_organization_health;
pub mod get_vault_stats;
pub mod list_notes;
pub mod read_note;
pub mod search_memory;
pub mod suggest_links;
pub mod update_note;

use serde_json::Value;
use vault_notes::Category;

use crate::error::{ErrorCode, ServerError};

/// What a tool handler produces: the human-facing text, the
/// machine-readable metadata payload, and an optional warning (set
/// when an index mutation was deferred to the recovery queue).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub metadata: Value,
    pub warning: Option<String>,
}

impl ToolOutput {
    pub fn new(text: impl Into<String>, metadata: Value) -> Self {
        Self {
            text: text.into(),
            metadata,
            warning: None,
        }
    }

    pub fn warn(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }
}

/// Structural checks beyond what serde enforces. A failure becomes a
/// `SCHEMA_VALIDATION_ERROR` at the dispatcher boundary.
pub trait ValidateParams {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Parse a category argument, rejecting anything outside PARA.
pub(crate) fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| {
        format!("unknown category `{raw}` (expected Projects, Areas, Resources, or Archives)")
    })
}

/// Reject a malformed UID before any disk work happens.
pub(crate) fn require_uid_shape(uid: &str) -> Result<(), ServerError> {
    if vault_notes::is_valid_uid(uid) {
        Ok(())
    } else {
        Err(ServerError::new(
            ErrorCode::InvalidUid,
            format!("not a note uid: {uid}"),
        ))
    }
}

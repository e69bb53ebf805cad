//! Tool registry and dispatcher.
//!
//! The catalog is static: name, description, and the input schema
//! rendered as draft-07 JSON Schema with subschemas inlined. Execution
//! runs every call through the same pipeline: argument normalization
//! (the Claude compatibility shim), schema validation, policy merge,
//! logging, metrics, and error translation.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rmcp::model::{CallToolResult, Content, ErrorData, JsonObject, Tool};
use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::ServerContext;
use crate::error::{Result, ServerError};
use crate::policy::{ExecutionPolicy, PolicyOverride};
use crate::tools::{self, ToolOutput, ValidateParams};

/// One catalog entry.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    schema: fn() -> JsonObject,
}

/// The fixed tool catalog.
pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "create_note",
        description: "Create a new note with a minted UID, optional PARA category, tags, project, and links.",
        schema: schema_object::<tools::create_note::Params>,
    },
    ToolSpec {
        name: "read_note",
        description: "Read a note by UID. Optionally include the full front matter and a link analysis.",
        schema: schema_object::<tools::read_note::Params>,
    },
    ToolSpec {
        name: "update_note",
        description: "Partially update a note: title, content, category, tags, project, or links. At least one field is required.",
        schema: schema_object::<tools::update_note::Params>,
    },
    ToolSpec {
        name: "delete_note",
        description: "Permanently delete a note by UID. Requires confirm=true.",
        schema: schema_object::<tools::delete_note::Params>,
    },
    ToolSpec {
        name: "list_notes",
        description: "List notes filtered by category, tags, or project, with pagination and sorting.",
        schema: schema_object::<tools::list_notes::Params>,
    },
    ToolSpec {
        name: "search_memory",
        description: "Full-text search over notes with BM25 ranking, snippets, and optional category/tag filters.",
        schema: schema_object::<tools::search_memory::Params>,
    },
    ToolSpec {
        name: "get_vault_stats",
        description: "Vault roll-up: note and word counts, category and tag histograms, link totals.",
        schema: schema_object::<tools::get_vault_stats::Params>,
    },
    ToolSpec {
        name: "get_backlinks",
        description: "List notes linking to a target note, with context previews around each reference.",
        schema: schema_object::<tools::get_backlinks::Params>,
    },
    ToolSpec {
        name: "get_metrics",
        description: "Server metrics as JSON or Prometheus text; optionally reset after reading.",
        schema: schema_object::<tools::get_metrics::Params>,
    },
    ToolSpec {
        name: "find_orphan_notes",
        description: "Find notes that no other note links to and that link to nothing.",
        schema: schema_object::<tools::find_orphan_notes::Params>,
    },
    ToolSpec {
        name: "find_stale_notes",
        description: "Find notes not updated for a given number of days, excluding Archives by default.",
        schema: schema_object::<tools::find_stale_notes::Params>,
    },
    ToolSpec {
        name: "get_organization_health",
        description: "Composite 0-100 organization health score with grade and recommendations.",
        schema: schema_object::<tools::get_organization_health::Params>,
    },
    ToolSpec {
        name: "archive_notes",
        description: "Bulk-move notes to the Archives category. Supports dryRun; requires confirm for real runs.",
        schema: schema_object::<tools::archive_notes::Params>,
    },
    ToolSpec {
        name: "suggest_links",
        description: "Suggest notes worth linking to a target, scored by tag, category, project, and keyword overlap.",
        schema: schema_object::<tools::suggest_links::Params>,
    },
];

/// The catalog as MCP tool descriptors.
pub fn catalog() -> Vec<Tool> {
    TOOLS
        .iter()
        .map(|spec| Tool::new(spec.name, spec.description, Arc::new((spec.schema)())))
        .collect()
}

/// Execute a tool under the context's default policy.
pub async fn execute_tool(
    ctx: &Arc<ServerContext>,
    name: &str,
    arguments: JsonObject,
) -> std::result::Result<CallToolResult, ErrorData> {
    execute_tool_with(ctx, name, arguments, PolicyOverride::default()).await
}

/// Execute a tool with per-call policy overrides layered over the
/// context policy.
pub async fn execute_tool_with(
    ctx: &Arc<ServerContext>,
    name: &str,
    mut arguments: JsonObject,
    overrides: PolicyOverride,
) -> std::result::Result<CallToolResult, ErrorData> {
    if !TOOLS.iter().any(|spec| spec.name == name) {
        return Err(ServerError::invalid_request(format!("unknown tool: {name}")).to_error_data());
    }

    apply_claude_shim(&mut arguments);
    tracing::debug!(tool = name, input = %masked_preview(&arguments), "tool.start");

    let policy = ctx.policy.merged(&overrides);
    let started = Instant::now();
    let outcome = dispatch(ctx, &policy, name, arguments).await;
    let duration = started.elapsed();

    match outcome {
        Ok(output) => {
            ctx.metrics.record_tool(name, duration, true, None);
            tracing::debug!(tool = name, ms = duration.as_millis() as u64, "tool.success");
            Ok(render(output))
        }
        Err(err) => {
            ctx.metrics
                .record_tool(name, duration, false, Some(err.code.as_str()));
            tracing::warn!(tool = name, code = err.code.as_str(), %err, "tool.failure");
            Err(err.to_error_data())
        }
    }
}

async fn dispatch(
    ctx: &Arc<ServerContext>,
    policy: &ExecutionPolicy,
    name: &str,
    args: JsonObject,
) -> Result<ToolOutput> {
    match name {
        "create_note" => run_tool(policy, name, args, |p| tools::create_note::execute(ctx, p)).await,
        "read_note" => run_tool(policy, name, args, |p| tools::read_note::execute(ctx, p)).await,
        "update_note" => run_tool(policy, name, args, |p| tools::update_note::execute(ctx, p)).await,
        "delete_note" => run_tool(policy, name, args, |p| tools::delete_note::execute(ctx, p)).await,
        "list_notes" => run_tool(policy, name, args, |p| tools::list_notes::execute(ctx, p)).await,
        "search_memory" => {
            run_tool(policy, name, args, |p| tools::search_memory::execute(ctx, p)).await
        }
        "get_vault_stats" => {
            run_tool(policy, name, args, |p| tools::get_vault_stats::execute(ctx, p)).await
        }
        "get_backlinks" => {
            run_tool(policy, name, args, |p| tools::get_backlinks::execute(ctx, p)).await
        }
        "get_metrics" => run_tool(policy, name, args, |p| tools::get_metrics::execute(ctx, p)).await,
        "find_orphan_notes" => {
            run_tool(policy, name, args, |p| tools::find_orphan_notes::execute(ctx, p)).await
        }
        "find_stale_notes" => {
            run_tool(policy, name, args, |p| tools::find_stale_notes::execute(ctx, p)).await
        }
        "get_organization_health" => {
            run_tool(policy, name, args, |p| {
                tools::get_organization_health::execute(ctx, p)
            })
            .await
        }
        "archive_notes" => {
            run_tool(policy, name, args, |p| tools::archive_notes::execute(ctx, p)).await
        }
        "suggest_links" => {
            run_tool(policy, name, args, |p| tools::suggest_links::execute(ctx, p)).await
        }
        _ => Err(ServerError::invalid_request(format!("unknown tool: {name}"))),
    }
}

/// Validate the raw arguments into a typed record, then run the
/// handler under the execution policy.
async fn run_tool<P, F, Fut>(
    policy: &ExecutionPolicy,
    name: &str,
    args: JsonObject,
    handler: F,
) -> Result<ToolOutput>
where
    P: DeserializeOwned + ValidateParams + Clone,
    F: Fn(P) -> Fut,
    Fut: Future<Output = Result<ToolOutput>>,
{
    let params: P = serde_json::from_value(Value::Object(args))
        .map_err(|err| ServerError::schema_validation(name, err.to_string()))?;
    params
        .validate()
        .map_err(|detail| ServerError::schema_validation(name, detail))?;

    policy
        .run(
            || handler(params.clone()),
            |attempt, err| tracing::warn!(tool = name, attempt, %err, "tool retry"),
        )
        .await
}

fn render(output: ToolOutput) -> CallToolResult {
    let mut text = output.text;
    if let Some(warning) = &output.warning {
        text.push_str("\n\n⚠ ");
        text.push_str(warning);
    }
    let metadata =
        serde_json::to_string_pretty(&output.metadata).unwrap_or_else(|_| "{}".to_string());
    CallToolResult::success(vec![Content::text(text), Content::text(metadata)])
}

/// Draft-07 JSON Schema for a params type, subschemas inlined, with a
/// top-level `"type": "object"` always present.
fn schema_object<P: JsonSchema>() -> JsonObject {
    let generator = SchemaSettings::draft07()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator();
    let schema = generator.into_root_schema_for::<P>();
    let mut object = match serde_json::to_value(schema) {
        Ok(Value::Object(map)) => map,
        _ => JsonObject::new(),
    };
    object
        .entry("type")
        .or_insert_with(|| Value::String("object".into()));
    object
}

/// Claude compatibility shim: `tags` and `links` sometimes arrive as a
/// JSON-encoded string instead of an array. Parse and substitute when
/// that yields an array; anything else is left for validation to
/// reject. Applied once, before schema validation.
fn apply_claude_shim(arguments: &mut JsonObject) {
    for key in ["tags", "links", "uids"] {
        let Some(Value::String(raw)) = arguments.get(key) else {
            continue;
        };
        if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
            arguments.insert(key.to_string(), parsed);
        }
    }
}

/// Input preview for logs: sensitive-looking values masked, truncated
/// to 200 characters.
fn masked_preview(arguments: &JsonObject) -> String {
    let mut masked = arguments.clone();
    for (key, value) in masked.iter_mut() {
        let lowered = key.to_lowercase();
        if ["token", "secret", "password", "apikey", "api_key"]
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            *value = Value::String("***".into());
        }
    }

    let mut preview = serde_json::to_string(&Value::Object(masked)).unwrap_or_default();
    if preview.len() > 200 {
        let mut end = 200;
        while !preview.is_char_boundary(end) {
            end -= 1;
        }
        preview.truncate(end);
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use tempfile::TempDir;

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap_or_default()
    }

    fn text_of(result: &CallToolResult) -> String {
        result.content[0]
            .raw
            .as_text()
            .expect("expected text content")
            .text
            .clone()
    }

    fn metadata_of(result: &CallToolResult) -> Value {
        let raw = &result.content[1].raw.as_text().expect("expected metadata").text;
        serde_json::from_str(raw).expect("metadata should be JSON")
    }

    #[test]
    fn catalog_lists_all_fourteen_tools() {
        let tools = catalog();
        assert_eq!(tools.len(), 14);

        let names: Vec<&str> = TOOLS.iter().map(|t| t.name).collect();
        assert!(names.contains(&"create_note"));
        assert!(names.contains(&"suggest_links"));
    }

    #[test]
    fn schemas_are_inlined_objects() {
        for spec in TOOLS {
            let schema = (spec.schema)();
            assert_eq!(
                schema.get("type"),
                Some(&Value::String("object".into())),
                "{} schema lacks type: object",
                spec.name
            );
            let rendered = serde_json::to_string(&schema).unwrap();
            assert!(
                !rendered.contains("\"$ref\""),
                "{} schema contains $ref",
                spec.name
            );
        }
    }

    #[test]
    fn claude_shim_parses_stringified_arrays() {
        let mut arguments = args(json!({
            "tags": "[\"a\", \"b\"]",
            "links": "not json",
            "title": "[\"untouched\"]",
        }));
        apply_claude_shim(&mut arguments);

        assert_eq!(arguments["tags"], json!(["a", "b"]));
        assert_eq!(arguments["links"], json!("not json"));
        assert_eq!(arguments["title"], json!("[\"untouched\"]"));
    }

    #[test]
    fn preview_is_masked_and_truncated() {
        let arguments = args(json!({
            "apiToken": "super-secret-value",
            "content": "x".repeat(400),
        }));
        let preview = masked_preview(&arguments);

        assert!(preview.contains("***"));
        assert!(!preview.contains("super-secret-value"));
        assert!(preview.chars().count() <= 201);
        assert!(preview.ends_with('…'));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_invalid_request() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let err = execute_tool(&ctx, "no_such_tool", JsonObject::new())
            .await
            .unwrap_err();
        assert_eq!(err.data.unwrap()["code"], "MCP_INVALID_REQUEST");
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn schema_violation_carries_tool_name_and_code() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        // delete_note without confirm=true fails at the schema layer
        let err = execute_tool(
            &ctx,
            "delete_note",
            args(json!({"uid": vault_notes::mint_uid()})),
        )
        .await
        .unwrap_err();

        let data = err.data.unwrap();
        assert_eq!(data["code"], "SCHEMA_VALIDATION_ERROR");
        assert!(data["message"].as_str().unwrap().contains("delete_note"));
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn create_and_read_flow_through_the_dispatcher() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let created = execute_tool(
            &ctx,
            "create_note",
            args(json!({
                "title": "Dispatcher Test",
                "content": "hello from the pipeline",
                "tags": "[\"shimmed\"]",
            })),
        )
        .await
        .unwrap();

        let uid = metadata_of(&created)["uid"].as_str().unwrap().to_string();
        assert!(text_of(&created).contains("Dispatcher Test"));
        // The shim turned the stringified tags into a real array
        assert_eq!(metadata_of(&created)["tags"], json!(["shimmed"]));

        let read = execute_tool(&ctx, "read_note", args(json!({"uid": uid})))
            .await
            .unwrap();
        assert_eq!(text_of(&read), "hello from the pipeline");

        // Both calls produced metrics samples
        let summary = ctx.metrics.summary();
        assert_eq!(summary.tools["create_note"].success_count, 1);
        assert_eq!(summary.tools["read_note"].success_count, 1);
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn failures_are_recorded_with_their_code() {
        let temp = TempDir::new().unwrap();
        let ctx = crate::context::ServerContext::new(Config::for_vault(temp.path().to_path_buf()));

        let _ = execute_tool(
            &ctx,
            "read_note",
            args(json!({"uid": vault_notes::mint_uid()})),
        )
        .await
        .unwrap_err();

        let summary = ctx.metrics.summary();
        assert_eq!(summary.tools["read_note"].failure_count, 1);
        ctx.cleanup().await;
    }
}

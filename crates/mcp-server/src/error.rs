//! Server error type and the error-code taxonomy.

use rmcp::model::ErrorData;
use serde_json::{json, Map, Value};
use vault_notes::NoteError;

/// Stable error codes carried by every [`ServerError`]. The code
/// travels to MCP clients in the error's `data` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FileNotFound,
    FileReadError,
    FileWriteError,
    InvalidFilePath,
    InvalidFrontMatter,
    InvalidUid,
    SchemaValidationError,
    IndexBuildError,
    IndexQueryError,
    IndexCorrupted,
    McpProtocolError,
    McpToolError,
    McpInvalidRequest,
    ResourceNotFound,
    StorageError,
    ConfigError,
    VaultPathError,
    InternalError,
    TimeoutError,
    NetworkError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::FileReadError => "FILE_READ_ERROR",
            ErrorCode::FileWriteError => "FILE_WRITE_ERROR",
            ErrorCode::InvalidFilePath => "INVALID_FILE_PATH",
            ErrorCode::InvalidFrontMatter => "INVALID_FRONT_MATTER",
            ErrorCode::InvalidUid => "INVALID_UID",
            ErrorCode::SchemaValidationError => "SCHEMA_VALIDATION_ERROR",
            ErrorCode::IndexBuildError => "INDEX_BUILD_ERROR",
            ErrorCode::IndexQueryError => "INDEX_QUERY_ERROR",
            ErrorCode::IndexCorrupted => "INDEX_CORRUPTED",
            ErrorCode::McpProtocolError => "MCP_PROTOCOL_ERROR",
            ErrorCode::McpToolError => "MCP_TOOL_ERROR",
            ErrorCode::McpInvalidRequest => "MCP_INVALID_REQUEST",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::VaultPathError => "VAULT_PATH_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type flowing through every fallible server operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServerError {
    pub code: ErrorCode,
    pub message: String,
    pub metadata: Option<Map<String, Value>>,
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TimeoutError, message)
    }

    pub fn resource_not_found(uid: &str) -> Self {
        Self::new(ErrorCode::ResourceNotFound, format!("Note not found: {uid}"))
            .with_metadata("uid", json!(uid))
    }

    pub fn schema_validation(tool: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SchemaValidationError,
            format!("Invalid input for tool {tool}: {}", detail.into()),
        )
        .with_metadata("tool", json!(tool))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::McpInvalidRequest, message)
    }

    /// JSON rendering: name, code, message, and the metadata map.
    pub fn to_json(&self) -> Value {
        json!({
            "name": "ServerError",
            "code": self.code.as_str(),
            "message": self.message,
            "metadata": self.metadata.clone().map(Value::Object).unwrap_or(Value::Null),
        })
    }

    /// Translate into an MCP error. The taxonomy code and metadata
    /// ride in the error's `data` payload.
    pub fn to_error_data(&self) -> ErrorData {
        let data = Some(self.to_json());
        match self.code {
            ErrorCode::SchemaValidationError
            | ErrorCode::McpInvalidRequest
            | ErrorCode::InvalidUid
            | ErrorCode::InvalidFilePath => ErrorData::invalid_params(self.message.clone(), data),
            ErrorCode::ResourceNotFound | ErrorCode::FileNotFound => {
                ErrorData::invalid_params(self.message.clone(), data)
            }
            _ => ErrorData::internal_error(self.message.clone(), data),
        }
    }
}

impl From<NoteError> for ServerError {
    fn from(err: NoteError) -> Self {
        let code = match &err {
            NoteError::InvalidUid { .. } => ErrorCode::InvalidUid,
            _ => ErrorCode::InvalidFrontMatter,
        };
        Self::new(code, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

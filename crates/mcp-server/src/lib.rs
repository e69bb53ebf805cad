//! Zettel Memory MCP server.
//!
//! Exposes a file-backed personal knowledge base over the Model
//! Context Protocol on stdio. Notes live as Markdown files with YAML
//! front matter; a sidecar SQLite FTS5 index accelerates search and
//! link-graph queries. The disk is always the source of truth: index
//! writes that fail behind a successful file write are replayed by the
//! recovery queue.

pub mod analytics;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod links;
pub mod metrics;
pub mod policy;
pub mod recovery;
pub mod registry;
pub mod server;
pub mod store;
pub mod tools;

pub use config::Config;
pub use context::ServerContext;
pub use error::{ErrorCode, ServerError};

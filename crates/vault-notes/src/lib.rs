//! Note data model for the vault.
//!
//! A note is a Markdown file with a YAML front matter block:
//!
//! ```markdown
//! ---
//! id: 20240101T120000123000Z
//! title: My Note
//! tags: [rust]
//! created: 2024-01-01T12:00:00Z
//! updated: 2024-01-01T12:00:00Z
//! ---
//! Note content here...
//! ```
//!
//! This crate owns the pieces that are independent of storage: UID
//! minting and validation, the front matter codec (strict and lenient),
//! and filename sanitization.

pub mod filename;
pub mod frontmatter;
pub mod uid;

pub use filename::{note_file_name, sanitize_title};
pub use frontmatter::{Category, FrontMatter, FrontMatterUpdate, LenientNote, Note, NoteError};
pub use uid::{is_valid_uid, mint_uid};

//! YAML front matter codec.
//!
//! Notes serialize as a `---`-delimited YAML block followed by the
//! body. Parsing comes in two flavors: strict (targeted reads surface
//! every problem) and lenient (bulk scans replace missing or invalid
//! fields with defaults and report warnings instead of failing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::is_valid_uid;

#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("note has no front matter block")]
    MissingFrontMatter,
    #[error("invalid front matter: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("invalid uid: {uid}")]
    InvalidUid { uid: String },
    #[error("invalid front matter field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// PARA category taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Projects,
    Areas,
    Resources,
    Archives,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Projects,
        Category::Areas,
        Category::Resources,
        Category::Archives,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Projects => "Projects",
            Category::Areas => "Areas",
            Category::Resources => "Resources",
            Category::Archives => "Archives",
        }
    }

    pub fn parse(value: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == value)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The front matter of a note.
///
/// Absent optional fields are omitted on serialization; the literal
/// text `undefined` or `null` never appears as a YAML value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl FrontMatter {
    /// Build front matter for a freshly minted note. The UID is taken
    /// as-is and never minted here, so the caller's UID is the only
    /// one in play end-to-end.
    pub fn new(uid: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: uid,
            title,
            category: None,
            tags: Vec::new(),
            project: None,
            created: now,
            updated: now,
            links: Vec::new(),
        }
    }

    /// Drop empty entries and duplicate links, preserving order.
    pub fn normalize(&mut self) {
        self.tags.retain(|t| !t.trim().is_empty());
        let mut seen = std::collections::HashSet::new();
        self.links
            .retain(|l| !l.trim().is_empty() && seen.insert(l.clone()));
    }

    pub fn validate(&self) -> Result<(), NoteError> {
        if !is_valid_uid(&self.id) {
            return Err(NoteError::InvalidUid {
                uid: self.id.clone(),
            });
        }
        if self.title.is_empty() {
            return Err(NoteError::InvalidField {
                field: "title",
                reason: "must not be empty".into(),
            });
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(NoteError::InvalidField {
                field: "tags",
                reason: "entries must be non-empty".into(),
            });
        }
        if matches!(&self.project, Some(p) if p.is_empty()) {
            return Err(NoteError::InvalidField {
                field: "project",
                reason: "must not be empty when present".into(),
            });
        }
        if self.updated < self.created {
            return Err(NoteError::InvalidField {
                field: "updated",
                reason: "must not precede created".into(),
            });
        }
        Ok(())
    }

    /// Merge a partial update in place. Returns the names of the
    /// fields that actually changed.
    pub fn apply_update(&mut self, update: FrontMatterUpdate) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(title) = update.title {
            if title != self.title {
                self.title = title;
                changed.push("title");
            }
        }
        if let Some(category) = update.category {
            if self.category != Some(category) {
                self.category = Some(category);
                changed.push("category");
            }
        }
        if let Some(tags) = update.tags {
            if tags != self.tags {
                self.tags = tags;
                changed.push("tags");
            }
        }
        if let Some(project) = update.project {
            if self.project.as_deref() != Some(project.as_str()) {
                self.project = Some(project);
                changed.push("project");
            }
        }
        if let Some(links) = update.links {
            if links != self.links {
                self.links = links;
                changed.push("links");
            }
        }
        self.normalize();
        changed
    }
}

/// A partial front matter mutation; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct FrontMatterUpdate {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    pub project: Option<String>,
    pub links: Option<Vec<String>>,
}

/// A note: front matter plus Markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub front: FrontMatter,
    pub body: String,
}

/// Result of a lenient parse: a usable note plus what had to be fixed.
#[derive(Debug)]
pub struct LenientNote {
    pub note: Note,
    pub warnings: Vec<String>,
}

impl Note {
    pub fn new(front: FrontMatter, body: String) -> Self {
        Self { front, body }
    }

    /// Serialize to the on-disk Markdown form. The body round-trips
    /// byte-for-byte through [`Note::parse`].
    pub fn to_markdown(&self) -> Result<String, NoteError> {
        let yaml = serde_yaml::to_string(&self.front)?;
        let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
        Ok(format!("---\n{yaml}---\n{}", self.body))
    }

    /// Strict parse: any missing or invalid field is an error.
    pub fn parse(raw: &str) -> Result<Note, NoteError> {
        let (yaml, body) = split_front_matter(raw).ok_or(NoteError::MissingFrontMatter)?;
        let mut front: FrontMatter = serde_yaml::from_str(yaml)?;
        front.normalize();
        front.validate()?;
        Ok(Note {
            front,
            body: body.to_string(),
        })
    }

    /// Lenient parse: missing or invalid fields are replaced with
    /// defaults and reported as warnings. Never fails.
    pub fn parse_lenient(raw: &str) -> LenientNote {
        let mut warnings = Vec::new();

        let (yaml, body) = match split_front_matter(raw) {
            Some((yaml, body)) => (Some(yaml), body),
            None => {
                warnings.push("no front matter block".to_string());
                (None, raw)
            }
        };

        let mapping = yaml.and_then(|y| {
            serde_yaml::from_str::<serde_yaml::Value>(y)
                .map_err(|e| warnings.push(format!("unparseable front matter: {e}")))
                .ok()
        });

        let now = Utc::now();
        let mut front = FrontMatter {
            id: String::new(),
            title: String::new(),
            category: None,
            tags: Vec::new(),
            project: None,
            created: now,
            updated: now,
            links: Vec::new(),
        };

        if let Some(serde_yaml::Value::Mapping(map)) = mapping {
            for (key, value) in map {
                let Some(key) = key.as_str() else { continue };
                match key {
                    "id" => match value.as_str() {
                        Some(s) if is_valid_uid(s) => front.id = s.to_string(),
                        Some(s) => warnings.push(format!("invalid id `{s}`")),
                        None => warnings.push("id is not a string".to_string()),
                    },
                    "title" => match value.as_str() {
                        Some(s) if !s.is_empty() => front.title = s.to_string(),
                        _ => warnings.push("title missing or empty".to_string()),
                    },
                    "category" => match value.as_str().and_then(Category::parse) {
                        Some(c) => front.category = Some(c),
                        None => warnings.push(format!("unknown category {value:?}")),
                    },
                    "tags" => front.tags = string_sequence(&value, "tags", &mut warnings),
                    "project" => match value.as_str() {
                        Some(s) if !s.is_empty() => front.project = Some(s.to_string()),
                        _ => warnings.push("project is not a non-empty string".to_string()),
                    },
                    "created" => match parse_timestamp(&value) {
                        Some(ts) => front.created = ts,
                        None => warnings.push("created is not an RFC 3339 timestamp".to_string()),
                    },
                    "updated" => match parse_timestamp(&value) {
                        Some(ts) => front.updated = ts,
                        None => warnings.push("updated is not an RFC 3339 timestamp".to_string()),
                    },
                    "links" => front.links = string_sequence(&value, "links", &mut warnings),
                    _ => {}
                }
            }
        }

        if front.title.is_empty() {
            front.title = "Untitled".to_string();
        }
        if front.updated < front.created {
            front.updated = front.created;
        }
        front.normalize();

        LenientNote {
            note: Note {
                front,
                body: body.to_string(),
            },
            warnings,
        }
    }

    /// Whitespace-separated word count of title and body.
    pub fn word_count(&self) -> usize {
        self.front.title.split_whitespace().count() + self.body.split_whitespace().count()
    }
}

fn parse_timestamp(value: &serde_yaml::Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn string_sequence(
    value: &serde_yaml::Value,
    field: &str,
    warnings: &mut Vec<String>,
) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .filter_map(|entry| match entry.as_str() {
                Some(s) if !s.trim().is_empty() => Some(s.to_string()),
                _ => {
                    warnings.push(format!("dropped non-string entry in {field}"));
                    None
                }
            })
            .collect(),
        serde_yaml::Value::Null => Vec::new(),
        _ => {
            warnings.push(format!("{field} is not a sequence"));
            Vec::new()
        }
    }
}

/// Split raw file content into the YAML front matter string and the
/// body. The opening `---` must be the very first bytes; the closing
/// `---` must sit alone on a line. One newline after the closing
/// delimiter is consumed so the body round-trips exactly.
pub fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let after_open = raw.strip_prefix("---")?;
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))?;

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == "---" {
            let yaml = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

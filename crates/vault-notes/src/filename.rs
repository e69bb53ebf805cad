//! Note file names.
//!
//! A note lives at `{slug}-{uid}.md` where the slug is the sanitized,
//! lowercased title truncated to 50 characters. The UID at the tail is
//! authoritative; the slug is only there for humans.

/// Sanitize a title into a filename slug.
///
/// Replaces any of `<>:"/\|?*` and whitespace runs with a single `-`,
/// collapses consecutive `-`, trims leading/trailing `-`, lowercases,
/// and truncates to 50 characters.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = false;

    for ch in title.chars() {
        let mapped = if ch.is_whitespace() || matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
            None
        } else {
            Some(ch.to_lowercase())
        };
        match mapped {
            Some(lower) => {
                slug.extend(lower);
                last_dash = false;
            }
            None => {
                if !last_dash && !slug.is_empty() {
                    slug.push('-');
                    last_dash = true;
                }
            }
        }
    }

    let truncated: String = slug.chars().take(50).collect();
    truncated.trim_matches('-').to_string()
}

/// The file name for a note with the given title and UID.
///
/// Falls back to `{uid}.md` when the title sanitizes to nothing.
pub fn note_file_name(title: &str, uid: &str) -> String {
    let slug = sanitize_title(title);
    if slug.is_empty() {
        format!("{uid}.md")
    } else {
        format!("{slug}-{uid}.md")
    }
}

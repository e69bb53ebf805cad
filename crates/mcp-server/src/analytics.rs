//! Vault analytics: roll-up stats, stale-note scans, and the
//! organization-health score.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vault_notes::{Category, Note};

use crate::links;

/// Aggregate numbers over the whole vault.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStats {
    pub note_count: usize,
    pub total_words: usize,
    pub categories: BTreeMap<String, usize>,
    pub top_tags: Vec<TagCount>,
    pub total_links: usize,
    pub orphan_count: usize,
    pub avg_links_per_note: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// How many tags the histogram keeps.
const TOP_TAG_LIMIT: usize = 20;

pub fn vault_stats(corpus: &[(PathBuf, Note)]) -> VaultStats {
    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    let mut tags: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_words = 0;
    let mut total_links = 0;

    for (_, note) in corpus {
        let bucket = note
            .front
            .category
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| "Uncategorized".to_string());
        *categories.entry(bucket).or_default() += 1;

        for tag in &note.front.tags {
            *tags.entry(tag.clone()).or_default() += 1;
        }

        total_words += note.word_count();
        total_links += links::outbound_links(note).len();
    }

    let mut top_tags: Vec<TagCount> = tags
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    top_tags.truncate(TOP_TAG_LIMIT);

    let note_count = corpus.len();
    VaultStats {
        note_count,
        total_words,
        categories,
        top_tags,
        total_links,
        orphan_count: links::orphan_uids(corpus).len(),
        avg_links_per_note: if note_count == 0 {
            0.0
        } else {
            total_links as f64 / note_count as f64
        },
    }
}

/// A note whose `updated` timestamp is older than the cutoff.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleNote {
    pub uid: String,
    pub title: String,
    pub category: Option<String>,
    pub updated: DateTime<Utc>,
    pub days_ago: i64,
}

/// Notes with `updated < now - stale_days`, oldest first. Archived
/// notes are excluded unless `include_archives`.
pub fn stale_notes(
    corpus: &[(PathBuf, Note)],
    stale_days: i64,
    include_archives: bool,
    now: DateTime<Utc>,
) -> Vec<StaleNote> {
    let cutoff = now - chrono::Duration::days(stale_days);
    let mut stale: Vec<StaleNote> = corpus
        .iter()
        .map(|(_, note)| note)
        .filter(|note| include_archives || note.front.category != Some(Category::Archives))
        .filter(|note| note.front.updated < cutoff)
        .map(|note| StaleNote {
            uid: note.front.id.clone(),
            title: note.front.title.clone(),
            category: note.front.category.map(|c| c.as_str().to_string()),
            updated: note.front.updated,
            days_ago: (now - note.front.updated).num_days(),
        })
        .collect();

    stale.sort_by(|a, b| a.updated.cmp(&b.updated));
    stale
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationHealth {
    pub score: f64,
    pub grade: char,
    pub orphan_ratio: f64,
    pub stale_ratio: f64,
    pub category_balance: f64,
    pub recommendations: Vec<String>,
}

/// Days after which a note counts as stale for the health score.
const HEALTH_STALE_DAYS: i64 = 30;

/// Composite organization health over the corpus.
///
/// `score = clamp(0, 100, 100 - min(40, orphan*100) - min(30, stale*50)
/// + max(0, (balance - 50) / 2))` where balance is the normalized
/// Shannon entropy of the PARA category distribution scaled to 0-100.
pub fn organization_health(corpus: &[(PathBuf, Note)], now: DateTime<Utc>) -> OrganizationHealth {
    let note_count = corpus.len();

    let orphan_ratio = if note_count == 0 {
        0.0
    } else {
        links::orphan_uids(corpus).len() as f64 / note_count as f64
    };

    let stale_count = stale_notes(corpus, HEALTH_STALE_DAYS, false, now).len();
    let stale_ratio = if note_count == 0 {
        0.0
    } else {
        stale_count as f64 / note_count as f64
    };

    let category_balance = category_balance_score(corpus);

    let score = (100.0 - (orphan_ratio * 100.0).min(40.0) - (stale_ratio * 50.0).min(30.0)
        + ((category_balance - 50.0) / 2.0).max(0.0))
    .clamp(0.0, 100.0);

    let grade = match score {
        s if s >= 90.0 => 'A',
        s if s >= 75.0 => 'B',
        s if s >= 60.0 => 'C',
        s if s >= 40.0 => 'D',
        _ => 'F',
    };

    let mut recommendations = Vec::new();
    if orphan_ratio > 0.3 {
        recommendations.push(
            "Over 30% of notes have no links; connect them to related notes or archive them"
                .to_string(),
        );
    } else if orphan_ratio > 0.1 {
        recommendations
            .push("Several notes are unlinked; consider adding links to related notes".to_string());
    }
    if stale_ratio > 0.3 {
        recommendations.push(
            "Over 30% of active notes have not been touched in a month; review or archive them"
                .to_string(),
        );
    } else if stale_ratio > 0.15 {
        recommendations
            .push("Some notes are getting stale; schedule a review pass".to_string());
    }
    if category_balance < 50.0 && note_count > 0 {
        recommendations.push(
            "Notes are concentrated in few categories; spread work across the PARA buckets"
                .to_string(),
        );
    }

    OrganizationHealth {
        score,
        grade,
        orphan_ratio,
        stale_ratio,
        category_balance,
        recommendations,
    }
}

/// Normalized Shannon entropy of the PARA category distribution,
/// scaled to 0-100. Uncategorized notes do not participate; a vault
/// with no categorized notes scores 0.
fn category_balance_score(corpus: &[(PathBuf, Note)]) -> f64 {
    let mut counts = [0usize; 4];
    for (_, note) in corpus {
        if let Some(category) = note.front.category {
            let slot = Category::ALL
                .iter()
                .position(|c| *c == category)
                .unwrap_or(0);
            counts[slot] += 1;
        }
    }

    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let entropy: f64 = counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.ln()
        })
        .sum();

    entropy / (Category::ALL.len() as f64).ln() * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_notes::{mint_uid, FrontMatter};

    fn note(title: &str, category: Option<Category>) -> (PathBuf, Note) {
        let mut front = FrontMatter::new(mint_uid(), title.to_string());
        front.category = category;
        (
            PathBuf::from(format!("{title}.md")),
            Note::new(front, String::new()),
        )
    }

    #[test]
    fn stats_count_words_tags_and_links() {
        let (p1, mut a) = note("Alpha", Some(Category::Projects));
        a.body = "one two three".into();
        a.front.tags = vec!["t1".into(), "t2".into()];
        let (p2, mut b) = note("Beta", None);
        b.front.tags = vec!["t1".into()];
        b.front.links = vec![a.front.id.clone()];

        let corpus = vec![(p1, a), (p2, b)];
        let stats = vault_stats(&corpus);

        assert_eq!(stats.note_count, 2);
        assert_eq!(stats.total_words, 5); // "Alpha" + 3 body words + "Beta"
        assert_eq!(stats.categories["Projects"], 1);
        assert_eq!(stats.categories["Uncategorized"], 1);
        assert_eq!(stats.top_tags[0].tag, "t1");
        assert_eq!(stats.top_tags[0].count, 2);
        assert_eq!(stats.total_links, 1);
        assert_eq!(stats.orphan_count, 0);
        assert_eq!(stats.avg_links_per_note, 0.5);
    }

    #[test]
    fn stale_scan_excludes_archives_by_default() {
        let now = Utc::now();
        let (p1, mut old_active) = note("Old", Some(Category::Resources));
        old_active.front.updated = now - chrono::Duration::days(31);
        let (p2, mut old_archived) = note("Archived", Some(Category::Archives));
        old_archived.front.updated = now - chrono::Duration::days(90);
        let (p3, fresh) = note("Fresh", None);

        let corpus = vec![(p1, old_active), (p2, old_archived), (p3, fresh)];

        let stale = stale_notes(&corpus, 30, false, now);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].title, "Old");
        assert_eq!(stale[0].days_ago, 31);

        let with_archives = stale_notes(&corpus, 30, true, now);
        assert_eq!(with_archives.len(), 2);
        assert_eq!(with_archives[0].title, "Archived"); // oldest first
    }

    #[test]
    fn empty_vault_scores_perfect_health() {
        let health = organization_health(&[], Utc::now());
        assert_eq!(health.score, 100.0);
        assert_eq!(health.grade, 'A');
        assert!(health.recommendations.is_empty());
    }

    #[test]
    fn orphan_heavy_vault_is_penalized() {
        let corpus: Vec<_> = (0..10).map(|i| note(&format!("N{i}"), None)).collect();
        let health = organization_health(&corpus, Utc::now());

        // All notes are orphans: full 40-point orphan penalty
        assert_eq!(health.orphan_ratio, 1.0);
        assert_eq!(health.score, 60.0);
        assert_eq!(health.grade, 'C');
        assert!(health
            .recommendations
            .iter()
            .any(|r| r.contains("no links")));
    }

    #[test]
    fn balanced_categories_earn_a_bonus() {
        let mut corpus = Vec::new();
        for category in Category::ALL {
            let (p, mut n) = note(&format!("{category}-1"), Some(category));
            // Link each note to the next so nothing is an orphan
            n.front.links = vec!["20990101T000000000000Z".into()];
            corpus.push((p, n));
        }

        let health = organization_health(&corpus, Utc::now());
        assert_eq!(health.category_balance, 100.0);
        assert_eq!(health.score, 100.0);
    }

    #[test]
    fn single_category_has_zero_balance() {
        let corpus = vec![
            note("A", Some(Category::Projects)),
            note("B", Some(Category::Projects)),
        ];
        assert_eq!(category_balance_score(&corpus), 0.0);
    }
}

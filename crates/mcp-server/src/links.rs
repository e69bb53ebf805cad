//! Link-graph analysis over an in-memory corpus.
//!
//! The graph is never held as owning pointers: every analysis walks
//! notes by UID lookup, so cycles (A links B links A) are ordinary.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use vault_notes::Note;

/// Outbound link set of a note: front matter `links` followed by the
/// targets extracted from the body, first occurrence wins.
pub fn outbound_links(note: &Note) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for target in note
        .front
        .links
        .iter()
        .cloned()
        .chain(md_links::extract_links(&note.body).all)
    {
        if seen.insert(target.clone()) {
            out.push(target);
        }
    }
    out
}

/// UIDs of notes that are neither a source nor a target of any link.
pub fn orphan_uids(corpus: &[(PathBuf, Note)]) -> Vec<String> {
    let mut sources = HashSet::new();
    let mut targets: HashSet<String> = HashSet::new();

    for (_, note) in corpus {
        let outbound = outbound_links(note);
        if !outbound.is_empty() {
            sources.insert(note.front.id.clone());
        }
        targets.extend(outbound);
    }

    corpus
        .iter()
        .map(|(_, n)| &n.front.id)
        .filter(|uid| !sources.contains(*uid) && !targets.contains(*uid))
        .cloned()
        .collect()
}

/// Composite-score weights for link suggestion. The defaults sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionWeights {
    pub tag: f64,
    pub category: f64,
    pub project: f64,
    pub keyword: f64,
}

impl Default for SuggestionWeights {
    fn default() -> Self {
        Self {
            tag: 0.4,
            category: 0.2,
            project: 0.2,
            keyword: 0.2,
        }
    }
}

/// A scored link candidate.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSuggestion {
    pub uid: String,
    pub title: String,
    pub score: f64,
    pub tag_score: f64,
    pub category_score: f64,
    pub project_score: f64,
    pub keyword_score: f64,
}

/// Rank corpus notes as link candidates for `target_uid`.
///
/// Scores are the weighted sum of tag-set Jaccard overlap, category
/// equality, project equality, and keyword overlap (case-folded words
/// longer than 3 characters, `min(shared / 10, 1)`). The target
/// itself is never a candidate, nor is anything in `exclude` (the
/// caller typically passes the UIDs already connected to the target).
pub fn suggest_links(
    corpus: &[(PathBuf, Note)],
    target_uid: &str,
    weights: SuggestionWeights,
    min_score: f64,
    exclude: &HashSet<String>,
    limit: usize,
) -> Option<Vec<LinkSuggestion>> {
    let target = corpus
        .iter()
        .map(|(_, n)| n)
        .find(|n| n.front.id == target_uid)?;

    let target_tags: HashSet<&str> = target.front.tags.iter().map(String::as_str).collect();
    let target_words = keyword_set(target);

    let mut suggestions: Vec<LinkSuggestion> = corpus
        .iter()
        .map(|(_, n)| n)
        .filter(|candidate| candidate.front.id != target_uid)
        .filter(|candidate| !exclude.contains(&candidate.front.id))
        .map(|candidate| {
            let candidate_tags: HashSet<&str> =
                candidate.front.tags.iter().map(String::as_str).collect();
            let tag_score = jaccard(&target_tags, &candidate_tags);
            let category_score = match (target.front.category, candidate.front.category) {
                (Some(a), Some(b)) if a == b => 1.0,
                _ => 0.0,
            };
            let project_score = match (&target.front.project, &candidate.front.project) {
                (Some(a), Some(b)) if a == b => 1.0,
                _ => 0.0,
            };
            let shared_words = target_words.intersection(&keyword_set(candidate)).count();
            let keyword_score = (shared_words as f64 / 10.0).min(1.0);

            let score = weights.tag * tag_score
                + weights.category * category_score
                + weights.project * project_score
                + weights.keyword * keyword_score;

            LinkSuggestion {
                uid: candidate.front.id.clone(),
                title: candidate.front.title.clone(),
                score,
                tag_score,
                category_score,
                project_score,
                keyword_score,
            }
        })
        .filter(|s| s.score >= min_score)
        .collect();

    suggestions.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.uid.cmp(&b.uid))
    });
    suggestions.truncate(limit);
    Some(suggestions)
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Case-folded words of length > 3 from title and body.
fn keyword_set(note: &Note) -> HashSet<String> {
    note.front
        .title
        .split(|c: char| !c.is_alphanumeric())
        .chain(note.body.split(|c: char| !c.is_alphanumeric()))
        .filter(|word| word.chars().count() > 3)
        .map(|word| word.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_notes::{mint_uid, Category, FrontMatter};

    fn corpus_note(title: &str, body: &str) -> (PathBuf, Note) {
        let front = FrontMatter::new(mint_uid(), title.to_string());
        let path = PathBuf::from(format!("{title}.md"));
        (path, Note::new(front, body.to_string()))
    }

    #[test]
    fn outbound_unions_front_matter_and_body() {
        let (_, mut note) = corpus_note("N", "see [[A]] and [x](B)");
        note.front.links = vec!["C".into(), "A".into()];
        assert_eq!(outbound_links(&note), vec!["C", "A", "B"]);
    }

    #[test]
    fn cyclic_links_are_legal() {
        let (pa, mut a) = corpus_note("A", "");
        let (pb, mut b) = corpus_note("B", "");
        let uid_a = a.front.id.clone();
        let uid_b = b.front.id.clone();
        a.front.links = vec![uid_b.clone()];
        b.front.links = vec![uid_a.clone()];

        let corpus = vec![(pa, a), (pb, b)];
        assert_eq!(outbound_links(&corpus[0].1), vec![uid_b]);
        assert_eq!(outbound_links(&corpus[1].1), vec![uid_a]);
        assert!(orphan_uids(&corpus).is_empty());
    }

    #[test]
    fn orphans_have_no_links_either_way() {
        let (pa, mut a) = corpus_note("A", "");
        let (pb, b) = corpus_note("B", "");
        let (pc, c) = corpus_note("C", "");
        let uid_b = b.front.id.clone();
        let uid_c = c.front.id.clone();
        a.front.links = vec![uid_b];

        let corpus = vec![(pa, a), (pb, b), (pc, c)];
        assert_eq!(orphan_uids(&corpus), vec![uid_c]);
    }

    #[test]
    fn suggestions_rank_by_tag_overlap() {
        let (pt, mut target) = corpus_note("Target", "");
        let (p1, mut both) = corpus_note("Both", "");
        let (p2, mut one) = corpus_note("One", "");
        let (p3, none) = corpus_note("None", "");

        target.front.tags = vec!["a".into(), "b".into()];
        both.front.tags = vec!["a".into(), "b".into()];
        one.front.tags = vec!["a".into()];

        let uid = target.front.id.clone();
        let corpus = vec![(pt, target), (p1, both), (p2, one), (p3, none)];
        let exclude = HashSet::new();

        let suggestions =
            suggest_links(&corpus, &uid, SuggestionWeights::default(), 0.0, &exclude, 10).unwrap();

        assert_eq!(suggestions[0].title, "Both");
        assert_eq!(suggestions[1].title, "One");
        assert!(suggestions[0].score > suggestions[1].score);
        assert_eq!(suggestions[2].title, "None");
        assert_eq!(suggestions[2].score, 0.0);

        // A positive minimum score drops the no-overlap candidate
        let filtered =
            suggest_links(&corpus, &uid, SuggestionWeights::default(), 0.1, &exclude, 10).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn suggestions_drop_excluded_candidates() {
        let (pt, mut target) = corpus_note("Target", "");
        let (p1, mut linked) = corpus_note("Linked", "");
        target.front.tags = vec!["a".into()];
        linked.front.tags = vec!["a".into()];
        let uid = target.front.id.clone();
        let linked_uid = linked.front.id.clone();
        target.front.links = vec![linked_uid.clone()];

        let corpus = vec![(pt, target), (p1, linked)];
        let exclude: HashSet<String> = [linked_uid].into_iter().collect();
        let suggestions =
            suggest_links(&corpus, &uid, SuggestionWeights::default(), 0.0, &exclude, 10).unwrap();
        assert!(suggestions.is_empty());

        let unfiltered = suggest_links(
            &corpus,
            &uid,
            SuggestionWeights::default(),
            0.0,
            &HashSet::new(),
            10,
        )
        .unwrap();
        assert_eq!(unfiltered.len(), 1);
    }

    #[test]
    fn keyword_overlap_uses_long_words_only() {
        let (pt, target) = corpus_note("Rust Programming", "ownership borrowing lifetimes");
        let (p1, candidate) = corpus_note("More Rust", "ownership and the borrow checker");
        let uid = target.front.id.clone();

        let corpus = vec![(pt, target), (p1, candidate)];
        let suggestions = suggest_links(
            &corpus,
            &uid,
            SuggestionWeights::default(),
            0.0,
            &HashSet::new(),
            10,
        )
        .unwrap();

        // shares "rust" and "ownership"
        assert!(suggestions[0].keyword_score >= 0.2 - f64::EPSILON);
    }

    #[test]
    fn category_and_project_equality_are_binary() {
        let (pt, mut target) = corpus_note("T", "");
        let (p1, mut same) = corpus_note("Same", "");
        let (p2, mut other) = corpus_note("Other", "");

        target.front.category = Some(Category::Resources);
        target.front.project = Some("alpha".into());
        same.front.category = Some(Category::Resources);
        same.front.project = Some("alpha".into());
        other.front.category = Some(Category::Projects);

        let uid = target.front.id.clone();
        let corpus = vec![(pt, target), (p1, same), (p2, other)];
        let suggestions = suggest_links(
            &corpus,
            &uid,
            SuggestionWeights::default(),
            0.0,
            &HashSet::new(),
            10,
        )
        .unwrap();

        let same_entry = suggestions.iter().find(|s| s.title == "Same").unwrap();
        let other_entry = suggestions.iter().find(|s| s.title == "Other").unwrap();
        assert_eq!(same_entry.category_score, 1.0);
        assert_eq!(same_entry.project_score, 1.0);
        assert_eq!(other_entry.category_score, 0.0);
    }
}

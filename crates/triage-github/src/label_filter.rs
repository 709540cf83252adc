use std::collections::{HashMap, HashSet};

use crate::github_types::GithubLabel;

/// Normalize label names for case-insensitive matching.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Keep only labels that already exist in the repository.
///
/// Output uses the repository's spelling, drops duplicates, and preserves
/// the order of `requested`. Unknown labels are dropped, never created.
pub fn filter_existing_labels<'a>(
    requested: impl IntoIterator<Item = &'a str>,
    repository_labels: &[GithubLabel],
) -> Vec<String> {
    let known = repository_labels
        .iter()
        .map(|label| (normalize_label(&label.name), label.name.clone()))
        .collect::<HashMap<_, _>>();
    let mut seen = HashSet::new();
    requested
        .into_iter()
        .filter_map(|raw| {
            let normalized = normalize_label(raw);
            let canonical = known.get(&normalized)?;
            seen.insert(normalized).then(|| canonical.clone())
        })
        .collect()
}

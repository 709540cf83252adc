use crate::github_types::GithubIssueComment;

pub const TRIAGE_MARKER_PREFIX: &str = "<!-- backlog-triage:";
pub const TRIAGE_MARKER_SUFFIX: &str = " -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageLinkKind {
    Duplicate,
    Related,
}

impl TriageLinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Related => "related",
        }
    }
}

#[derive(Debug, Clone, Copy)]
/// One source -> target link, with similarity already normalized to `[0, 1]`.
pub struct TriageLinkView<'a> {
    pub kind: TriageLinkKind,
    pub source_type: &'a str,
    pub source_number: u64,
    pub source_title: &'a str,
    pub source_url: &'a str,
    pub target_type: &'a str,
    pub target_number: u64,
    pub target_title: &'a str,
    pub target_url: &'a str,
    pub similarity: f64,
    pub reasoning: &'a str,
}

/// Pair key shared by both directions of a link, e.g. `issue-2:7`.
pub fn triage_link_pair(view: &TriageLinkView<'_>) -> String {
    let low = view.source_number.min(view.target_number);
    let high = view.source_number.max(view.target_number);
    format!("{}-{low}:{high}", view.source_type)
}

/// Hidden marker identifying a link; used to skip reposting.
///
/// Direction-free: linking #7 back to #12 yields the marker of #12 -> #7.
pub fn triage_link_marker(view: &TriageLinkView<'_>) -> String {
    format!(
        "{TRIAGE_MARKER_PREFIX}{}:{}{TRIAGE_MARKER_SUFFIX}",
        view.kind.as_str(),
        triage_link_pair(view)
    )
}

/// Formats a `[0, 1]` fraction as a one-decimal percentage.
pub fn format_similarity_percent(fraction: f64) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    format!("{:.1}%", fraction * 100.0)
}

fn item_noun(item_type: &str) -> &'static str {
    if item_type == "pr" {
        "pull request"
    } else {
        "issue"
    }
}

fn reasoning_block(reasoning: &str) -> String {
    let reasoning = reasoning.trim();
    if reasoning.is_empty() {
        return String::new();
    }
    let quoted = reasoning
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n{quoted}")
}

/// Comment posted on the newly triaged item.
pub fn render_source_comment(view: &TriageLinkView<'_>) -> String {
    let percent = format_similarity_percent(view.similarity);
    let headline = match view.kind {
        TriageLinkKind::Duplicate => format!(
            "This {} looks like a duplicate of #{} ([{}]({})), similarity {percent}.",
            item_noun(view.source_type),
            view.target_number,
            view.target_title.trim(),
            view.target_url
        ),
        TriageLinkKind::Related => format!(
            "This {} is potentially related to #{} ([{}]({})), similarity {percent}.",
            item_noun(view.source_type),
            view.target_number,
            view.target_title.trim(),
            view.target_url
        ),
    };
    format!(
        "{headline}{}\n\n_Automated backlog triage. Nothing was closed or merged._\n{}",
        reasoning_block(view.reasoning),
        triage_link_marker(view)
    )
}

/// Comment posted on the existing item the source was matched against.
pub fn render_target_comment(view: &TriageLinkView<'_>) -> String {
    let percent = format_similarity_percent(view.similarity);
    let relation = match view.kind {
        TriageLinkKind::Duplicate => "may duplicate",
        TriageLinkKind::Related => "is potentially related to",
    };
    format!(
        "{} #{} ([{}]({})) {relation} this {}, similarity {percent}.\n\n_Automated backlog triage. Nothing was closed or merged._\n{}",
        if view.source_type == "pr" { "Pull request" } else { "Issue" },
        view.source_number,
        view.source_title.trim(),
        view.source_url,
        item_noun(view.target_type),
        triage_link_marker(view)
    )
}

/// Returns true when any existing comment already carries `marker`.
pub fn comments_contain_marker(comments: &[GithubIssueComment], marker: &str) -> bool {
    comments
        .iter()
        .filter_map(|comment| comment.body.as_deref())
        .any(|body| body.contains(marker))
}

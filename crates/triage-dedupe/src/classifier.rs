use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use triage_vector::{
    cosine_similarity, validate_embedding, ContentIdentity, ItemType, SimilarItem, VectorStore,
};

use crate::dedupe_types::{DedupeStatus, DuplicateCandidate, DuplicateVerdict, TriageItem};
use crate::embedder::ItemEmbedder;
use crate::judgment::DuplicateJudge;
use crate::similarity_normalization::normalize_judge_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Thresholds and limits for duplicate detection.
pub struct DedupeConfig {
    /// Minimum cosine similarity for a neighbor to become a candidate.
    pub search_threshold: f64,
    /// Floor for the `related` status.
    pub related_threshold: f64,
    /// Floor for a judge-confirmed `duplicate`.
    pub duplicate_threshold: f64,
    /// Neighbors kept from the search step.
    pub candidate_limit: usize,
    /// Open candidates handed to the judge.
    pub judge_candidate_limit: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            search_threshold: 0.7,
            related_threshold: 0.75,
            duplicate_threshold: 0.85,
            candidate_limit: 10,
            judge_candidate_limit: 5,
        }
    }
}

#[async_trait]
/// Resolves a neighbor that is not among the fetched siblings.
pub trait CandidateLookup: Send + Sync {
    /// Returns `None` when the item no longer exists.
    async fn lookup_candidate(&self, item_type: ItemType, number: u64) -> Result<Option<TriageItem>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateOutcome {
    pub status: DedupeStatus,
    /// Highest normalized similarity backing `status`; 0 when nothing matched.
    pub similarity: f64,
    /// Items the status refers to, best first. Empty for `distinct`.
    pub targets: Vec<SimilarItem>,
    pub reasoning: String,
    /// Neighbors that survived search and exclusion.
    pub candidates: Vec<SimilarItem>,
    /// Whether the judge was consulted.
    pub judged: bool,
}

impl DuplicateOutcome {
    fn distinct(reasoning: impl Into<String>, candidates: Vec<SimilarItem>) -> Self {
        Self {
            status: DedupeStatus::Distinct,
            similarity: 0.0,
            targets: Vec::new(),
            reasoning: reasoning.into(),
            candidates,
            judged: false,
        }
    }
}

/// Runs embed, upsert, neighbor search, judgment and classification for one item.
pub struct DuplicateClassifier {
    embedder: ItemEmbedder,
    store: Arc<dyn VectorStore>,
    judge: Arc<dyn DuplicateJudge>,
    config: DedupeConfig,
}

impl DuplicateClassifier {
    pub fn new(
        embedder: ItemEmbedder,
        store: Arc<dyn VectorStore>,
        judge: Arc<dyn DuplicateJudge>,
        config: DedupeConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            judge,
            config,
        }
    }

    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Classifies `item` against its open neighbors.
    ///
    /// `siblings` are the already-fetched items of the same repository; only
    /// those of the item's own type are scanned. Errors from the embedding
    /// provider, the judge, or the store abort this item only.
    pub async fn classify(
        &self,
        item: &TriageItem,
        siblings: &[TriageItem],
        lookup: &dyn CandidateLookup,
    ) -> Result<DuplicateOutcome> {
        let item_type = item.item_type();
        let key = item.cache_key();
        let vector = self.item_vector(item, &key).await?;
        self.store
            .store_embedding(&key, &vector, &item.metadata())
            .with_context(|| format!("failed to store embedding for {key}"))?;

        let siblings = siblings
            .iter()
            .filter(|sibling| sibling.item_type() == item_type && sibling.number() != item.number())
            .collect::<Vec<_>>();

        let mut neighbors = self.search_store(item, &vector)?;
        if neighbors.is_empty() {
            neighbors = self.linear_scan(&vector, &siblings).await?;
        }
        if neighbors.is_empty() {
            tracing::debug!(item = %key, "no neighbors above search threshold");
            return Ok(DuplicateOutcome::distinct("no similar items found", Vec::new()));
        }

        let candidates = self.resolve_candidates(&neighbors, &siblings, lookup).await;
        if candidates.is_empty() {
            tracing::debug!(item = %key, neighbors = neighbors.len(), "no open candidates to judge");
            return Ok(DuplicateOutcome::distinct(
                "similar items are all closed",
                neighbors,
            ));
        }

        let verdict = self
            .judge
            .judge_duplicates(item, &candidates)
            .await
            .with_context(|| format!("duplicate judgment failed for {key}"))?;
        let mut outcome = classify_verdict(&verdict, &candidates, &self.config);
        outcome.candidates = neighbors;
        tracing::info!(
            item = %key,
            status = %outcome.status,
            similarity = outcome.similarity,
            targets = outcome.targets.len(),
            "duplicate classification finished"
        );
        Ok(outcome)
    }

    async fn item_vector(&self, item: &TriageItem, key: &str) -> Result<Vec<f32>> {
        // PR keys pin a head commit, so a cached vector is still current.
        if matches!(item.identity, ContentIdentity::PullRequest { .. }) {
            if let Some(cached) = self.cached_vector(key)? {
                return Ok(cached);
            }
        }
        self.embedder.embed_item(item).await
    }

    /// Cached vector for `key`, or `None` when absent or no longer the
    /// embedder's shape (e.g. after a dimensions change).
    fn cached_vector(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let cached = self
            .store
            .get_embedding(key)
            .with_context(|| format!("failed to read cached embedding for {key}"))?;
        Ok(cached.filter(|vector| {
            match validate_embedding(vector, self.embedder.dimensions()) {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(item = %key, %error, "discarding stale cached embedding");
                    false
                }
            }
        }))
    }

    fn search_store(&self, item: &TriageItem, vector: &[f32]) -> Result<Vec<SimilarItem>> {
        let hits = self
            .store
            .find_similar(
                vector,
                self.config.search_threshold,
                self.config.candidate_limit.saturating_add(1),
            )
            .with_context(|| {
                format!(
                    "neighbor search failed on {} store",
                    self.store.backend_name()
                )
            })?;
        let mut best: HashMap<u64, SimilarItem> = HashMap::new();
        for hit in hits {
            if hit.item_type != item.item_type() || hit.number == item.number() {
                continue;
            }
            // A PR can be stored under several head commits.
            let replace = best
                .get(&hit.number)
                .map_or(true, |existing| existing.similarity < hit.similarity);
            if replace {
                best.insert(hit.number, hit);
            }
        }
        let mut neighbors = best.into_values().collect::<Vec<_>>();
        sort_by_similarity(&mut neighbors);
        neighbors.truncate(self.config.candidate_limit);
        Ok(neighbors)
    }

    async fn linear_scan(
        &self,
        vector: &[f32],
        siblings: &[&TriageItem],
    ) -> Result<Vec<SimilarItem>> {
        let mut neighbors = Vec::new();
        for sibling in siblings.iter().filter(|sibling| sibling.is_open) {
            let key = sibling.cache_key();
            let sibling_vector = match self.cached_vector(&key)? {
                Some(cached) => cached,
                None => match self.embedder.embed_item(sibling).await {
                    Ok(fresh) => {
                        self.store
                            .store_embedding(&key, &fresh, &sibling.metadata())
                            .with_context(|| format!("failed to store embedding for {key}"))?;
                        fresh
                    }
                    Err(error) => {
                        tracing::warn!(item = %key, error = %format!("{error:#}"), "skipping sibling without embedding");
                        continue;
                    }
                },
            };
            let similarity = match cosine_similarity(vector, &sibling_vector) {
                Ok(similarity) => similarity,
                Err(error) => {
                    tracing::warn!(item = %key, %error, "skipping sibling with incomparable embedding");
                    continue;
                }
            };
            if similarity >= self.config.search_threshold {
                neighbors.push(SimilarItem {
                    number: sibling.number(),
                    title: sibling.title.clone(),
                    url: sibling.url.clone(),
                    similarity,
                    item_type: sibling.item_type(),
                });
            }
        }
        sort_by_similarity(&mut neighbors);
        neighbors.truncate(self.config.candidate_limit);
        tracing::debug!(scanned = siblings.len(), kept = neighbors.len(), "linear scan finished");
        Ok(neighbors)
    }

    async fn resolve_candidates(
        &self,
        neighbors: &[SimilarItem],
        siblings: &[&TriageItem],
        lookup: &dyn CandidateLookup,
    ) -> Vec<DuplicateCandidate> {
        let by_number = siblings
            .iter()
            .map(|sibling| (sibling.number(), *sibling))
            .collect::<HashMap<_, _>>();
        let mut candidates = Vec::new();
        for neighbor in neighbors {
            if candidates.len() >= self.config.judge_candidate_limit {
                break;
            }
            let detail = match by_number.get(&neighbor.number) {
                Some(sibling) => Some((*sibling).clone()),
                None => match lookup.lookup_candidate(neighbor.item_type, neighbor.number).await {
                    Ok(found) => found,
                    Err(error) => {
                        tracing::warn!(
                            number = neighbor.number,
                            error = %format!("{error:#}"),
                            "failed to fetch candidate details"
                        );
                        None
                    }
                },
            };
            let Some(detail) = detail else {
                continue;
            };
            if !detail.is_open {
                tracing::debug!(number = neighbor.number, "skipping closed candidate");
                continue;
            }
            candidates.push(DuplicateCandidate {
                number: neighbor.number,
                item_type: neighbor.item_type,
                title: detail.title,
                body: detail.body,
                url: detail.url,
                similarity: neighbor.similarity,
            });
        }
        candidates
    }
}

fn sort_by_similarity(items: &mut [SimilarItem]) {
    items.sort_by(|left, right| {
        right
            .similarity
            .partial_cmp(&left.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.number.cmp(&right.number))
    });
}

/// Maps a verdict onto `duplicate`, `related` or `distinct`.
///
/// Evidence is the judge's similar items restricted to the judged candidates,
/// with similarities normalized. A verdict without usable items falls back to
/// the search similarities. `duplicate` needs the judge's flag and evidence at
/// or above `duplicate_threshold`; otherwise evidence at or above
/// `related_threshold` yields `related`.
pub fn classify_verdict(
    verdict: &DuplicateVerdict,
    candidates: &[DuplicateCandidate],
    config: &DedupeConfig,
) -> DuplicateOutcome {
    let by_number = candidates
        .iter()
        .map(|candidate| (candidate.number, candidate))
        .collect::<HashMap<_, _>>();

    let mut evidence = Vec::<SimilarItem>::new();
    for judged in &verdict.similar_items {
        let Some(candidate) = by_number.get(&judged.number) else {
            tracing::debug!(number = judged.number, "judge referenced an unknown candidate");
            continue;
        };
        let similarity = normalize_judge_similarity(judged.similarity);
        match evidence.iter_mut().find(|item| item.number == judged.number) {
            Some(existing) => existing.similarity = existing.similarity.max(similarity),
            None => evidence.push(similar_item(candidate, similarity)),
        }
    }
    if evidence.is_empty() {
        evidence = candidates
            .iter()
            .map(|candidate| similar_item(candidate, candidate.similarity.clamp(0.0, 1.0)))
            .collect();
    }
    sort_by_similarity(&mut evidence);

    let best = evidence.first().map(|item| item.similarity).unwrap_or(0.0);
    let (status, floor) = if verdict.is_duplicate && best >= config.duplicate_threshold {
        (DedupeStatus::Duplicate, config.duplicate_threshold)
    } else if best >= config.related_threshold {
        (DedupeStatus::Related, config.related_threshold)
    } else {
        (DedupeStatus::Distinct, f64::INFINITY)
    };
    let targets = evidence
        .into_iter()
        .filter(|item| item.similarity >= floor)
        .collect::<Vec<_>>();

    DuplicateOutcome {
        status,
        similarity: if status == DedupeStatus::Distinct { 0.0 } else { best },
        targets,
        reasoning: verdict.reasoning.clone(),
        candidates: Vec::new(),
        judged: true,
    }
}

fn similar_item(candidate: &DuplicateCandidate, similarity: f64) -> SimilarItem {
    SimilarItem {
        number: candidate.number,
        title: candidate.title.clone(),
        url: candidate.url.clone(),
        similarity,
        item_type: candidate.item_type,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use triage_ai::{ChatUsage, EmbeddingClient, EmbeddingRequest, EmbeddingResponse, TriageAiError};
    use triage_vector::{
        ContentIdentity, ItemType, SqliteVectorStore, VectorStore, VolatileVectorStore,
    };

    use super::{classify_verdict, CandidateLookup, DedupeConfig, DuplicateClassifier};
    use crate::dedupe_types::{
        DedupeStatus, DuplicateCandidate, DuplicateVerdict, JudgedSimilarItem, TriageItem,
    };
    use crate::embedder::ItemEmbedder;
    use crate::judgment::DuplicateJudge;

    /// Embeds by title; unknown titles fail like a provider outage.
    struct TitleEmbeddings {
        vectors: HashMap<String, Vec<f32>>,
        calls: Mutex<Vec<String>>,
    }

    impl TitleEmbeddings {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(title, vector)| (title.to_string(), vector.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl EmbeddingClient for TitleEmbeddings {
        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, TriageAiError> {
            let title = request.inputs[0].lines().next().unwrap_or_default().to_string();
            self.calls.lock().expect("calls lock").push(title.clone());
            let vector = self
                .vectors
                .get(&title)
                .cloned()
                .ok_or_else(|| TriageAiError::HttpStatus { status: 503, body: "unavailable".into() })?;
            Ok(EmbeddingResponse {
                vectors: vec![vector],
                usage: ChatUsage::default(),
            })
        }
    }

    struct RecordingJudge {
        verdict: DuplicateVerdict,
        seen: Mutex<Vec<Vec<u64>>>,
    }

    impl RecordingJudge {
        fn new(verdict: DuplicateVerdict) -> Self {
            Self {
                verdict,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<Vec<u64>> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl DuplicateJudge for RecordingJudge {
        async fn judge_duplicates(
            &self,
            _item: &TriageItem,
            candidates: &[DuplicateCandidate],
        ) -> Result<DuplicateVerdict> {
            self.seen
                .lock()
                .expect("seen lock")
                .push(candidates.iter().map(|candidate| candidate.number).collect());
            Ok(self.verdict.clone())
        }
    }

    struct MapLookup(HashMap<u64, TriageItem>);

    #[async_trait]
    impl CandidateLookup for MapLookup {
        async fn lookup_candidate(&self, _item_type: ItemType, number: u64) -> Result<Option<TriageItem>> {
            Ok(self.0.get(&number).cloned())
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl CandidateLookup for FailingLookup {
        async fn lookup_candidate(&self, _item_type: ItemType, _number: u64) -> Result<Option<TriageItem>> {
            Err(anyhow!("lookup should not be needed"))
        }
    }

    /// Unit vector at the given cosine to `[1, 0]`.
    fn at_cosine(cosine: f32) -> Vec<f32> {
        vec![cosine, (1.0 - cosine * cosine).max(0.0).sqrt()]
    }

    fn issue(number: u64, title: &str, is_open: bool) -> TriageItem {
        TriageItem {
            identity: ContentIdentity::Issue { number },
            title: title.to_string(),
            body: format!("body of {title}"),
            url: format!("https://github.com/acme/widgets/issues/{number}"),
            created_at: Utc::now(),
            is_open,
        }
    }

    fn verdict(is_duplicate: bool, items: &[(u64, f64)]) -> DuplicateVerdict {
        DuplicateVerdict {
            is_duplicate,
            similar_items: items
                .iter()
                .map(|(number, similarity)| JudgedSimilarItem {
                    number: *number,
                    title: String::new(),
                    url: String::new(),
                    similarity: *similarity,
                })
                .collect(),
            reasoning: "judge says so".to_string(),
        }
    }

    fn candidate(number: u64, similarity: f64) -> DuplicateCandidate {
        DuplicateCandidate {
            number,
            item_type: ItemType::Issue,
            title: format!("candidate {number}"),
            body: String::new(),
            url: format!("https://github.com/acme/widgets/issues/{number}"),
            similarity,
        }
    }

    fn sqlite_store() -> Arc<SqliteVectorStore> {
        let store = SqliteVectorStore::open_in_memory().expect("open store");
        store.initialize().expect("initialize store");
        Arc::new(store)
    }

    fn classifier(
        embeddings: Arc<TitleEmbeddings>,
        store: Arc<dyn VectorStore>,
        judge: Arc<RecordingJudge>,
    ) -> DuplicateClassifier {
        DuplicateClassifier::new(
            ItemEmbedder::new(embeddings, "test-embedding", None),
            store,
            judge,
            DedupeConfig::default(),
        )
    }

    #[tokio::test]
    async fn functional_classifier_excludes_self_and_skips_judge_without_candidates() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[
            ("crash on save", at_cosine(1.0)),
            ("docs typo", at_cosine(0.1)),
        ]));
        let judge = Arc::new(RecordingJudge::new(verdict(true, &[(1, 1.0)])));
        let classifier = classifier(embeddings, sqlite_store(), judge.clone());
        let item = issue(1, "crash on save", true);
        let siblings = vec![item.clone(), issue(2, "docs typo", true)];

        let outcome = classifier
            .classify(&item, &siblings, &FailingLookup)
            .await
            .expect("classify");

        assert_eq!(outcome.status, DedupeStatus::Distinct);
        assert!(outcome.candidates.is_empty());
        assert!(!outcome.judged);
        assert!(judge.seen().is_empty());
    }

    #[tokio::test]
    async fn integration_closed_candidates_never_reach_the_judge() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[
            ("crash on save", at_cosine(1.0)),
            ("save crashes", at_cosine(0.97)),
            ("saving panics", at_cosine(0.9)),
        ]));
        let store = sqlite_store();
        let closed = issue(5, "save crashes", false);
        let open = issue(6, "saving panics", true);
        for (sibling, cosine) in [(&closed, 0.97f32), (&open, 0.9f32)] {
            store
                .store_embedding(&sibling.cache_key(), &at_cosine(cosine), &sibling.metadata())
                .expect("seed store");
        }
        let judge = Arc::new(RecordingJudge::new(verdict(true, &[(6, 0.92)])));
        let classifier = classifier(embeddings, store, judge.clone());
        let item = issue(1, "crash on save", true);
        let lookup = MapLookup(HashMap::from([(5, closed), (6, open)]));

        let outcome = classifier
            .classify(&item, &[], &lookup)
            .await
            .expect("classify");

        assert_eq!(judge.seen(), vec![vec![6]]);
        assert_eq!(outcome.status, DedupeStatus::Duplicate);
        assert_eq!(outcome.targets.len(), 1);
        assert_eq!(outcome.targets[0].number, 6);
        assert!((outcome.similarity - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn functional_volatile_store_falls_back_to_linear_scan_and_warms_cache() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[
            ("crash on save", at_cosine(1.0)),
            ("save crashes", at_cosine(0.95)),
            ("docs typo", at_cosine(0.2)),
        ]));
        let store = Arc::new(VolatileVectorStore::new());
        let judge = Arc::new(RecordingJudge::new(verdict(true, &[(2, 95.0)])));
        let classifier = classifier(embeddings.clone(), store.clone(), judge.clone());
        let item = issue(1, "crash on save", true);
        let siblings = vec![
            item.clone(),
            issue(2, "save crashes", true),
            issue(3, "docs typo", true),
            issue(4, "closed thing", false),
        ];

        let outcome = classifier
            .classify(&item, &siblings, &FailingLookup)
            .await
            .expect("classify");

        assert_eq!(outcome.status, DedupeStatus::Duplicate);
        assert!((outcome.similarity - 0.95).abs() < 1e-9);
        assert_eq!(judge.seen(), vec![vec![2]]);
        assert!(store.get_embedding("issue-2").expect("read").is_some());
        assert!(store.get_embedding("issue-3").expect("read").is_some());
        assert!(store.get_embedding("issue-4").expect("read").is_none());
        assert_eq!(store.len(), 3);

        let calls_before = embeddings.calls().len();
        classifier
            .classify(&item, &siblings, &FailingLookup)
            .await
            .expect("classify again");
        // Only the item itself is re-embedded; siblings come from the cache.
        assert_eq!(embeddings.calls().len(), calls_before + 1);
    }

    #[tokio::test]
    async fn regression_sibling_embedding_failure_does_not_abort_item() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[
            ("crash on save", at_cosine(1.0)),
            ("save crashes", at_cosine(0.8)),
        ]));
        let judge = Arc::new(RecordingJudge::new(DuplicateVerdict::fallback("judge unavailable")));
        let classifier = classifier(embeddings, Arc::new(VolatileVectorStore::new()), judge.clone());
        let item = issue(1, "crash on save", true);
        let siblings = vec![issue(2, "save crashes", true), issue(3, "unembeddable", true)];

        let outcome = classifier
            .classify(&item, &siblings, &FailingLookup)
            .await
            .expect("classify");

        assert_eq!(judge.seen(), vec![vec![2]]);
        assert_eq!(outcome.status, DedupeStatus::Related);
        assert_eq!(outcome.targets[0].number, 2);
    }

    #[tokio::test]
    async fn regression_item_embedding_failure_is_an_error() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[]));
        let judge = Arc::new(RecordingJudge::new(verdict(false, &[])));
        let classifier = classifier(embeddings, Arc::new(VolatileVectorStore::new()), judge);
        let error = classifier
            .classify(&issue(1, "crash on save", true), &[], &FailingLookup)
            .await
            .expect_err("embedding failure");
        assert!(format!("{error:#}").contains("failed to embed issue #1"));
    }

    #[tokio::test]
    async fn regression_uninitialized_store_fails_fast() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[("crash on save", at_cosine(1.0))]));
        let judge = Arc::new(RecordingJudge::new(verdict(false, &[])));
        let store = Arc::new(SqliteVectorStore::open_in_memory().expect("open store"));
        let classifier = classifier(embeddings, store, judge);
        let error = classifier
            .classify(&issue(1, "crash on save", true), &[], &FailingLookup)
            .await
            .expect_err("uninitialized store");
        assert!(matches!(
            error.downcast_ref::<triage_vector::VectorError>(),
            Some(triage_vector::VectorError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn regression_cached_vectors_of_stale_dimensions_are_re_embedded() {
        let embeddings = Arc::new(TitleEmbeddings::new(&[
            ("crash on save", at_cosine(1.0)),
            ("save crashes", at_cosine(0.97)),
        ]));
        let store = Arc::new(VolatileVectorStore::new());
        let pull_request = |number: u64, title: &str| TriageItem {
            identity: ContentIdentity::PullRequest {
                number,
                head_sha: format!("sha{number}"),
            },
            title: title.to_string(),
            body: format!("body of {title}"),
            url: format!("https://github.com/acme/widgets/pull/{number}"),
            created_at: Utc::now(),
            is_open: true,
        };
        let item = pull_request(1, "crash on save");
        let sibling = pull_request(2, "save crashes");
        // Written before the embedding dimensions were changed.
        for stale in [&item, &sibling] {
            store
                .store_embedding(&stale.cache_key(), &[1.0, 0.0, 0.0], &stale.metadata())
                .expect("seed store");
        }
        let judge = Arc::new(RecordingJudge::new(verdict(true, &[(2, 0.96)])));
        let classifier = DuplicateClassifier::new(
            ItemEmbedder::new(embeddings.clone(), "test-embedding", Some(2)),
            store.clone(),
            judge.clone(),
            DedupeConfig::default(),
        );

        let outcome = classifier
            .classify(&item, &[item.clone(), sibling.clone()], &FailingLookup)
            .await
            .expect("classify");

        assert_eq!(embeddings.calls(), vec!["crash on save", "save crashes"]);
        assert_eq!(judge.seen(), vec![vec![2]]);
        assert_eq!(outcome.status, DedupeStatus::Duplicate);
        for refreshed in ["pr-sha1", "pr-sha2"] {
            let vector = store.get_embedding(refreshed).expect("read").expect("cached");
            assert_eq!(vector.len(), 2);
        }
    }

    #[test]
    fn unit_percent_scale_similarity_is_normalized_before_thresholds() {
        let config = DedupeConfig::default();
        let outcome = classify_verdict(&verdict(true, &[(7, 86.6)]), &[candidate(7, 0.9)], &config);
        assert_eq!(outcome.status, DedupeStatus::Duplicate);
        assert!((outcome.similarity - 0.866).abs() < 1e-9);
        assert_eq!(outcome.targets[0].number, 7);
    }

    #[test]
    fn regression_judge_similarity_of_two_classifies_distinct() {
        let config = DedupeConfig::default();
        let outcome = classify_verdict(&verdict(true, &[(7, 2.0)]), &[candidate(7, 0.9)], &config);
        assert_eq!(outcome.status, DedupeStatus::Distinct);
        assert!(outcome.targets.is_empty());
        assert_eq!(outcome.similarity, 0.0);
    }

    #[test]
    fn functional_low_confidence_duplicate_flag_is_demoted() {
        let config = DedupeConfig::default();
        let related = classify_verdict(&verdict(true, &[(7, 0.8)]), &[candidate(7, 0.9)], &config);
        assert_eq!(related.status, DedupeStatus::Related);
        assert_eq!(related.targets.len(), 1);

        let distinct = classify_verdict(&verdict(true, &[(7, 0.5)]), &[candidate(7, 0.9)], &config);
        assert_eq!(distinct.status, DedupeStatus::Distinct);
    }

    #[test]
    fn functional_fallback_verdict_uses_search_similarity() {
        let config = DedupeConfig::default();
        let fallback = DuplicateVerdict::fallback("judge unavailable");

        let related = classify_verdict(&fallback, &[candidate(7, 0.8), candidate(8, 0.72)], &config);
        assert_eq!(related.status, DedupeStatus::Related);
        assert_eq!(related.targets.len(), 1);
        assert_eq!(related.targets[0].number, 7);

        let distinct = classify_verdict(&fallback, &[candidate(7, 0.71)], &config);
        assert_eq!(distinct.status, DedupeStatus::Distinct);
    }

    #[test]
    fn regression_judge_items_outside_candidates_are_ignored() {
        let config = DedupeConfig::default();
        let outcome = classify_verdict(
            &verdict(true, &[(99, 0.99), (7, 0.9)]),
            &[candidate(7, 0.9)],
            &config,
        );
        assert_eq!(outcome.status, DedupeStatus::Duplicate);
        assert_eq!(outcome.targets.len(), 1);
        assert_eq!(outcome.targets[0].number, 7);
        assert_eq!(outcome.targets[0].url, "https://github.com/acme/widgets/issues/7");
    }
}

//! Ranked caption search.
//!
//! Orchestrates the query expander and the caption store: one index lookup
//! per variant with an early stop, merge and dedup, variant-weighted
//! scoring, per-video clustering, and a deterministic final ordering.

use crate::config::{ExpansionStrategy, SearchSettings, Settings};
use crate::error::{KilnsError, Result};
use crate::expand::{
    ConceptExpander, DeterministicExpander, QueryExpander, Variant, VariantKind,
};
use crate::store::{CaptionStore, SqliteStore, TextMatch};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A scored, deduplicated candidate ready for assembly.
#[derive(Debug, Clone)]
pub struct RankedMatch {
    /// The underlying index hit.
    pub hit: TextMatch,
    /// The variant that found it.
    pub variant_text: String,
    pub variant_kind: VariantKind,
    /// Other query variants whose text also appears in the segment.
    pub cooccurring: Vec<String>,
    /// Final relevance (higher is better).
    pub score: f64,
}

/// The ranked search engine.
pub struct SearchEngine {
    store: Arc<dyn CaptionStore>,
    expander: Arc<dyn QueryExpander>,
    fallback: DeterministicExpander,
    config: SearchSettings,
    expansion_timeout: Duration,
}

impl SearchEngine {
    /// Create an engine over explicit components.
    pub fn new(
        store: Arc<dyn CaptionStore>,
        expander: Arc<dyn QueryExpander>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            expander,
            fallback: DeterministicExpander::new(
                settings.expansion.synonyms.clone(),
                settings.expansion.max_phrase_variants,
            ),
            config: settings.search.clone(),
            expansion_timeout: Duration::from_secs(settings.expansion.timeout_seconds),
        }
    }

    /// Create an engine from settings, opening the configured store.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn CaptionStore> = Arc::new(SqliteStore::new(&settings.sqlite_path())?);

        let expander: Arc<dyn QueryExpander> = match settings.expansion.strategy {
            ExpansionStrategy::Deterministic => Arc::new(DeterministicExpander::new(
                settings.expansion.synonyms.clone(),
                settings.expansion.max_phrase_variants,
            )),
            ExpansionStrategy::Concept => {
                info!("Using concept expansion ({})", settings.expansion.model);
                Arc::new(ConceptExpander::new(&settings.expansion.model))
            }
        };

        Ok(Self::new(store, expander, settings))
    }

    /// Get a reference to the store.
    pub fn store(&self) -> Arc<dyn CaptionStore> {
        self.store.clone()
    }

    /// Run a query end to end. An empty result means no match anywhere;
    /// the caller decides how to label that.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedMatch>> {
        let limit = if limit == 0 {
            self.config.default_limit
        } else {
            limit.min(self.config.max_limit)
        };

        let variants = self.expand_with_fallback(query).await?;
        debug!("Expanded into {} variants", variants.len());

        let candidates = match self.collect_candidates(&variants).await {
            Ok(c) => c,
            Err(e) if e.is_storage() && self.config.fault_tolerant_reads => {
                warn!("Degrading storage error to empty result: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let scored = self.score(candidates, &variants);
        let mut clustered = self.cluster(scored);

        clustered.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.hit.upload_date.cmp(&a.hit.upload_date))
                .then_with(|| a.hit.segment.video_id.cmp(&b.hit.segment.video_id))
                .then_with(|| a.hit.segment.sequence_number.cmp(&b.hit.segment.sequence_number))
        });
        clustered.truncate(limit);

        info!("Query {:?} produced {} results", query, clustered.len());
        Ok(clustered)
    }

    /// Expand the query, falling back to the deterministic strategy when the
    /// configured expander fails or runs past its timeout.
    async fn expand_with_fallback(&self, query: &str) -> Result<Vec<Variant>> {
        match tokio::time::timeout(self.expansion_timeout, self.expander.expand(query)).await {
            Ok(Ok(variants)) if !variants.is_empty() => Ok(variants),
            Ok(Err(e @ KilnsError::Validation(_))) => Err(e),
            Ok(other) => {
                if let Err(e) = other {
                    warn!("Expansion failed, using deterministic fallback: {}", e);
                }
                self.fallback.expand(query).await
            }
            Err(_) => {
                warn!(
                    "{}",
                    KilnsError::ExpansionTimeout(self.expansion_timeout.as_secs())
                );
                self.fallback.expand(query).await
            }
        }
    }

    /// One lookup per variant, in priority order, stopping once enough
    /// distinct videos have matched. Exact (video, sequence) duplicates keep
    /// their first-seen, highest-priority variant.
    async fn collect_candidates(&self, variants: &[Variant]) -> Result<Vec<(usize, TextMatch)>> {
        let mut candidates: Vec<(usize, TextMatch)> = Vec::new();
        let mut seen: HashSet<(String, i64)> = HashSet::new();
        let mut videos: HashSet<String> = HashSet::new();

        for (index, variant) in variants.iter().enumerate() {
            if videos.len() >= self.config.target_videos {
                debug!(
                    "Reached {} distinct videos after {} variants",
                    videos.len(),
                    index
                );
                break;
            }

            let rows = self
                .store
                .query_text(&variant.text, self.config.variant_fetch_limit)
                .await?;

            for row in rows {
                let key = (row.segment.video_id.clone(), row.segment.sequence_number);
                if seen.insert(key) {
                    videos.insert(row.segment.video_id.clone());
                    candidates.push((index, row));
                }
            }
        }

        Ok(candidates)
    }

    /// Score each candidate inside its variant's band. Raw index relevance
    /// is squashed below 1.0, so bands for consecutive variants stay
    /// disjoint as long as priority_decay <= 4/7: an exact-phrase hit
    /// always outranks a single-word fallback hit.
    fn score(&self, candidates: Vec<(usize, TextMatch)>, variants: &[Variant]) -> Vec<RankedMatch> {
        candidates
            .into_iter()
            .map(|(index, hit)| {
                let text = hit.segment.text.to_lowercase();
                let cooccurring: Vec<String> = variants
                    .iter()
                    .enumerate()
                    .filter(|(j, v)| *j != index && v.text != variants[index].text)
                    .filter(|(_, v)| text.contains(&v.text))
                    .map(|(_, v)| v.text.clone())
                    .collect();

                let weight = self.config.priority_decay.powi(index as i32);
                // bm25 can go non-negative in degenerate corpora (a term in
                // every row); clamp so raw_norm stays inside [0, 1)
                let raw = hit.raw_score.max(0.0);
                let raw_norm = raw / (1.0 + raw);
                let cooccur = if cooccurring.is_empty() { 0.0 } else { 0.5 };

                RankedMatch {
                    variant_text: variants[index].text.clone(),
                    variant_kind: variants[index].kind,
                    cooccurring,
                    score: weight * (2.0 + raw_norm + cooccur),
                    hit,
                }
            })
            .collect()
    }

    /// Within one video, matches closer together than the cluster window
    /// collapse to their highest-scoring representative.
    fn cluster(&self, mut scored: Vec<RankedMatch>) -> Vec<RankedMatch> {
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.hit.segment.sequence_number.cmp(&b.hit.segment.sequence_number))
        });

        let window = self.config.cluster_window_seconds;
        let mut kept: Vec<RankedMatch> = Vec::new();

        for candidate in scored {
            let shadowed = kept.iter().any(|k| {
                k.hit.segment.video_id == candidate.hit.segment.video_id
                    && (k.hit.segment.start_seconds - candidate.hit.segment.start_seconds).abs()
                        < window
            });
            if !shadowed {
                kept.push(candidate);
            }
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CaptionSegment, NewSegment, StoreStats, Video, VideoSummary};

    async fn seeded_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::in_memory().unwrap())
    }

    async fn add_video(store: &SqliteStore, id: &str, upload_date: &str, segments: &[(f64, &str)]) {
        let mut video = Video::new(id, format!("Episode {}", id));
        video.upload_date = Some(upload_date.to_string());
        store.upsert_video(&video).await.unwrap();

        let rows: Vec<NewSegment> = segments
            .iter()
            .enumerate()
            .map(|(i, (start, text))| NewSegment {
                sequence_number: i as i64,
                start_seconds: *start,
                end_seconds: *start + 4.0,
                text: text.to_string(),
            })
            .collect();
        store.append_segments(id, &rows).await.unwrap();
    }

    fn engine(store: Arc<SqliteStore>) -> SearchEngine {
        let settings = Settings::default();
        let expander = Arc::new(DeterministicExpander::new(
            settings.expansion.synonyms.clone(),
            settings.expansion.max_phrase_variants,
        ));
        SearchEngine::new(store, expander, &settings)
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let store = seeded_store().await;
        let engine = engine(store);

        for query in ["", "   "] {
            let err = engine.search(query, 10).await.unwrap_err();
            assert!(matches!(err, KilnsError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_exact_phrase_hit_found() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20240101",
            &[(330.0, "Lewis discusses medieval literature with his tutor.")],
        )
        .await;

        let results = engine(store).search("medieval literature", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hit.segment.video_id, "V1");
        assert_eq!(results[0].hit.segment.start_seconds, 330.0);
        assert_eq!(results[0].variant_kind, VariantKind::Exact);
    }

    #[tokio::test]
    async fn test_exact_phrase_outranks_single_word_fallback() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20230101",
            &[(10.0, "he lectured on medieval literature at Oxford")],
        )
        .await;
        add_video(
            &store,
            "V2",
            "20240101",
            &[(10.0, "literature literature literature everywhere in literature")],
        )
        .await;

        let results = engine(store).search("medieval literature", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].hit.segment.video_id, "V1");
        assert_eq!(results[0].variant_kind, VariantKind::Exact);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_nearby_matches_collapse_to_one() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20240101",
            &[
                (100.0, "the wardrobe stood in the spare room"),
                (105.0, "inside the wardrobe hung fur coats"),
            ],
        )
        .await;

        let results = engine(store).search("wardrobe", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_far_apart_matches_both_survive() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20240101",
            &[
                (100.0, "the wardrobe stood in the spare room"),
                (500.0, "he opened the wardrobe once more"),
            ],
        )
        .await;

        let engine = engine(store);
        let results = engine.search("wardrobe", 10).await.unwrap();
        assert_eq!(results.len(), 2);

        let window = Settings::default().search.cluster_window_seconds;
        for a in &results {
            for b in &results {
                if a.hit.segment.sequence_number != b.hit.segment.sequence_number {
                    assert!(
                        (a.hit.segment.start_seconds - b.hit.segment.start_seconds).abs() >= window
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_limit_and_upload_date_tie_break() {
        let store = seeded_store().await;
        add_video(&store, "V1", "20230101", &[(10.0, "Aslan returns to Narnia")]).await;
        add_video(&store, "V2", "20240101", &[(10.0, "Aslan returns to Narnia")]).await;

        let results = engine(store).search("Narnia", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hit.segment.video_id, "V2");
    }

    #[tokio::test]
    async fn test_unmatched_query_returns_empty() {
        let store = seeded_store().await;
        add_video(&store, "V1", "20240101", &[(10.0, "perfectly ordinary content")]).await;

        let results = engine(store)
            .search("zzz_no_such_term_qqq", 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_no_duplicate_segments_in_results() {
        let store = seeded_store().await;
        // Matched by the exact phrase, by both single words, and far enough
        // from itself that clustering is not involved.
        add_video(
            &store,
            "V1",
            "20240101",
            &[(10.0, "medieval literature was his first love")],
        )
        .await;

        let results = engine(store).search("medieval literature", 10).await.unwrap();
        let mut keys: Vec<(String, i64)> = results
            .iter()
            .map(|r| (r.hit.segment.video_id.clone(), r.hit.segment.sequence_number))
            .collect();
        keys.sort();
        let before = keys.len();
        keys.dedup();
        assert_eq!(before, keys.len());
        assert_eq!(results[0].variant_kind, VariantKind::Exact);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20230101",
            &[(10.0, "a letter about medieval poetry"), (400.0, "more on literature")],
        )
        .await;
        add_video(
            &store,
            "V2",
            "20240101",
            &[(10.0, "medieval literature and its tutors")],
        )
        .await;

        let engine = engine(store);
        let first = engine.search("medieval literature", 10).await.unwrap();
        let second = engine.search("medieval literature", 10).await.unwrap();

        let order = |rs: &[RankedMatch]| {
            rs.iter()
                .map(|r| (r.hit.segment.video_id.clone(), r.hit.segment.sequence_number))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[tokio::test]
    async fn test_search_to_assembled_response() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20240101",
            &[(330.0, "Lewis discusses medieval literature with his tutor.")],
        )
        .await;

        let ranked = engine(store).search("medieval literature", 10).await.unwrap();
        let response = crate::assemble::assemble(ranked);

        assert_eq!(response.status, crate::assemble::SearchStatus::Ok);
        assert_eq!(response.results[0].video_id, "V1");
        assert!(response.results[0].youtube_url.ends_with("t=330s"));
        assert_eq!(response.results[0].start_time, "05:30");
    }

    struct FailingExpander;

    #[async_trait::async_trait]
    impl QueryExpander for FailingExpander {
        async fn expand(&self, _query: &str) -> Result<Vec<Variant>> {
            Err(KilnsError::Expansion("model unavailable".to_string()))
        }
    }

    struct SlowExpander;

    #[async_trait::async_trait]
    impl QueryExpander for SlowExpander {
        async fn expand(&self, _query: &str) -> Result<Vec<Variant>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![Variant::new("unreachable", VariantKind::Exact)])
        }
    }

    struct BrokenStore;

    fn disk_failure<T>() -> Result<T> {
        Err(KilnsError::Storage("disk failure".to_string()))
    }

    #[async_trait::async_trait]
    impl CaptionStore for BrokenStore {
        async fn upsert_video(&self, _video: &Video) -> Result<String> {
            disk_failure()
        }
        async fn append_segments(&self, _video_id: &str, _segments: &[NewSegment]) -> Result<usize> {
            disk_failure()
        }
        async fn query_text(&self, _term: &str, _limit: usize) -> Result<Vec<TextMatch>> {
            disk_failure()
        }
        async fn get_video(&self, _video_id: &str) -> Result<Option<Video>> {
            disk_failure()
        }
        async fn get_segments(&self, _video_id: &str) -> Result<Vec<CaptionSegment>> {
            disk_failure()
        }
        async fn list_videos(&self) -> Result<Vec<VideoSummary>> {
            disk_failure()
        }
        async fn delete_video(&self, _video_id: &str) -> Result<usize> {
            disk_failure()
        }
        async fn stats(&self) -> Result<StoreStats> {
            disk_failure()
        }
    }

    #[tokio::test]
    async fn test_failed_expansion_falls_back_to_deterministic() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20240101",
            &[(330.0, "Lewis discusses medieval literature with his tutor.")],
        )
        .await;

        let settings = Settings::default();
        let engine = SearchEngine::new(store, Arc::new(FailingExpander), &settings);

        let results = engine.search("medieval literature", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hit.segment.video_id, "V1");
    }

    #[tokio::test]
    async fn test_expansion_timeout_falls_back_to_deterministic() {
        let store = seeded_store().await;
        add_video(&store, "V1", "20240101", &[(10.0, "a walk out to the wardrobe")]).await;

        let mut settings = Settings::default();
        settings.expansion.timeout_seconds = 1;
        let engine = SearchEngine::new(store, Arc::new(SlowExpander), &settings);

        let results = engine.search("wardrobe", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_error_propagates_by_default() {
        let settings = Settings::default();
        let expander = Arc::new(DeterministicExpander::new(
            settings.expansion.synonyms.clone(),
            settings.expansion.max_phrase_variants,
        ));
        let engine = SearchEngine::new(Arc::new(BrokenStore), expander, &settings);

        let err = engine.search("wardrobe", 10).await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_fault_tolerant_reads_degrade_to_empty() {
        let mut settings = Settings::default();
        settings.search.fault_tolerant_reads = true;
        let expander = Arc::new(DeterministicExpander::new(
            settings.expansion.synonyms.clone(),
            settings.expansion.max_phrase_variants,
        ));
        let engine = SearchEngine::new(Arc::new(BrokenStore), expander, &settings);

        let results = engine.search("wardrobe", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_cooccurrence_recorded() {
        let store = seeded_store().await;
        add_video(
            &store,
            "V1",
            "20240101",
            &[(10.0, "his tutor praised medieval literature")],
        )
        .await;

        let results = engine(store)
            .search("medieval literature tutor", 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].cooccurring.is_empty());
    }
}

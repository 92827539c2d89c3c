//! BALLAST Test Utilities
//!
//! Centralized test infrastructure for the BALLAST workspace:
//! - Mock reference fetcher and model client
//! - Proptest generators for batches and configs
//! - Test fixtures for common scenarios
//! - Custom assertions for batch outcomes

pub use ballast_core::{BallastError, BallastResult, Context, ManualClock, UpstreamError};
pub use ballast_pipeline::{Category, Characteristic, ListingItem, Subject};

use async_trait::async_trait;
use ballast_cache::{KeySpace, ReferenceFetcher};
use ballast_pipeline::{ModelClient, ModelRequest, ModelResponse, ModelTask};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK FETCHER
// ============================================================================

/// Reference fetcher that counts calls and fails on demand.
#[derive(Debug, Default)]
pub struct CountingFetcher {
    parents: Vec<Category>,
    subjects: Vec<Subject>,
    characteristics: HashMap<String, Vec<Characteristic>>,
    latency: Duration,
    parent_calls: AtomicUsize,
    subject_calls: AtomicUsize,
    characteristic_calls: AtomicUsize,
    per_subject: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<KeySpace>>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parents(mut self, parents: Vec<Category>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_subjects(mut self, subjects: Vec<Subject>) -> Self {
        self.subjects = subjects;
        self
    }

    pub fn with_characteristics(
        mut self,
        subject_id: impl Into<String>,
        characteristics: Vec<Characteristic>,
    ) -> Self {
        self.characteristics.insert(subject_id.into(), characteristics);
        self
    }

    /// Delay every fetch; the delay is interrupted by cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every fetch of `key_space` fail until [`recover`](Self::recover).
    pub fn fail(&self, key_space: KeySpace) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key_space);
    }

    pub fn recover(&self, key_space: KeySpace) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key_space);
    }

    /// Number of fetches attempted for `key_space`, failed ones included.
    pub fn calls(&self, key_space: KeySpace) -> usize {
        match key_space {
            KeySpace::Parents => self.parent_calls.load(Ordering::SeqCst),
            KeySpace::Subjects => self.subject_calls.load(Ordering::SeqCst),
            KeySpace::Characteristics => self.characteristic_calls.load(Ordering::SeqCst),
        }
    }

    pub fn characteristic_calls_for(&self, subject_id: &str) -> usize {
        self.per_subject
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject_id)
            .copied()
            .unwrap_or(0)
    }

    async fn begin(&self, ctx: &Context, key_space: KeySpace) -> BallastResult<()> {
        if !self.latency.is_zero() {
            tokio::select! {
                biased;
                reason = ctx.cancelled() => {
                    return Err(reason.into_error(format!("fetch_{}", key_space)).into());
                }
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key_space);
        if failing {
            return Err(UpstreamError::FetchFailed {
                key_space: key_space.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceFetcher for CountingFetcher {
    type Parent = Category;
    type Subject = Subject;
    type Characteristic = Characteristic;

    async fn fetch_parents(&self, ctx: &Context) -> BallastResult<Vec<Category>> {
        self.parent_calls.fetch_add(1, Ordering::SeqCst);
        self.begin(ctx, KeySpace::Parents).await?;
        Ok(self.parents.clone())
    }

    async fn fetch_subjects(&self, ctx: &Context) -> BallastResult<Vec<Subject>> {
        self.subject_calls.fetch_add(1, Ordering::SeqCst);
        self.begin(ctx, KeySpace::Subjects).await?;
        Ok(self.subjects.clone())
    }

    async fn fetch_characteristics(
        &self,
        ctx: &Context,
        subject_id: &str,
    ) -> BallastResult<Vec<Characteristic>> {
        self.characteristic_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_subject
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subject_id.to_string())
            .or_insert(0) += 1;
        self.begin(ctx, KeySpace::Characteristics).await?;
        Ok(self
            .characteristics
            .get(subject_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// MOCK MODEL
// ============================================================================

/// Model client answering from fixed tables.
///
/// Classification answers come from a per-item table, falling back to a
/// default; the same goes for extraction text. Items registered with
/// [`fail_for`](Self::fail_for) get an upstream error carrying the message.
#[derive(Debug, Default)]
pub struct FixedModelClient {
    classifications: HashMap<String, String>,
    default_classification: Option<String>,
    extractions: HashMap<String, String>,
    default_extraction: String,
    failures: HashMap<String, String>,
    latency: Duration,
    calls: AtomicUsize,
}

impl FixedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(mut self, item_id: impl Into<String>, answer: impl Into<String>) -> Self {
        self.classifications.insert(item_id.into(), answer.into());
        self
    }

    pub fn classify_all(mut self, answer: impl Into<String>) -> Self {
        self.default_classification = Some(answer.into());
        self
    }

    pub fn extract(mut self, item_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.extractions.insert(item_id.into(), text.into());
        self
    }

    pub fn extract_all(mut self, text: impl Into<String>) -> Self {
        self.default_extraction = text.into();
        self
    }

    pub fn fail_for(mut self, item_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(item_id.into(), message.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for FixedModelClient {
    fn name(&self) -> &str {
        "fixed-model"
    }

    async fn complete(&self, ctx: &Context, request: ModelRequest) -> BallastResult<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::select! {
                biased;
                reason = ctx.cancelled() => {
                    return Err(reason.into_error("fixed_model.complete").into());
                }
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        if let Some(message) = self.failures.get(&request.item_id) {
            return Err(UpstreamError::RequestFailed {
                service: self.name().to_string(),
                status: 500,
                message: message.clone(),
            }
            .into());
        }
        let text = match request.task {
            ModelTask::Classify => self
                .classifications
                .get(&request.item_id)
                .or(self.default_classification.as_ref())
                .cloned()
                .unwrap_or_default(),
            ModelTask::Extract => self
                .extractions
                .get(&request.item_id)
                .cloned()
                .unwrap_or_else(|| self.default_extraction.clone()),
        };
        Ok(ModelResponse::new(text))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for BALLAST inputs.

    use super::*;
    use ballast_fanout::BatchItem;
    use proptest::prelude::*;

    /// Generate an item id such as `img-17`.
    pub fn arb_item_id() -> impl Strategy<Value = String> {
        (0u32..10_000).prop_map(|n| format!("img-{}", n))
    }

    /// Generate a batch of up to `max` items with unique ids.
    pub fn arb_batch(max: usize) -> impl Strategy<Value = Vec<BatchItem<u32>>> {
        prop::collection::btree_set(arb_item_id(), 0..=max).prop_map(|ids| {
            ids.into_iter()
                .enumerate()
                .map(|(i, id)| BatchItem::new(id, i as u32))
                .collect()
        })
    }

    /// Generate a batch of listings with unique ids.
    pub fn arb_listing_batch(max: usize) -> impl Strategy<Value = Vec<ListingItem>> {
        prop::collection::btree_set(arb_item_id(), 0..=max).prop_map(|ids| {
            ids.into_iter()
                .map(|id| ListingItem::new(id.clone(), format!("listing {}", id)))
                .collect()
        })
    }

    /// Generate a concurrency bound, zero included.
    pub fn arb_concurrency() -> impl Strategy<Value = usize> {
        0usize..16
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::sync::Arc;

    pub fn sample_categories() -> Vec<Category> {
        vec![
            Category {
                id: "c-apparel".to_string(),
                name: "Apparel".to_string(),
            },
            Category {
                id: "c-bags".to_string(),
                name: "Bags".to_string(),
            },
        ]
    }

    pub fn sample_subjects() -> Vec<Subject> {
        vec![
            Subject {
                id: "s-sneakers".to_string(),
                name: "Sneakers".to_string(),
                parent_id: "c-apparel".to_string(),
            },
            Subject {
                id: "s-backpacks".to_string(),
                name: "Backpacks".to_string(),
                parent_id: "c-bags".to_string(),
            },
        ]
    }

    /// `color` (required, red/blue) and `brand` (optional).
    pub fn sample_characteristics() -> Vec<Characteristic> {
        vec![
            Characteristic::new("color", true).with_allowed_values(["red", "blue"]),
            Characteristic::new("brand", false),
        ]
    }

    /// A fetcher loaded with the sample catalog for both subjects.
    pub fn sample_fetcher() -> CountingFetcher {
        CountingFetcher::new()
            .with_parents(sample_categories())
            .with_subjects(sample_subjects())
            .with_characteristics("s-sneakers", sample_characteristics())
            .with_characteristics("s-backpacks", sample_characteristics())
    }

    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_epoch())
    }

    /// Listings `img1..=imgN`.
    pub fn listings(n: usize) -> Vec<ListingItem> {
        (1..=n)
            .map(|i| ListingItem::new(format!("img{}", i), format!("listing {}", i)))
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for batch outcomes.

    use ballast_fanout::BatchOutcome;

    /// Assert every id is in exactly one map and no other id is present.
    #[track_caller]
    pub fn assert_partition<V>(outcome: &BatchOutcome<V>, ids: &[String]) {
        assert_eq!(
            outcome.len(),
            ids.len(),
            "outcome holds {} ids, batch had {}",
            outcome.len(),
            ids.len()
        );
        for id in ids {
            let in_success = outcome.success(id).is_some();
            let in_failure = outcome.failure(id).is_some();
            assert!(
                in_success ^ in_failure,
                "id {} in success={} failure={}",
                id,
                in_success,
                in_failure
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_fetcher_scripted_failure() {
        let fetcher = fixtures::sample_fetcher();
        let ctx = Context::background();

        assert_eq!(fetcher.fetch_parents(&ctx).await.unwrap().len(), 2);
        fetcher.fail(KeySpace::Parents);
        assert!(fetcher.fetch_parents(&ctx).await.is_err());
        fetcher.recover(KeySpace::Parents);
        assert!(fetcher.fetch_parents(&ctx).await.is_ok());
        assert_eq!(fetcher.calls(KeySpace::Parents), 3);

        fetcher.fetch_characteristics(&ctx, "s-sneakers").await.unwrap();
        assert_eq!(fetcher.characteristic_calls_for("s-sneakers"), 1);
        assert_eq!(fetcher.characteristic_calls_for("s-backpacks"), 0);
    }

    #[tokio::test]
    async fn test_fixed_model_tables() {
        let model = FixedModelClient::new()
            .classify_all("Sneakers")
            .classify("img2", "Backpacks")
            .extract_all("color: red")
            .fail_for("img3", "processing failed");
        let ctx = Context::background();
        let request = |id: &str, task| ModelRequest {
            item_id: id.to_string(),
            task,
            input: String::new(),
            options: vec![],
        };

        let a = model.complete(&ctx, request("img1", ModelTask::Classify)).await.unwrap();
        let b = model.complete(&ctx, request("img2", ModelTask::Classify)).await.unwrap();
        let c = model.complete(&ctx, request("img1", ModelTask::Extract)).await.unwrap();
        let err = model.complete(&ctx, request("img3", ModelTask::Classify)).await.unwrap_err();

        assert_eq!(a.text, "Sneakers");
        assert_eq!(b.text, "Backpacks");
        assert_eq!(c.text, "color: red");
        assert!(err.to_string().contains("processing failed"));
        assert_eq!(model.calls(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_batch_ids_unique(batch in generators::arb_batch(30)) {
            let ids: HashSet<&str> = batch.iter().map(|item| item.id.as_str()).collect();
            prop_assert_eq!(ids.len(), batch.len());
        }
    }
}

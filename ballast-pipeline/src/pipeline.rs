//! Enrichment stage wiring the cache, the executor and a model.
//!
//! A run loads the category tree and the subject list once through the
//! [`ReferenceCache`], then fans every item out to the model:
//!
//! 1. classify the item into one subject
//! 2. look up that subject's characteristics (cached, bounded)
//! 3. extract attribute values and check them against the characteristics
//!
//! Reference lookups that fail before the fan-out abort the run. Anything
//! that fails per item is recorded in the report and the rest of the batch
//! carries on.

use ballast_cache::{CacheStats, ReferenceCache, ReferenceFetcher};
use ballast_core::{BallastResult, Context, Timestamp};
use ballast_fanout::{FanOutExecutor, ItemFailure, WorkItem};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{find_subject, Category, Characteristic, Subject};
use crate::error::EnrichError;
use crate::model::{ModelClient, ModelRequest, ModelTask};

/// One listing to enrich.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    pub id: String,
    pub description: String,
}

impl ListingItem {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

impl WorkItem for ListingItem {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub item_id: String,
    pub subject_id: String,
    pub subject_name: String,
    /// Name of the subject's parent category, if known.
    pub category: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub item_id: String,
    pub message: String,
    pub cancelled: bool,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub total: usize,
    /// Sorted by item id.
    pub enriched: Vec<EnrichedItem>,
    /// Sorted by item id.
    pub failures: Vec<FailedItem>,
    pub cache: CacheStats,
}

impl PipelineReport {
    pub fn succeeded(&self) -> usize {
        self.enriched.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn cancelled(&self) -> usize {
        self.failures.iter().filter(|f| f.cancelled).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn item(&self, item_id: &str) -> Option<&EnrichedItem> {
        self.enriched.iter().find(|item| item.item_id == item_id)
    }

    pub fn failure(&self, item_id: &str) -> Option<&FailedItem> {
        self.failures.iter().find(|f| f.item_id == item_id)
    }
}

/// Enrichment pipeline over a catalog fetcher `F` and a model `M`.
pub struct EnrichmentPipeline<F, M>
where
    F: ReferenceFetcher<Parent = Category, Subject = Subject, Characteristic = Characteristic>,
    M: ModelClient,
{
    cache: Arc<ReferenceCache<F>>,
    model: Arc<M>,
    executor: FanOutExecutor,
}

impl<F, M> EnrichmentPipeline<F, M>
where
    F: ReferenceFetcher<Parent = Category, Subject = Subject, Characteristic = Characteristic>,
    M: ModelClient,
{
    pub fn new(cache: Arc<ReferenceCache<F>>, model: Arc<M>, executor: FanOutExecutor) -> Self {
        Self {
            cache,
            model,
            executor,
        }
    }

    pub fn cache(&self) -> &Arc<ReferenceCache<F>> {
        &self.cache
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    /// Enrich `items`.
    ///
    /// Errors only when the reference lists cannot be loaded or the batch has
    /// duplicate ids.
    pub async fn run(&self, ctx: &Context, items: Vec<ListingItem>) -> BallastResult<PipelineReport> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let total = items.len();
        tracing::info!(%run_id, items = total, model = self.model.name(), "Pipeline run started");

        let stage = Arc::new(EnrichStage {
            parents: self.cache.get_parents(ctx).await?,
            subjects: self.cache.get_subjects(ctx).await?,
            cache: Arc::clone(&self.cache),
            model: Arc::clone(&self.model),
        });

        let outcome = self
            .executor
            .run(ctx, items, move |ctx: Context, item: ListingItem| {
                let stage = Arc::clone(&stage);
                async move { stage.enrich(&ctx, item).await }
            })
            .await?;

        let (successes, failures) = outcome.into_parts();
        let mut enriched: Vec<EnrichedItem> = successes.into_values().collect();
        enriched.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        let mut failures: Vec<FailedItem> = failures
            .into_iter()
            .map(|(item_id, failure)| FailedItem {
                cancelled: matches!(failure, ItemFailure::Cancelled { .. }),
                message: failure.to_string(),
                item_id,
            })
            .collect();
        failures.sort_by(|a, b| a.item_id.cmp(&b.item_id));

        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total,
            enriched,
            failures,
            cache: self.cache.stats(),
        };

        tracing::info!(
            %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            cache_hit_rate = report.cache.hit_rate(),
            "Pipeline run completed"
        );
        Ok(report)
    }
}

struct EnrichStage<F: ReferenceFetcher, M> {
    cache: Arc<ReferenceCache<F>>,
    model: Arc<M>,
    parents: Arc<Vec<Category>>,
    subjects: Arc<Vec<Subject>>,
}

impl<F, M> EnrichStage<F, M>
where
    F: ReferenceFetcher<Parent = Category, Subject = Subject, Characteristic = Characteristic>,
    M: ModelClient,
{
    async fn enrich(&self, ctx: &Context, item: ListingItem) -> Result<EnrichedItem, EnrichError> {
        let classification = self
            .model
            .complete(
                ctx,
                ModelRequest {
                    item_id: item.id.clone(),
                    task: ModelTask::Classify,
                    input: item.description.clone(),
                    options: self.subjects.iter().map(|s| s.name.clone()).collect(),
                },
            )
            .await?;

        let subject = find_subject(&self.subjects, &classification.text)
            .cloned()
            .ok_or_else(|| EnrichError::UnknownSubject {
                answer: classification.text.trim().to_string(),
            })?;

        let characteristics = self.cache.get_characteristics(ctx, &subject.id).await?;
        let attributes = if characteristics.is_empty() {
            BTreeMap::new()
        } else {
            let extraction = self
                .model
                .complete(
                    ctx,
                    ModelRequest {
                        item_id: item.id.clone(),
                        task: ModelTask::Extract,
                        input: item.description,
                        options: characteristics.iter().map(|c| c.name.clone()).collect(),
                    },
                )
                .await?;
            check_attributes(&characteristics, extraction.attributes())?
        };

        let category = self
            .parents
            .iter()
            .find(|p| p.id == subject.parent_id)
            .map(|p| p.name.clone());

        Ok(EnrichedItem {
            item_id: item.id,
            subject_id: subject.id,
            subject_name: subject.name,
            category,
            attributes,
        })
    }
}

/// Keep only known characteristics and enforce required/allowed values.
fn check_attributes(
    characteristics: &[Characteristic],
    mut extracted: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, EnrichError> {
    let mut accepted = BTreeMap::new();
    for characteristic in characteristics {
        match extracted.remove(&characteristic.name) {
            Some(value) if !characteristic.accepts(&value) => {
                return Err(EnrichError::DisallowedValue {
                    name: characteristic.name.clone(),
                    value,
                });
            }
            Some(value) => {
                accepted.insert(characteristic.name.clone(), value);
            }
            None if characteristic.required => {
                return Err(EnrichError::MissingCharacteristic {
                    name: characteristic.name.clone(),
                });
            }
            None => {}
        }
    }
    Ok(accepted)
}

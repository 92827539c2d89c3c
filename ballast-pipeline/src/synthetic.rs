//! In-process catalog and model for running the pipeline without upstreams.

use async_trait::async_trait;
use ballast_cache::ReferenceFetcher;
use ballast_core::{BallastResult, Context};
use std::time::Duration;

use crate::catalog::{Category, Characteristic, Subject};
use crate::model::{ModelClient, ModelRequest, ModelResponse, ModelTask};
use crate::pipeline::ListingItem;

const CATEGORIES: &[(&str, &str)] = &[("c-apparel", "Apparel"), ("c-bags", "Bags")];

const SUBJECTS: &[(&str, &str, &str)] = &[
    ("s-sneakers", "Sneakers", "c-apparel"),
    ("s-jackets", "Jackets", "c-apparel"),
    ("s-backpacks", "Backpacks", "c-bags"),
];

const COLORS: &[&str] = &["red", "blue", "black"];

/// Fixed catalog with a small simulated latency per fetch.
#[derive(Debug, Clone)]
pub struct SyntheticCatalog {
    latency: Duration,
}

impl Default for SyntheticCatalog {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(5),
        }
    }
}

impl SyntheticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn pause(&self, ctx: &Context, operation: &str) -> BallastResult<()> {
        tokio::select! {
            biased;
            reason = ctx.cancelled() => Err(reason.into_error(operation).into()),
            _ = tokio::time::sleep(self.latency) => Ok(()),
        }
    }
}

#[async_trait]
impl ReferenceFetcher for SyntheticCatalog {
    type Parent = Category;
    type Subject = Subject;
    type Characteristic = Characteristic;

    async fn fetch_parents(&self, ctx: &Context) -> BallastResult<Vec<Category>> {
        self.pause(ctx, "synthetic.fetch_parents").await?;
        Ok(CATEGORIES
            .iter()
            .map(|(id, name)| Category {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect())
    }

    async fn fetch_subjects(&self, ctx: &Context) -> BallastResult<Vec<Subject>> {
        self.pause(ctx, "synthetic.fetch_subjects").await?;
        Ok(SUBJECTS
            .iter()
            .map(|(id, name, parent_id)| Subject {
                id: id.to_string(),
                name: name.to_string(),
                parent_id: parent_id.to_string(),
            })
            .collect())
    }

    async fn fetch_characteristics(
        &self,
        ctx: &Context,
        subject_id: &str,
    ) -> BallastResult<Vec<Characteristic>> {
        self.pause(ctx, "synthetic.fetch_characteristics").await?;
        let mut characteristics =
            vec![Characteristic::new("color", true).with_allowed_values(COLORS.iter().copied())];
        if subject_id == "s-sneakers" {
            characteristics.push(Characteristic::new("size", false));
        }
        Ok(characteristics)
    }
}

/// Keyword-matching stand-in for an AI model.
///
/// Classification picks the first option named in the input; extraction
/// reports the first known color and, when asked, a size token like `42`.
#[derive(Debug, Clone, Default)]
pub struct SyntheticModel;

impl SyntheticModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelClient for SyntheticModel {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn complete(&self, _ctx: &Context, request: ModelRequest) -> BallastResult<ModelResponse> {
        let input = request.input.to_lowercase();
        let text = match request.task {
            ModelTask::Classify => request
                .options
                .iter()
                .find(|option| input.contains(&option.to_lowercase()))
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            ModelTask::Extract => {
                let mut lines = Vec::new();
                if let Some(color) = COLORS.iter().find(|c| input.contains(*c)) {
                    lines.push(format!("color: {}", color));
                }
                if request.options.iter().any(|o| o == "size") {
                    if let Some(size) = input.split_whitespace().find(|w| w.parse::<u32>().is_ok()) {
                        lines.push(format!("size: {}", size));
                    }
                }
                lines.join("\n")
            }
        };
        Ok(ModelResponse::new(text))
    }
}

/// A deterministic batch of `n` listings cycling through every subject.
///
/// Every seventh listing has no color and so fails enrichment.
pub fn synthetic_batch(n: usize) -> Vec<ListingItem> {
    (0..n)
        .map(|i| {
            let (_, subject, _) = SUBJECTS[i % SUBJECTS.len()];
            let color = if i % 7 == 6 {
                "faded"
            } else {
                COLORS[i % COLORS.len()]
            };
            ListingItem::new(
                format!("item-{:04}", i),
                format!("{} {} size {}", color, subject.to_lowercase(), 38 + i % 8),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ids_unique_and_ordered() {
        let batch = synthetic_batch(20);
        assert_eq!(batch.len(), 20);
        assert_eq!(batch[0].id, "item-0000");
        assert_eq!(batch[19].id, "item-0019");
        assert!(batch[6].description.starts_with("faded"));
    }

    #[tokio::test]
    async fn test_model_classifies_and_extracts() {
        let model = SyntheticModel::new();
        let ctx = Context::background();

        let classified = model
            .complete(
                &ctx,
                ModelRequest {
                    item_id: "item-0000".to_string(),
                    task: ModelTask::Classify,
                    input: "red sneakers size 38".to_string(),
                    options: vec!["Jackets".to_string(), "Sneakers".to_string()],
                },
            )
            .await
            .unwrap();
        assert_eq!(classified.text, "Sneakers");

        let extracted = model
            .complete(
                &ctx,
                ModelRequest {
                    item_id: "item-0000".to_string(),
                    task: ModelTask::Extract,
                    input: "red sneakers size 38".to_string(),
                    options: vec!["color".to_string(), "size".to_string()],
                },
            )
            .await
            .unwrap();
        let attributes = extracted.attributes();
        assert_eq!(attributes.get("color").map(String::as_str), Some("red"));
        assert_eq!(attributes.get("size").map(String::as_str), Some("38"));
    }

    #[tokio::test]
    async fn test_catalog_respects_cancellation() {
        let catalog = SyntheticCatalog::new().with_latency(Duration::from_secs(5));
        let ctx = Context::background();
        ctx.cancel();
        let err = catalog.fetch_subjects(&ctx).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}

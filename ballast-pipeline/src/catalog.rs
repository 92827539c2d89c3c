//! Marketplace reference data and its HTTP fetcher.

use async_trait::async_trait;
use ballast_cache::ReferenceFetcher;
use ballast_client::ApiClient;
use ballast_core::{BallastResult, Context};
use serde::{Deserialize, Serialize};

/// Top-level marketplace category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Leaf category an item can be classified into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub parent_id: String,
}

/// Attribute a listing under a subject may or must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

impl Characteristic {
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            allowed_values: Vec::new(),
        }
    }

    pub fn with_allowed_values<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `value` is acceptable; an empty list accepts anything.
    pub fn accepts(&self, value: &str) -> bool {
        self.allowed_values.is_empty()
            || self
                .allowed_values
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(value))
    }
}

/// Find a subject by id or case-insensitive name.
pub fn find_subject<'a>(subjects: &'a [Subject], answer: &str) -> Option<&'a Subject> {
    let answer = answer.trim();
    subjects
        .iter()
        .find(|s| s.id == answer || s.name.eq_ignore_ascii_case(answer))
}

/// Reference fetcher backed by the marketplace catalog API.
///
/// - `GET categories`
/// - `GET subjects`
/// - `GET subjects/{id}/characteristics`
#[derive(Debug)]
pub struct CatalogFetcher {
    api: ApiClient,
}

impl CatalogFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ReferenceFetcher for CatalogFetcher {
    type Parent = Category;
    type Subject = Subject;
    type Characteristic = Characteristic;

    async fn fetch_parents(&self, ctx: &Context) -> BallastResult<Vec<Category>> {
        self.api.get_json(ctx, "categories").await
    }

    async fn fetch_subjects(&self, ctx: &Context) -> BallastResult<Vec<Subject>> {
        self.api.get_json(ctx, "subjects").await
    }

    async fn fetch_characteristics(
        &self,
        ctx: &Context,
        subject_id: &str,
    ) -> BallastResult<Vec<Characteristic>> {
        self.api
            .get_json(ctx, &format!("subjects/{}/characteristics", subject_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects() -> Vec<Subject> {
        vec![
            Subject {
                id: "s-1".to_string(),
                name: "Sneakers".to_string(),
                parent_id: "c-1".to_string(),
            },
            Subject {
                id: "s-2".to_string(),
                name: "Backpacks".to_string(),
                parent_id: "c-2".to_string(),
            },
        ]
    }

    #[test]
    fn test_find_subject_by_id_or_name() {
        let all = subjects();
        assert_eq!(find_subject(&all, "s-2").map(|s| s.name.as_str()), Some("Backpacks"));
        assert_eq!(find_subject(&all, "  sneakers ").map(|s| s.id.as_str()), Some("s-1"));
        assert!(find_subject(&all, "Hats").is_none());
    }

    #[test]
    fn test_characteristic_accepts() {
        let open = Characteristic::new("brand", false);
        assert!(open.accepts("anything"));

        let closed = Characteristic::new("color", true).with_allowed_values(["red", "blue"]);
        assert!(closed.accepts("RED"));
        assert!(!closed.accepts("green"));
    }

    #[test]
    fn test_characteristic_defaults_on_deserialize() {
        let parsed: Characteristic = serde_json::from_str(r#"{"name":"size"}"#).unwrap();
        assert_eq!(parsed, Characteristic::new("size", false));
    }
}

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vendedor_core::domain::slots::SlotKey;

use crate::llm::{extract_json_object, LlmClient};
use crate::prompts::PromptTemplates;

/// Information a category needs before a search makes sense.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CriteriaSet {
    pub essential: BTreeSet<SlotKey>,
    pub optional: BTreeSet<SlotKey>,
}

impl CriteriaSet {
    /// Builds a set where `category` is never a criterion and a key listed as
    /// both essential and optional counts as essential.
    pub fn new(
        essential: impl IntoIterator<Item = SlotKey>,
        optional: impl IntoIterator<Item = SlotKey>,
    ) -> Self {
        let essential =
            essential.into_iter().filter(SlotKey::is_criterion).collect::<BTreeSet<_>>();
        let optional = optional
            .into_iter()
            .filter(|key| key.is_criterion() && !essential.contains(key))
            .collect();
        Self { essential, optional }
    }

    pub fn fallback() -> Self {
        Self::new([SlotKey::BudgetMax], [])
    }
}

/// Process-wide criteria per category. Inserts are last-writer-wins.
#[derive(Debug, Default)]
pub struct CriteriaCache {
    entries: RwLock<HashMap<String, CriteriaSet>>,
}

impl CriteriaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, category: &str) -> Option<CriteriaSet> {
        self.entries.read().await.get(&cache_key(category)).cloned()
    }

    pub async fn insert(&self, category: &str, criteria: CriteriaSet) {
        self.entries.write().await.insert(cache_key(category), criteria);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn cache_key(category: &str) -> String {
    category.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub struct CriteriaOracle {
    llm: Arc<dyn LlmClient>,
    templates: Arc<PromptTemplates>,
    cache: Arc<CriteriaCache>,
}

impl CriteriaOracle {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        templates: Arc<PromptTemplates>,
        cache: Arc<CriteriaCache>,
    ) -> Self {
        Self { llm, templates, cache }
    }

    /// Returns the cached criteria or asks the model once; failures cache the fallback.
    pub async fn criteria_for(&self, category: &str) -> CriteriaSet {
        if let Some(criteria) = self.cache.get(category).await {
            return criteria;
        }

        let criteria = match self.discover(category).await {
            Ok(criteria) => {
                info!(
                    event_name = "agent.criteria.discovered",
                    category,
                    essential = ?criteria.essential,
                    optional = ?criteria.optional,
                    "criteria discovered"
                );
                criteria
            }
            Err(reason) => {
                warn!(
                    event_name = "agent.criteria.fallback",
                    category,
                    reason = %reason,
                    "using fallback criteria"
                );
                CriteriaSet::fallback()
            }
        };

        self.cache.insert(category, criteria.clone()).await;
        criteria
    }

    async fn discover(&self, category: &str) -> Result<CriteriaSet, String> {
        let prompt = self.templates.render_criteria(category).map_err(|error| error.to_string())?;
        let raw = self.llm.complete(&prompt).await.map_err(|error| error.to_string())?;
        parse_criteria(&raw).ok_or_else(|| "unparsable criteria output".to_string())
    }
}

/// Parses `{"essential": [...], "optional": [...]}`; unknown names are dropped.
///
/// A non-empty essential list with no usable slot names is unparsable.
pub fn parse_criteria(raw: &str) -> Option<CriteriaSet> {
    let document = extract_json_object(raw)?;
    let essential_names = ["essential", "criterios_esenciales", "esenciales"];
    let listed_essential = field(&document, &essential_names)?.as_array()?.len();
    let essential = slot_list(&document, &essential_names)?;
    let optional = match field(&document, &["optional", "criterios_opcionales", "opcionales"]) {
        None | Some(Value::Null) => Vec::new(),
        Some(_) => slot_list(&document, &["optional", "criterios_opcionales", "opcionales"])?,
    };
    let criteria = CriteriaSet::new(essential, optional);
    (listed_essential == 0 || !criteria.essential.is_empty()).then_some(criteria)
}

fn field<'a>(document: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| document.get(*name))
}

fn slot_list(document: &Value, names: &[&str]) -> Option<Vec<SlotKey>> {
    let items = field(document, names)?.as_array()?;
    Some(items.iter().filter_map(Value::as_str).filter_map(SlotKey::parse).collect())
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use vendedor_core::catalog::synonyms::known_categories;
use vendedor_core::catalog::{CatalogProvider, CatalogQuery, CsvCatalog};
use vendedor_core::config::{AppConfig, CatalogConfig};
use vendedor_core::domain::slots::{SlotKey, SlotValue};
use vendedor_core::errors::ApplicationError;

use crate::composer::{no_results_reply, CompositionRequest, RecommendationComposer};
use crate::conversation::{ConversationContext, SlotExtractor, SlotUpdate, Speaker};
use crate::criteria::{CriteriaCache, CriteriaOracle};
use crate::llm::{LlmClient, OpenAiCompatibleClient, TimeoutLlmClient};
use crate::prompts::PromptTemplates;
use crate::readiness::{assess, greeting_question, FollowUpPlanner, ReadinessState};

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub store_name: String,
    pub history_window: usize,
    pub max_questions_per_turn: usize,
    pub max_recommended_products: usize,
    pub recommendation_max_words: usize,
    pub catalog: CatalogConfig,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            store_name: config.agent.store_name.clone(),
            history_window: config.agent.history_window,
            max_questions_per_turn: config.agent.max_questions_per_turn,
            max_recommended_products: config.agent.max_recommended_products,
            recommendation_max_words: config.agent.recommendation_max_words,
            catalog: config.catalog.clone(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub state: ReadinessState,
    pub context: ConversationContext,
    /// The catalog query this turn ran, if it searched.
    pub search: Option<CatalogQuery>,
}

type SessionHandle = Arc<Mutex<ConversationContext>>;

/// Owns every live session and runs the per-turn decision loop.
pub struct AgentRuntime {
    catalog: Arc<dyn CatalogProvider>,
    extractor: SlotExtractor,
    oracle: CriteriaOracle,
    planner: FollowUpPlanner,
    composer: RecommendationComposer,
    settings: RuntimeSettings,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<dyn CatalogProvider>,
        criteria_cache: Arc<CriteriaCache>,
        settings: RuntimeSettings,
    ) -> Result<Self, ApplicationError> {
        let templates = Arc::new(
            PromptTemplates::new(settings.store_name.clone())
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?,
        );

        Ok(Self {
            catalog,
            extractor: SlotExtractor::new(
                Arc::clone(&llm),
                Arc::clone(&templates),
                settings.history_window,
            ),
            oracle: CriteriaOracle::new(Arc::clone(&llm), Arc::clone(&templates), criteria_cache),
            planner: FollowUpPlanner::new(
                Arc::clone(&llm),
                Arc::clone(&templates),
                settings.max_questions_per_turn,
            ),
            composer: RecommendationComposer::new(
                llm,
                templates,
                settings.recommendation_max_words,
            ),
            settings,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Wires the HTTP model client and the CSV catalog described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let client = OpenAiCompatibleClient::from_config(&config.llm)
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let attempts = u64::from(config.llm.max_retries) + 1;
        let llm: Arc<dyn LlmClient> = Arc::new(TimeoutLlmClient::new(
            client,
            Duration::from_secs(config.llm.timeout_secs.saturating_mul(attempts)),
        ));
        let catalog: Arc<dyn CatalogProvider> =
            Arc::new(CsvCatalog::new(&config.catalog.path, config.catalog.cache_ttl()));

        Self::new(llm, catalog, Arc::new(CriteriaCache::new()), RuntimeSettings::from_config(config))
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Loads (and caches) the catalog, returning the number of products.
    pub fn catalog_status(&self) -> Result<usize, ApplicationError> {
        Ok(self.catalog.load_products()?.len())
    }

    /// Runs one customer turn. Every path produces a reply; failures degrade to
    /// fallbacks and never leave the context half-updated.
    /// History is the exception: both turns are appended even when extraction fails.
    pub async fn process_turn(&self, session_id: &str, message: &str) -> TurnOutcome {
        let started = Instant::now();
        let session = self.session(session_id).await;
        let mut context = session.lock().await;

        let (reply, state, search) = self.respond(&mut context, session_id, message).await;

        context.push_turn(Speaker::Customer, message);
        context.push_turn(Speaker::Assistant, reply.clone());

        info!(
            event_name = "agent.turn.completed",
            session_id,
            state = state.as_str(),
            searched = search.is_some(),
            known_slots = context.slots().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );

        TurnOutcome { reply, state, context: context.clone(), search }
    }

    pub async fn reset_session(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.read().await.get(session_id).cloned() else {
            return false;
        };
        session.lock().await.reset();
        info!(event_name = "agent.session.reset", session_id, "session reset");
        true
    }

    pub async fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(event_name = "agent.session.ended", session_id, "session ended");
        }
        removed
    }

    pub async fn context_snapshot(&self, session_id: &str) -> Option<ConversationContext> {
        let session = self.sessions.read().await.get(session_id).cloned()?;
        let context = session.lock().await;
        Some(context.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, session_id: &str) -> SessionHandle {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_default())
    }

    async fn respond(
        &self,
        context: &mut ConversationContext,
        session_id: &str,
        message: &str,
    ) -> (String, ReadinessState, Option<CatalogQuery>) {
        let mut unrecognized_category = None;
        match self.extractor.extract(context, message).await {
            Ok(update) => {
                let (update, rejected) = self.resolve_category(update);
                unrecognized_category = rejected;
                let changed = context.merge(update);
                if !changed.is_empty() {
                    info!(
                        event_name = "agent.context.updated",
                        session_id,
                        changed = ?changed,
                        "conversation context updated"
                    );
                }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.extraction.malformed",
                    session_id,
                    error = %error,
                    "slot extraction failed; context left unchanged"
                );
            }
        }

        if let Some(raw) = unrecognized_category {
            return (clarify_category(&raw), ReadinessState::Insufficient, None);
        }

        let Some(category) = context.category().map(str::to_string) else {
            let greeting = greeting_question(&self.settings.store_name, context.user_name());
            return (greeting, ReadinessState::Insufficient, None);
        };

        let criteria = self.oracle.criteria_for(&category).await;
        let assessment = assess(context, Some(&criteria));

        if !assessment.state.allows_search() {
            let question = self.planner.question_for(context, &assessment).await;
            return (question, assessment.state, None);
        }

        let (budget, budget_assumed) = match context.budget_max() {
            Some(budget) => (budget, false),
            None => (self.settings.catalog.default_budget_for(&category), true),
        };
        let query = CatalogQuery::new(category.clone())
            .with_price_max(Some(budget))
            .with_brand(context.brand().map(str::to_string));
        let result = self.catalog.search(&query);
        info!(
            event_name = "agent.search.completed",
            session_id,
            category = %category,
            price_max = %budget,
            brand = query.brand.as_deref().unwrap_or(""),
            results = result.products.len(),
            brand_widened = result.brand_widened,
            "catalog search completed"
        );

        if result.is_empty() {
            let reply = no_results_reply(&category, query.brand.as_deref(), budget);
            return (reply, assessment.state, Some(query));
        }

        let shown = result.products.len().min(self.settings.max_recommended_products);
        let reply = self
            .composer
            .compose(
                context,
                &CompositionRequest {
                    assessment: &assessment,
                    result: &result,
                    products: &result.products[..shown],
                    budget,
                    budget_assumed,
                },
            )
            .await;
        (reply, assessment.state, Some(query))
    }

    /// Maps the reported category onto the catalog vocabulary. An unrecognized
    /// category is removed from the update and returned for clarification.
    fn resolve_category(&self, mut update: SlotUpdate) -> (SlotUpdate, Option<String>) {
        let Some(raw) = update.slots.remove(&SlotKey::Category) else {
            return (update, None);
        };
        let mention = raw.to_string();
        match self.catalog.resolve_category(&mention) {
            Some(canonical) => {
                update.slots.insert(SlotKey::Category, SlotValue::Text(canonical));
                (update, None)
            }
            None => (update, Some(mention)),
        }
    }
}

fn clarify_category(mention: &str) -> String {
    let categories = known_categories()
        .into_iter()
        .map(|category| category.replace('_', " "))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "No encontré \"{mention}\" entre las categorías de nuestro catálogo. \
         ¿Buscas alguno de estos productos: {categories}?"
    )
}

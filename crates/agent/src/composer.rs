use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::warn;
use vendedor_core::catalog::SearchResult;
use vendedor_core::domain::money::format_cop;
use vendedor_core::domain::product::Product;
use vendedor_core::errors::ApplicationError;

use crate::conversation::ConversationContext;
use crate::llm::LlmClient;
use crate::prompts::{slot_lines, CriterionLine, ProductLine, PromptTemplates, RecommendationPrompt};
use crate::readiness::{ReadinessAssessment, ReadinessState};

/// Inputs for one recommendation besides the conversation itself.
pub struct CompositionRequest<'a> {
    pub assessment: &'a ReadinessAssessment,
    pub result: &'a SearchResult,
    pub products: &'a [Product],
    pub budget: Decimal,
    pub budget_assumed: bool,
}

pub struct RecommendationComposer {
    llm: Arc<dyn LlmClient>,
    templates: Arc<PromptTemplates>,
    max_words: usize,
}

impl RecommendationComposer {
    pub fn new(llm: Arc<dyn LlmClient>, templates: Arc<PromptTemplates>, max_words: usize) -> Self {
        Self { llm, templates, max_words }
    }

    /// Writes the recommendation reply. Never fails: any problem yields the apology.
    pub async fn compose(
        &self,
        context: &ConversationContext,
        request: &CompositionRequest<'_>,
    ) -> String {
        let confidence = match request.assessment.state {
            ReadinessState::Ready => "high",
            ReadinessState::Viable | ReadinessState::Insufficient => "medium",
        };
        let prompt = RecommendationPrompt {
            store_name: self.templates.store_name(),
            user_name: context.user_name(),
            known_slots: slot_lines(context),
            budget: request.budget,
            budget_assumed: request.budget_assumed,
            confidence,
            missing_optional: request
                .assessment
                .missing_optional
                .iter()
                .map(|key| CriterionLine { name: key.as_str(), label: key.label() })
                .collect(),
            brand_widened: request.result.brand_widened,
            requested_brand: request.result.query.brand.as_deref(),
            available_brands: &request.result.available_brands,
            products: request
                .products
                .iter()
                .map(|product| ProductLine {
                    title: &product.title,
                    brand: &product.brand,
                    price: product.price,
                    features: &product.features,
                })
                .collect(),
            max_words: self.max_words,
        };

        let rendered = match self.templates.render_recommendation(&prompt) {
            Ok(rendered) => rendered,
            Err(error) => {
                let error = ApplicationError::Configuration(error.to_string());
                warn!(
                    event_name = "agent.recommendation.prompt_failed",
                    error = %error,
                    "recommendation prompt failed to render"
                );
                return error.user_message().to_string();
            }
        };

        let failure = match self.llm.complete(&rendered).await {
            Ok(reply) if !reply.trim().is_empty() => return reply.trim().to_string(),
            Ok(_) => ApplicationError::Integration("empty recommendation reply".to_string()),
            Err(error) => ApplicationError::Integration(error.to_string()),
        };
        warn!(
            event_name = "agent.recommendation.failed",
            error = %failure,
            "recommendation call failed"
        );
        failure.user_message().to_string()
    }
}

/// Deterministic reply for a search with no matches.
pub fn no_results_reply(category: &str, brand: Option<&str>, ceiling: Decimal) -> String {
    let brand_part = brand.map(|brand| format!(" de la marca {brand}")).unwrap_or_default();
    format!(
        "Lo siento, no encontramos opciones de {}{brand_part} con un presupuesto de hasta {}. \
         Intenta ajustar el presupuesto o la marca y lo busco de nuevo.",
        category.replace('_', " "),
        format_cop(ceiling)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use vendedor_core::catalog::{search_products, CatalogQuery};
    use vendedor_core::domain::product::{Product, ProductId};
    use vendedor_core::domain::slots::{SlotKey, SlotValue};
    use vendedor_core::errors::APOLOGY_MESSAGE;

    use super::{no_results_reply, CompositionRequest, RecommendationComposer};
    use crate::conversation::{ConversationContext, SlotUpdate};
    use crate::criteria::CriteriaSet;
    use crate::prompts::{PromptTemplates, RECOMMENDATION_TASK};
    use crate::readiness::assess;
    use crate::testing::ScriptedLlmClient;

    fn tv(id: &str, brand: &str, price: i64) -> Product {
        Product {
            id: ProductId(id.to_string()),
            title: format!("Televisor {brand} 50 UHD"),
            price: Decimal::new(price, 0),
            brand: brand.to_string(),
            category: "televisor".to_string(),
            features: "Smart TV".to_string(),
        }
    }

    fn composer(llm: Arc<ScriptedLlmClient>) -> RecommendationComposer {
        let templates = Arc::new(PromptTemplates::new("Alkosto").expect("templates"));
        RecommendationComposer::new(llm, templates, 300)
    }

    fn context() -> ConversationContext {
        let mut context = ConversationContext::new();
        context.merge(
            SlotUpdate::default()
                .with_slot(SlotKey::Category, SlotValue::Text("televisor".to_string()))
                .with_slot(SlotKey::Brand, SlotValue::Text("samsung".to_string()))
                .with_user_name("Ana"),
        );
        context
    }

    #[tokio::test]
    async fn viable_recommendation_invites_missing_criteria_and_explains_widening() {
        let llm = Arc::new(
            ScriptedLlmClient::new().on(RECOMMENDATION_TASK, "  Ana, te recomiendo el LG.  "),
        );
        let products = vec![tv("tv-1", "LG", 1_799_900), tv("tv-2", "KALLEY", 749_900)];
        let query = CatalogQuery::new("televisor")
            .with_price_max(Some(Decimal::new(2_000_000, 0)))
            .with_brand(Some("samsung".to_string()));
        let result = search_products(&products, &query);
        let context = context();
        let criteria = CriteriaSet::new([SlotKey::Brand], [SlotKey::PrimaryUse]);
        let assessment = assess(&context, Some(&criteria));

        let reply = composer(llm.clone())
            .compose(
                &context,
                &CompositionRequest {
                    assessment: &assessment,
                    result: &result,
                    products: &result.products,
                    budget: Decimal::new(2_000_000, 0),
                    budget_assumed: true,
                },
            )
            .await;

        assert_eq!(reply, "Ana, te recomiendo el LG.");
        let prompt = &llm.prompts_for(RECOMMENDATION_TASK)[0];
        assert!(prompt.contains("La información es parcial"));
        assert!(prompt.contains("uso principal"));
        assert!(prompt.contains("marca \"samsung\""));
        assert!(prompt.contains("KALLEY, LG"));
        let kalley = prompt.find("Televisor KALLEY").expect("kalley listed");
        let lg = prompt.find("Televisor LG").expect("lg listed");
        assert!(kalley < lg);
    }

    #[tokio::test]
    async fn model_failure_returns_apology() {
        let llm = Arc::new(ScriptedLlmClient::new().failing(RECOMMENDATION_TASK, "503"));
        let products = vec![tv("tv-1", "LG", 1_799_900)];
        let result = search_products(&products, &CatalogQuery::new("televisor"));
        let context = context();
        let assessment = assess(&context, Some(&CriteriaSet::new([SlotKey::Brand], [])));

        let reply = composer(llm)
            .compose(
                &context,
                &CompositionRequest {
                    assessment: &assessment,
                    result: &result,
                    products: &result.products,
                    budget: Decimal::new(2_000_000, 0),
                    budget_assumed: false,
                },
            )
            .await;

        assert_eq!(reply, APOLOGY_MESSAGE);
    }

    #[test]
    fn no_results_reply_names_category_brand_and_ceiling() {
        let reply = no_results_reply("aire_acondicionado", Some("LG"), Decimal::new(900_000, 0));
        assert_eq!(
            reply,
            "Lo siento, no encontramos opciones de aire acondicionado de la marca LG con un \
             presupuesto de hasta $900.000. Intenta ajustar el presupuesto o la marca y lo busco \
             de nuevo."
        );
    }
}

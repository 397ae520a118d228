//! Prompt templates for every language-model call site.
//!
//! Templates are embedded at compile time and rendered with Tera. Each one opens
//! with a `TAREA:` header naming the call site.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use vendedor_core::domain::money::format_cop;
use vendedor_core::domain::slots::SlotKey;

use crate::conversation::{ConversationContext, Speaker};

pub const EXTRACTION_TASK: &str = "TAREA: EXTRAER_DATOS";
pub const CRITERIA_TASK: &str = "TAREA: CRITERIOS_CATEGORIA";
pub const FOLLOW_UP_TASK: &str = "TAREA: PREGUNTA_SEGUIMIENTO";
pub const RECOMMENDATION_TASK: &str = "TAREA: RECOMENDACION";

const EXTRACTION_TEMPLATE: &str = "extract_slots.tera";
const CRITERIA_TEMPLATE: &str = "criteria.tera";
const FOLLOW_UP_TEMPLATE: &str = "follow_up.tera";
const RECOMMENDATION_TEMPLATE: &str = "recommendation.tera";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to register prompt template `{name}`: {source}")]
    Register { name: &'static str, source: tera::Error },
    #[error("failed to render prompt `{name}`: {source}")]
    Render { name: &'static str, source: tera::Error },
}

/// Register custom Tera filters used by prompt templates.
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Renders a peso amount (number or decimal string) as `$1.499.900`.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(raw) => raw
            .parse::<Decimal>()
            .map_err(|_| tera::Error::msg(format!("money filter cannot parse `{raw}`")))?,
        tera::Value::Number(number) => number
            .as_i64()
            .map(Decimal::from)
            .or_else(|| number.as_f64().and_then(|float| Decimal::try_from(float).ok()))
            .ok_or_else(|| tera::Error::msg("money filter received an out-of-range number"))?,
        tera::Value::Null => Decimal::ZERO,
        _ => return Err(tera::Error::msg("money filter expects a number or decimal string")),
    };
    Ok(tera::Value::String(format_cop(amount)))
}

pub struct PromptTemplates {
    tera: Tera,
    store_name: String,
}

impl PromptTemplates {
    pub fn new(store_name: impl Into<String>) -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        register_template_filters(&mut tera);

        let templates = [
            (EXTRACTION_TEMPLATE, include_str!("../templates/prompts/extract_slots.tera")),
            (CRITERIA_TEMPLATE, include_str!("../templates/prompts/criteria.tera")),
            (FOLLOW_UP_TEMPLATE, include_str!("../templates/prompts/follow_up.tera")),
            (RECOMMENDATION_TEMPLATE, include_str!("../templates/prompts/recommendation.tera")),
        ];
        for (name, source) in templates {
            tera.add_raw_template(name, source)
                .map_err(|source| PromptError::Register { name, source })?;
        }

        Ok(Self { tera, store_name: store_name.into() })
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn render_extraction(
        &self,
        context: &ConversationContext,
        history_window: usize,
        message: &str,
    ) -> Result<String, PromptError> {
        let history = context
            .recent_history(history_window)
            .iter()
            .map(|turn| TurnLine {
                speaker: match turn.speaker {
                    Speaker::Customer => "Cliente",
                    Speaker::Assistant => "Asistente",
                },
                text: turn.text.as_str(),
            })
            .collect::<Vec<_>>();

        self.render(
            EXTRACTION_TEMPLATE,
            &ExtractionPrompt {
                store_name: &self.store_name,
                known_slots: slot_lines(context),
                history,
                message,
            },
        )
    }

    pub fn render_criteria(&self, category: &str) -> Result<String, PromptError> {
        let criteria = SlotKey::ALL
            .iter()
            .filter(|key| key.is_criterion())
            .map(|key| CriterionLine { name: key.as_str(), label: key.label() })
            .collect();

        self.render(
            CRITERIA_TEMPLATE,
            &CriteriaPrompt { store_name: &self.store_name, category, criteria },
        )
    }

    pub fn render_follow_up(
        &self,
        context: &ConversationContext,
        category: &str,
        targets: &[SlotKey],
    ) -> Result<String, PromptError> {
        let targets = targets
            .iter()
            .map(|key| CriterionLine { name: key.as_str(), label: key.label() })
            .collect();
        let known_slots = slot_lines(context)
            .into_iter()
            .filter(|line| line.name != SlotKey::Category.as_str())
            .collect();

        self.render(
            FOLLOW_UP_TEMPLATE,
            &FollowUpPrompt {
                store_name: &self.store_name,
                user_name: context.user_name(),
                category,
                known_slots,
                targets,
            },
        )
    }

    pub fn render_recommendation(
        &self,
        input: &RecommendationPrompt<'_>,
    ) -> Result<String, PromptError> {
        self.render(RECOMMENDATION_TEMPLATE, input)
    }

    fn render<T: Serialize>(&self, name: &'static str, value: &T) -> Result<String, PromptError> {
        let context =
            Context::from_serialize(value).map_err(|source| PromptError::Render { name, source })?;
        self.tera.render(name, &context).map_err(|source| PromptError::Render { name, source })
    }
}

pub fn slot_lines(context: &ConversationContext) -> Vec<SlotLine> {
    context
        .slots()
        .iter()
        .map(|(key, value)| SlotLine {
            name: key.as_str(),
            label: key.label(),
            value: match key {
                SlotKey::BudgetMax => value.as_amount().map(format_cop).unwrap_or_default(),
                _ => value.to_string(),
            },
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SlotLine {
    pub name: &'static str,
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct CriterionLine {
    pub name: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
struct TurnLine<'a> {
    speaker: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ExtractionPrompt<'a> {
    store_name: &'a str,
    known_slots: Vec<SlotLine>,
    history: Vec<TurnLine<'a>>,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct CriteriaPrompt<'a> {
    store_name: &'a str,
    category: &'a str,
    criteria: Vec<CriterionLine>,
}

#[derive(Debug, Serialize)]
struct FollowUpPrompt<'a> {
    store_name: &'a str,
    user_name: Option<&'a str>,
    category: &'a str,
    known_slots: Vec<SlotLine>,
    targets: Vec<CriterionLine>,
}

#[derive(Debug, Serialize)]
pub struct ProductLine<'a> {
    pub title: &'a str,
    pub brand: &'a str,
    pub price: Decimal,
    pub features: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RecommendationPrompt<'a> {
    pub store_name: &'a str,
    pub user_name: Option<&'a str>,
    pub known_slots: Vec<SlotLine>,
    pub budget: Decimal,
    pub budget_assumed: bool,
    /// `high` when every criterion is known, `medium` otherwise.
    pub confidence: &'static str,
    pub missing_optional: Vec<CriterionLine>,
    pub brand_widened: bool,
    pub requested_brand: Option<&'a str>,
    pub available_brands: &'a [String],
    pub products: Vec<ProductLine<'a>>,
    pub max_words: usize,
}

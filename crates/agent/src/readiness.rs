//! Search-readiness decision and follow-up questions.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use vendedor_core::catalog::synonyms::known_categories;
use vendedor_core::domain::slots::SlotKey;

use crate::conversation::ConversationContext;
use crate::criteria::CriteriaSet;
use crate::llm::{extract_json_object, LlmClient};
use crate::prompts::PromptTemplates;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    Insufficient,
    Viable,
    Ready,
}

impl ReadinessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insufficient => "insufficient",
            Self::Viable => "viable",
            Self::Ready => "ready",
        }
    }

    pub fn allows_search(&self) -> bool {
        !matches!(self, Self::Insufficient)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessAssessment {
    pub state: ReadinessState,
    /// Priority order; contains `category` when no category is known yet.
    pub missing_essential: Vec<SlotKey>,
    pub missing_optional: Vec<SlotKey>,
}

/// Classifies the conversation from set membership alone.
///
/// Without a known category (or criteria for it) nothing can be searched, so
/// the result is `insufficient` with `category` as the only missing slot.
pub fn assess(context: &ConversationContext, criteria: Option<&CriteriaSet>) -> ReadinessAssessment {
    let criteria = match (context.category(), criteria) {
        (Some(_), Some(criteria)) => criteria,
        _ => {
            return ReadinessAssessment {
                state: ReadinessState::Insufficient,
                missing_essential: vec![SlotKey::Category],
                missing_optional: Vec::new(),
            }
        }
    };

    let missing_essential =
        criteria.essential.iter().copied().filter(|key| !context.is_known(*key)).collect::<Vec<_>>();
    let missing_optional =
        criteria.optional.iter().copied().filter(|key| !context.is_known(*key)).collect::<Vec<_>>();

    let state = if !missing_essential.is_empty() {
        ReadinessState::Insufficient
    } else if !missing_optional.is_empty() {
        ReadinessState::Viable
    } else {
        ReadinessState::Ready
    };

    ReadinessAssessment { state, missing_essential, missing_optional }
}

/// Slots a follow-up should ask about: missing essentials first, capped.
pub fn follow_up_targets(assessment: &ReadinessAssessment, max_questions: usize) -> Vec<SlotKey> {
    assessment.missing_essential.iter().copied().take(max_questions.max(1)).collect()
}

/// Produces the clarifying question for an `insufficient` turn.
pub struct FollowUpPlanner {
    llm: Arc<dyn LlmClient>,
    templates: Arc<PromptTemplates>,
    max_questions: usize,
}

impl FollowUpPlanner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        templates: Arc<PromptTemplates>,
        max_questions: usize,
    ) -> Self {
        Self { llm, templates, max_questions: max_questions.clamp(1, 2) }
    }

    pub async fn question_for(
        &self,
        context: &ConversationContext,
        assessment: &ReadinessAssessment,
    ) -> String {
        let targets = follow_up_targets(assessment, self.max_questions);
        let category = match context.category() {
            Some(category) if !targets.contains(&SlotKey::Category) => category,
            _ => return greeting_question(self.templates.store_name(), context.user_name()),
        };

        match self.generate(context, category, &targets).await {
            Ok(questions) => join_questions(&questions),
            Err(reason) => {
                warn!(
                    event_name = "agent.follow_up.fallback",
                    category,
                    reason = %reason,
                    "using fallback follow-up question"
                );
                let questions =
                    targets.iter().map(|key| fallback_question(*key).to_string()).collect::<Vec<_>>();
                join_questions(&questions)
            }
        }
    }

    async fn generate(
        &self,
        context: &ConversationContext,
        category: &str,
        targets: &[SlotKey],
    ) -> Result<Vec<String>, String> {
        let prompt = self
            .templates
            .render_follow_up(context, category, targets)
            .map_err(|error| error.to_string())?;
        let raw = self.llm.complete(&prompt).await.map_err(|error| error.to_string())?;
        let questions = parse_questions(&raw).ok_or_else(|| "unparsable questions".to_string())?;
        Ok(questions.into_iter().take(targets.len()).collect())
    }
}

/// Parses `{"questions": [...]}` (or `preguntas`), keeping non-empty strings.
pub fn parse_questions(raw: &str) -> Option<Vec<String>> {
    let document = extract_json_object(raw)?;
    let items = ["questions", "preguntas"]
        .into_iter()
        .find_map(|key| document.get(key))
        .and_then(Value::as_array)?;
    let questions = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    (!questions.is_empty()).then_some(questions)
}

/// Combines up to two questions into one sentence.
pub fn join_questions(questions: &[String]) -> String {
    match questions {
        [] => fallback_question(SlotKey::BudgetMax).to_string(),
        [only] => only.clone(),
        [first, second, ..] => format!("{first} Y también, {}", lowercase_first_letter(second)),
    }
}

fn lowercase_first_letter(text: &str) -> String {
    let mut lowered = String::with_capacity(text.len());
    let mut done = false;
    for ch in text.chars() {
        if !done && ch.is_alphabetic() {
            lowered.extend(ch.to_lowercase());
            done = true;
        } else {
            lowered.push(ch);
        }
    }
    lowered
}

pub fn fallback_question(key: SlotKey) -> &'static str {
    match key {
        SlotKey::Category => "¿Qué tipo de producto estás buscando?",
        SlotKey::BudgetMax => "¿Cuál es tu presupuesto máximo aproximado?",
        SlotKey::Brand => "¿Tienes alguna marca de preferencia?",
        SlotKey::PrimaryUse => "¿Para qué lo vas a usar principalmente?",
        SlotKey::HouseholdSize => "¿Cuántas personas viven en tu hogar?",
        SlotKey::Space => "¿Cuánto espacio tienes disponible para ubicarlo?",
    }
}

pub fn greeting_question(store_name: &str, user_name: Option<&str>) -> String {
    let salutation = match user_name {
        Some(name) => format!("¡Hola, {name}!"),
        None => "¡Hola!".to_string(),
    };
    format!(
        "{salutation} Soy tu asesor de {store_name}. ¿Qué producto estás buscando? \
         Por ejemplo: {}.",
        example_categories()
    )
}

pub fn example_categories() -> String {
    known_categories()
        .into_iter()
        .take(5)
        .map(|category| category.replace('_', " "))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use vendedor_core::domain::slots::{SlotKey, SlotValue};

    use super::{
        assess, follow_up_targets, join_questions, parse_questions, FollowUpPlanner,
        ReadinessState,
    };
    use crate::conversation::{ConversationContext, SlotUpdate};
    use crate::criteria::CriteriaSet;
    use crate::prompts::{PromptTemplates, FOLLOW_UP_TASK};
    use crate::testing::ScriptedLlmClient;

    fn context_with(slots: &[(SlotKey, SlotValue)]) -> ConversationContext {
        let mut context = ConversationContext::new();
        let update = slots
            .iter()
            .cloned()
            .fold(SlotUpdate::default(), |update, (key, value)| update.with_slot(key, value));
        context.merge(update);
        context
    }

    fn televisor() -> (SlotKey, SlotValue) {
        (SlotKey::Category, SlotValue::Text("televisor".to_string()))
    }

    fn budget() -> (SlotKey, SlotValue) {
        (SlotKey::BudgetMax, SlotValue::Amount(Decimal::new(1_500_000, 0)))
    }

    fn brand() -> (SlotKey, SlotValue) {
        (SlotKey::Brand, SlotValue::Text("LG".to_string()))
    }

    fn planner(llm: Arc<ScriptedLlmClient>, max_questions: usize) -> FollowUpPlanner {
        let templates = Arc::new(PromptTemplates::new("Alkosto").expect("templates"));
        FollowUpPlanner::new(llm, templates, max_questions)
    }

    #[test]
    fn unknown_category_is_insufficient() {
        let assessment = assess(&ConversationContext::new(), Some(&CriteriaSet::fallback()));
        assert_eq!(assessment.state, ReadinessState::Insufficient);
        assert_eq!(assessment.missing_essential, vec![SlotKey::Category]);
    }

    #[test]
    fn missing_essential_is_insufficient() {
        let criteria = CriteriaSet::new([SlotKey::BudgetMax], [SlotKey::Brand]);
        let assessment = assess(&context_with(&[televisor()]), Some(&criteria));

        assert_eq!(assessment.state, ReadinessState::Insufficient);
        assert_eq!(assessment.missing_essential, vec![SlotKey::BudgetMax]);
        assert_eq!(assessment.missing_optional, vec![SlotKey::Brand]);
    }

    #[test]
    fn known_essentials_with_missing_optional_is_viable() {
        let criteria = CriteriaSet::new([SlotKey::BudgetMax], [SlotKey::Brand, SlotKey::Space]);
        let assessment = assess(&context_with(&[televisor(), budget(), brand()]), Some(&criteria));

        assert_eq!(assessment.state, ReadinessState::Viable);
        assert!(assessment.missing_essential.is_empty());
        assert_eq!(assessment.missing_optional, vec![SlotKey::Space]);
    }

    #[test]
    fn all_criteria_known_is_ready() {
        let criteria = CriteriaSet::new([SlotKey::BudgetMax], [SlotKey::Brand]);
        let assessment = assess(&context_with(&[televisor(), budget(), brand()]), Some(&criteria));
        assert_eq!(assessment.state, ReadinessState::Ready);

        let no_optional = CriteriaSet::new([SlotKey::BudgetMax], []);
        let assessment = assess(&context_with(&[televisor(), budget()]), Some(&no_optional));
        assert_eq!(assessment.state, ReadinessState::Ready);
    }

    #[test]
    fn readiness_matches_set_difference_for_every_subset() {
        let criteria =
            CriteriaSet::new([SlotKey::BudgetMax, SlotKey::Space], [SlotKey::Brand]);
        let pool = [budget(), brand(), (SlotKey::Space, SlotValue::Text("sala".to_string()))];

        for mask in 0..(1u8 << pool.len()) {
            let mut slots = vec![televisor()];
            slots.extend(
                pool.iter().enumerate().filter(|(i, _)| mask & (1 << i) != 0).map(|(_, s)| s.clone()),
            );
            let context = context_with(&slots);
            let assessment = assess(&context, Some(&criteria));

            let essential_missing = criteria.essential.iter().any(|key| !context.is_known(*key));
            let any_missing = criteria
                .essential
                .iter()
                .chain(criteria.optional.iter())
                .any(|key| !context.is_known(*key));
            let expected = if essential_missing {
                ReadinessState::Insufficient
            } else if any_missing {
                ReadinessState::Viable
            } else {
                ReadinessState::Ready
            };
            assert_eq!(assessment.state, expected, "mask {mask:03b}");
        }
    }

    #[test]
    fn targets_are_capped_essentials_in_priority_order() {
        let criteria = CriteriaSet::new(
            [SlotKey::Space, SlotKey::PrimaryUse, SlotKey::BudgetMax],
            [SlotKey::Brand],
        );
        let assessment = assess(&context_with(&[televisor()]), Some(&criteria));

        assert_eq!(
            follow_up_targets(&assessment, 2),
            vec![SlotKey::BudgetMax, SlotKey::PrimaryUse]
        );
        assert_eq!(follow_up_targets(&assessment, 1), vec![SlotKey::BudgetMax]);
    }

    #[test]
    fn joins_two_questions_into_one() {
        let joined = join_questions(&[
            "¿Cuál es tu presupuesto?".to_string(),
            "¿Qué marca prefieres?".to_string(),
        ]);
        assert_eq!(joined, "¿Cuál es tu presupuesto? Y también, ¿qué marca prefieres?");
    }

    #[test]
    fn parses_questions_with_spanish_key() {
        assert_eq!(
            parse_questions(r#"{"preguntas": ["¿Cuánto quieres gastar?", "  "]}"#),
            Some(vec!["¿Cuánto quieres gastar?".to_string()])
        );
        assert_eq!(parse_questions(r#"{"questions": []}"#), None);
    }

    #[tokio::test]
    async fn asks_model_generated_question_about_missing_budget() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on(FOLLOW_UP_TASK, r#"{"questions": ["¿Cuál es tu presupuesto máximo?"]}"#),
        );
        let context = context_with(&[televisor()]);
        let assessment = assess(&context, Some(&CriteriaSet::fallback()));

        let question = planner(llm.clone(), 2).question_for(&context, &assessment).await;

        assert_eq!(question, "¿Cuál es tu presupuesto máximo?");
        assert!(llm.prompts_for(FOLLOW_UP_TASK)[0].contains("- budget_max:"));
    }

    #[tokio::test]
    async fn falls_back_to_fixed_questions_when_model_fails() {
        let llm = Arc::new(ScriptedLlmClient::new().failing(FOLLOW_UP_TASK, "boom"));
        let criteria = CriteriaSet::new([SlotKey::BudgetMax, SlotKey::Brand], []);
        let context = context_with(&[televisor()]);
        let assessment = assess(&context, Some(&criteria));

        let question = planner(llm, 2).question_for(&context, &assessment).await;

        assert_eq!(
            question,
            "¿Cuál es tu presupuesto máximo aproximado? Y también, ¿tienes alguna marca de preferencia?"
        );
    }

    #[tokio::test]
    async fn unknown_category_gets_greeting_without_model_call() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let context = ConversationContext::new();
        let assessment = assess(&context, None);

        let question = planner(llm.clone(), 2).question_for(&context, &assessment).await;

        assert!(question.starts_with("¡Hola! Soy tu asesor de Alkosto."));
        assert!(question.contains("televisor"));
        assert_eq!(llm.calls_for(FOLLOW_UP_TASK), 0);
    }
}

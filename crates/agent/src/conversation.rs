use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use vendedor_core::domain::slots::{SlotKey, SlotValue};

use crate::guardrails::SlotGuardrail;
use crate::llm::{extract_json_object, LlmClient};
use crate::prompts::{PromptError, PromptTemplates};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Customer,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Slot values reported for one customer message. Only values that were
/// explicitly stated appear here; "not mentioned" is simply a missing key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotUpdate {
    pub slots: BTreeMap<SlotKey, SlotValue>,
    pub user_name: Option<String>,
}

impl SlotUpdate {
    pub fn with_slot(mut self, key: SlotKey, value: SlotValue) -> Self {
        self.slots.insert(key, value);
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.user_name.is_none()
    }
}

/// Accumulated shopping intent for one session.
///
/// Slots only ever grow or change through [`ConversationContext::merge`];
/// nothing but [`ConversationContext::reset`] removes them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversationContext {
    slots: BTreeMap<SlotKey, SlotValue>,
    history: Vec<Turn>,
    user_name: Option<String>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every value in `update`, returning the keys whose value changed.
    pub fn merge(&mut self, update: SlotUpdate) -> Vec<SlotKey> {
        let mut changed = Vec::new();
        for (key, value) in update.slots {
            if self.slots.get(&key) != Some(&value) {
                self.slots.insert(key, value);
                changed.push(key);
            }
        }
        if let Some(user_name) = update.user_name {
            self.user_name = Some(user_name);
        }
        changed
    }

    pub fn reset(&mut self) {
        self.slots.clear();
        self.history.clear();
        self.user_name = None;
    }

    pub fn push_turn(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.history.push(Turn { speaker, text: text.into(), at: Utc::now() });
    }

    pub fn slots(&self) -> &BTreeMap<SlotKey, SlotValue> {
        &self.slots
    }

    pub fn slot(&self, key: SlotKey) -> Option<&SlotValue> {
        self.slots.get(&key)
    }

    pub fn is_known(&self, key: SlotKey) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn known_slots(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.slots.keys().copied()
    }

    pub fn category(&self) -> Option<&str> {
        self.slot(SlotKey::Category).and_then(SlotValue::as_text)
    }

    pub fn budget_max(&self) -> Option<Decimal> {
        self.slot(SlotKey::BudgetMax).and_then(SlotValue::as_amount)
    }

    pub fn brand(&self) -> Option<&str> {
        self.slot(SlotKey::Brand).and_then(SlotValue::as_text)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn recent_history(&self, window: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("slot extraction call failed: {0}")]
    Llm(String),
    #[error("slot extraction output was malformed: {0}")]
    Malformed(&'static str),
}

/// Turns a customer message into a validated [`SlotUpdate`] through one model call.
pub struct SlotExtractor {
    llm: Arc<dyn LlmClient>,
    templates: Arc<PromptTemplates>,
    guardrail: SlotGuardrail,
    history_window: usize,
}

impl SlotExtractor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        templates: Arc<PromptTemplates>,
        history_window: usize,
    ) -> Self {
        Self { llm, templates, guardrail: SlotGuardrail::new(), history_window }
    }

    pub async fn extract(
        &self,
        context: &ConversationContext,
        message: &str,
    ) -> Result<SlotUpdate, ExtractionError> {
        let prompt = self.templates.render_extraction(context, self.history_window, message)?;
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| ExtractionError::Llm(error.to_string()))?;
        self.parse(&raw)
    }

    /// Parses `{"slots": {...}, "user_name": ...}` (or the `nueva_info` spelling).
    pub fn parse(&self, raw: &str) -> Result<SlotUpdate, ExtractionError> {
        let document =
            extract_json_object(raw).ok_or(ExtractionError::Malformed("no json object"))?;
        let slots = match document.get("slots").or_else(|| document.get("nueva_info")) {
            Some(Value::Object(slots)) => slots,
            Some(Value::Null) | None if has_name_only(&document) => {
                return Ok(SlotUpdate {
                    slots: BTreeMap::new(),
                    user_name: self.guardrail.sanitize_user_name(user_name_field(&document)),
                });
            }
            Some(_) => return Err(ExtractionError::Malformed("slots is not an object")),
            None => return Err(ExtractionError::Malformed("missing slots object")),
        };

        let sanitized = self.guardrail.sanitize(slots);
        for rejected in &sanitized.rejected {
            debug!(
                event_name = "agent.extraction.slot_rejected",
                error = %rejected,
                "dropping extracted slot"
            );
        }

        Ok(SlotUpdate {
            slots: sanitized.accepted,
            user_name: self.guardrail.sanitize_user_name(user_name_field(&document)),
        })
    }
}

fn user_name_field(document: &Value) -> Option<&Value> {
    ["user_name", "nombre_usuario", "nombre"].into_iter().find_map(|key| document.get(key))
}

fn has_name_only(document: &Value) -> bool {
    user_name_field(document).is_some_and(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use vendedor_core::domain::slots::{SlotKey, SlotValue};

    use super::{ConversationContext, ExtractionError, SlotExtractor, SlotUpdate, Speaker};
    use crate::prompts::{PromptTemplates, EXTRACTION_TASK};
    use crate::testing::ScriptedLlmClient;

    fn extractor(llm: Arc<ScriptedLlmClient>) -> SlotExtractor {
        let templates = Arc::new(PromptTemplates::new("Alkosto").expect("templates"));
        SlotExtractor::new(llm, templates, 3)
    }

    fn tv_update() -> SlotUpdate {
        SlotUpdate::default()
            .with_slot(SlotKey::Category, SlotValue::Text("televisor".to_string()))
            .with_slot(SlotKey::BudgetMax, SlotValue::Amount(Decimal::new(1_500_000, 0)))
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = ConversationContext::new();
        once.merge(tv_update());

        let mut twice = once.clone();
        let changed = twice.merge(tv_update());

        assert_eq!(once, twice);
        assert!(changed.is_empty());
    }

    #[test]
    fn merge_is_monotonic_and_overwrites_only_reported_keys() {
        let mut context = ConversationContext::new();
        context.merge(tv_update());

        let changed = context.merge(
            SlotUpdate::default().with_slot(SlotKey::Brand, SlotValue::Text("LG".to_string())),
        );
        assert_eq!(changed, vec![SlotKey::Brand]);
        assert_eq!(context.category(), Some("televisor"));
        assert_eq!(context.budget_max(), Some(Decimal::new(1_500_000, 0)));

        let changed = context.merge(SlotUpdate::default());
        assert!(changed.is_empty());
        assert_eq!(context.known_slots().count(), 3);

        context.merge(
            SlotUpdate::default()
                .with_slot(SlotKey::BudgetMax, SlotValue::Amount(Decimal::new(2_000_000, 0))),
        );
        assert_eq!(context.budget_max(), Some(Decimal::new(2_000_000, 0)));
    }

    #[test]
    fn reset_clears_slots_history_and_name() {
        let mut context = ConversationContext::new();
        context.merge(tv_update().with_user_name("Ana"));
        context.push_turn(Speaker::Customer, "hola");

        context.reset();

        assert_eq!(context, ConversationContext::new());
    }

    #[test]
    fn recent_history_keeps_last_turns_in_order() {
        let mut context = ConversationContext::new();
        for text in ["uno", "dos", "tres", "cuatro"] {
            context.push_turn(Speaker::Customer, text);
        }

        let recent = context.recent_history(3).iter().map(|t| t.text.as_str()).collect::<Vec<_>>();
        assert_eq!(recent, vec!["dos", "tres", "cuatro"]);
        assert_eq!(context.recent_history(10).len(), 4);
    }

    #[tokio::test]
    async fn extracts_slots_and_user_name_from_model_output() {
        let llm = Arc::new(ScriptedLlmClient::new().on(
            EXTRACTION_TASK,
            r#"```json
{"slots": {"category": "tv", "budget_max": 1500000, "brand": null}, "user_name": "Ana"}
```"#,
        ));
        let extractor = extractor(llm.clone());

        let update = extractor
            .extract(&ConversationContext::new(), "Soy Ana, busco tv de 1.5 millones")
            .await
            .expect("extraction succeeds");

        assert_eq!(update.slots.get(&SlotKey::Category), Some(&SlotValue::Text("tv".to_string())));
        assert_eq!(
            update.slots.get(&SlotKey::BudgetMax),
            Some(&SlotValue::Amount(Decimal::new(1_500_000, 0)))
        );
        assert!(!update.slots.contains_key(&SlotKey::Brand));
        assert_eq!(update.user_name.as_deref(), Some("Ana"));
        assert_eq!(llm.calls_for(EXTRACTION_TASK), 1);
    }

    #[test]
    fn accepts_spanish_envelope() {
        let extractor = extractor(Arc::new(ScriptedLlmClient::new()));
        let update = extractor
            .parse(r#"{"nueva_info": {"presupuesto_max": "800 mil", "uso_principal": "series"}}"#)
            .expect("parses");

        assert_eq!(update.slots.get(&SlotKey::BudgetMax), Some(&SlotValue::Amount(800_000.into())));
        assert_eq!(
            update.slots.get(&SlotKey::PrimaryUse),
            Some(&SlotValue::Text("series".to_string()))
        );
    }

    #[test]
    fn malformed_output_is_an_error() {
        let extractor = extractor(Arc::new(ScriptedLlmClient::new()));

        assert!(matches!(extractor.parse("lo siento"), Err(ExtractionError::Malformed(_))));
        assert!(matches!(
            extractor.parse(r#"{"slots": ["televisor"]}"#),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(
            extractor.parse(r#"{"respuesta": "hola"}"#),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn model_failure_surfaces_as_llm_error() {
        let llm = Arc::new(ScriptedLlmClient::new().failing(EXTRACTION_TASK, "connection reset"));
        let error = extractor(llm)
            .extract(&ConversationContext::new(), "hola")
            .await
            .expect_err("call fails");

        assert!(matches!(error, ExtractionError::Llm(ref message) if message.contains("reset")));
    }
}

//! Validation of model-reported slot values before they reach a conversation.
//!
//! The language model is only a translator: every value it reports is checked
//! against the slot allow-list and normalized here, and anything that does not
//! survive is dropped rather than guessed.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use vendedor_core::domain::money::parse_amount;
use vendedor_core::domain::slots::{SlotKey, SlotValue};
use vendedor_core::errors::DomainError;

const MAX_TEXT_CHARS: usize = 120;
const MAX_NAME_CHARS: usize = 60;

const PLACEHOLDERS: &[&str] = &[
    "null",
    "none",
    "nil",
    "n/a",
    "na",
    "-",
    "?",
    "unknown",
    "desconocido",
    "desconocida",
    "no especificado",
    "no especificada",
    "sin especificar",
    "ninguno",
    "ninguna",
    "no se",
    "no sé",
    "no aplica",
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SanitizedSlots {
    pub accepted: BTreeMap<SlotKey, SlotValue>,
    pub rejected: Vec<DomainError>,
}

#[derive(Clone, Debug, Default)]
pub struct SlotGuardrail;

impl SlotGuardrail {
    pub fn new() -> Self {
        Self
    }

    /// Filters a raw `{name: value}` object down to allow-listed, well-formed values.
    ///
    /// Null and placeholder values are treated as "not mentioned" and are
    /// neither accepted nor reported as rejected.
    pub fn sanitize(&self, raw: &Map<String, Value>) -> SanitizedSlots {
        let mut sanitized = SanitizedSlots::default();

        for (name, value) in raw {
            let Some(key) = SlotKey::parse(name) else {
                sanitized.rejected.push(DomainError::UnknownSlot(name.clone()));
                continue;
            };

            match self.validate(key, value) {
                Ok(Some(slot_value)) => {
                    sanitized.accepted.insert(key, slot_value);
                }
                Ok(None) => {}
                Err(reason) => {
                    sanitized.rejected.push(DomainError::InvalidSlotValue {
                        slot: key.as_str().to_string(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        sanitized
    }

    pub fn validate(&self, key: SlotKey, value: &Value) -> Result<Option<SlotValue>, &'static str> {
        match key {
            SlotKey::BudgetMax => validate_budget(value),
            _ => validate_text(value),
        }
    }

    pub fn sanitize_user_name(&self, value: Option<&Value>) -> Option<String> {
        let text = value?.as_str()?.trim();
        if is_placeholder(text) || text.chars().count() > MAX_NAME_CHARS {
            return None;
        }
        Some(text.to_string())
    }
}

fn validate_budget(value: &Value) -> Result<Option<SlotValue>, &'static str> {
    let amount = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(Decimal::from)
            .or_else(|| number.as_f64().and_then(|float| Decimal::try_from(float).ok()))
            .ok_or("budget_not_representable")?,
        Value::String(text) if is_placeholder(text) => return Ok(None),
        Value::String(text) => parse_money_phrase(text).ok_or("budget_not_numeric")?,
        _ => return Err("budget_not_numeric"),
    };

    if amount <= Decimal::ZERO {
        return Err("budget_not_positive");
    }
    Ok(Some(SlotValue::Amount(amount.normalize())))
}

fn validate_text(value: &Value) -> Result<Option<SlotValue>, &'static str> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return Err("expected_text"),
    };

    if is_placeholder(&text) {
        return Ok(None);
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err("text_too_long");
    }
    Ok(Some(SlotValue::Text(text)))
}

fn is_placeholder(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    normalized.is_empty() || PLACEHOLDERS.contains(&normalized.as_str())
}

/// Parses Spanish money phrases: `1.5 millones`, `2M`, `800 mil`, `$1.500.000`.
///
/// The first number in the text wins. A multiplier word or suffix scales it;
/// without one the number is read in Colombian format.
pub fn parse_money_phrase(text: &str) -> Option<Decimal> {
    let lowered = text.to_lowercase();
    let tokens = lowered.split_whitespace().collect::<Vec<_>>();

    for (index, raw_token) in tokens.iter().enumerate() {
        let token = raw_token
            .trim_matches(|ch: char| !(ch.is_alphanumeric() || ch == '.' || ch == ','));
        let number_end = token
            .find(|ch: char| !(ch.is_ascii_digit() || ch == '.' || ch == ','))
            .unwrap_or(token.len());
        let (number, suffix) = token.split_at(number_end);
        if !number.chars().any(|ch| ch.is_ascii_digit()) {
            continue;
        }

        let multiplier_word = if suffix.is_empty() {
            tokens.get(index + 1).map(|next| next.trim_matches(|ch: char| !ch.is_alphabetic()))
        } else {
            Some(suffix)
        };

        let amount = match multiplier_word.and_then(multiplier_for) {
            Some(multiplier) => parse_scaled(number)?.checked_mul(multiplier)?,
            None => parse_amount(number)?,
        };
        return Some(amount.normalize()).filter(|amount| *amount > Decimal::ZERO);
    }

    None
}

fn multiplier_for(word: &str) -> Option<Decimal> {
    match word {
        "m" | "mm" | "millon" | "millón" | "millones" | "palo" | "palos" => {
            Some(Decimal::from(1_000_000))
        }
        "k" | "mil" => Some(Decimal::from(1_000)),
        _ => None,
    }
}

/// Reads the number before a multiplier, where `,` and `.` both mark decimals.
fn parse_scaled(number: &str) -> Option<Decimal> {
    let normalized = number.trim_matches(['.', ',']).replace(',', ".");
    if normalized.matches('.').count() > 1 {
        return parse_amount(number);
    }
    normalized.parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use vendedor_core::domain::slots::{SlotKey, SlotValue};
    use vendedor_core::errors::DomainError;

    use super::{parse_money_phrase, SlotGuardrail};

    fn object(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        }
    }

    #[test]
    fn parses_spanish_money_phrases() {
        assert_eq!(parse_money_phrase("presupuesto 1.5 millones"), Some(Decimal::new(1_500_000, 0)));
        assert_eq!(parse_money_phrase("1,5 millones"), Some(Decimal::new(1_500_000, 0)));
        assert_eq!(parse_money_phrase("hasta 2M"), Some(Decimal::new(2_000_000, 0)));
        assert_eq!(parse_money_phrase("unos 800 mil pesos"), Some(Decimal::new(800_000, 0)));
        assert_eq!(parse_money_phrase("$1.500.000"), Some(Decimal::new(1_500_000, 0)));
        assert_eq!(parse_money_phrase("3 palos"), Some(Decimal::new(3_000_000, 0)));
        assert_eq!(parse_money_phrase("1500000"), Some(Decimal::new(1_500_000, 0)));
    }

    #[test]
    fn overflowing_money_phrases_are_rejected() {
        assert_eq!(parse_money_phrase("79228162514264337593543950335 millones"), None);
        assert_eq!(
            SlotGuardrail::new()
                .validate(SlotKey::BudgetMax, &json!("80000000000000000000000000 mil")),
            Err("budget_not_numeric")
        );
    }

    #[test]
    fn money_phrases_without_numbers_are_rejected() {
        assert_eq!(parse_money_phrase("barato"), None);
        assert_eq!(parse_money_phrase("0 pesos"), None);
        assert_eq!(parse_money_phrase(""), None);
    }

    #[test]
    fn accepts_allow_listed_slots_and_drops_unknown_names() {
        let sanitized = SlotGuardrail::new().sanitize(&object(json!({
            "categoria": "televisor",
            "presupuesto_max": "1.5 millones",
            "marca": " Samsung ",
            "resolucion": "4K"
        })));

        assert_eq!(
            sanitized.accepted.get(&SlotKey::Category),
            Some(&SlotValue::Text("televisor".to_string()))
        );
        assert_eq!(
            sanitized.accepted.get(&SlotKey::BudgetMax),
            Some(&SlotValue::Amount(Decimal::new(1_500_000, 0)))
        );
        assert_eq!(
            sanitized.accepted.get(&SlotKey::Brand),
            Some(&SlotValue::Text("Samsung".to_string()))
        );
        assert_eq!(sanitized.rejected, vec![DomainError::UnknownSlot("resolucion".to_string())]);
    }

    #[test]
    fn null_and_placeholder_values_are_absent_not_rejected() {
        let sanitized = SlotGuardrail::new().sanitize(&object(json!({
            "category": null,
            "brand": "N/A",
            "primary_use": "desconocido",
            "space": "   ",
            "budget_max": "null"
        })));

        assert!(sanitized.accepted.is_empty());
        assert!(sanitized.rejected.is_empty());
    }

    #[test]
    fn invalid_budgets_are_rejected() {
        let sanitized = SlotGuardrail::new().sanitize(&object(json!({
            "budget_max": -5,
            "household_size": 4,
            "primary_use": ["gaming"]
        })));

        assert_eq!(
            sanitized.accepted.get(&SlotKey::HouseholdSize),
            Some(&SlotValue::Text("4".to_string()))
        );
        assert_eq!(
            sanitized.rejected,
            vec![
                DomainError::InvalidSlotValue {
                    slot: "budget_max".to_string(),
                    reason: "budget_not_positive".to_string(),
                },
                DomainError::InvalidSlotValue {
                    slot: "primary_use".to_string(),
                    reason: "expected_text".to_string(),
                },
            ]
        );
    }

    #[test]
    fn numeric_budgets_are_normalized() {
        let guardrail = SlotGuardrail::new();
        assert_eq!(
            guardrail.validate(SlotKey::BudgetMax, &json!(1500000.0)),
            Ok(Some(SlotValue::Amount(Decimal::new(1_500_000, 0))))
        );
        assert_eq!(guardrail.validate(SlotKey::BudgetMax, &json!("mucho")), Err("budget_not_numeric"));
    }

    #[test]
    fn user_names_are_trimmed_and_bounded() {
        let guardrail = SlotGuardrail::new();
        assert_eq!(guardrail.sanitize_user_name(Some(&json!(" Ana "))), Some("Ana".to_string()));
        assert_eq!(guardrail.sanitize_user_name(Some(&json!("null"))), None);
        assert_eq!(guardrail.sanitize_user_name(Some(&json!(42))), None);
        assert_eq!(guardrail.sanitize_user_name(None), None);
    }
}

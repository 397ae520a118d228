//! Shopping-intent slots.
//!
//! The set of slot names is closed: criteria discovered at runtime and values
//! extracted by the language model are both mapped onto [`SlotKey`] and anything
//! outside the allow-list is discarded before it reaches a conversation context.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Slot names in follow-up priority order (derived `Ord` follows declaration order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    Category,
    BudgetMax,
    Brand,
    PrimaryUse,
    HouseholdSize,
    Space,
}

impl SlotKey {
    pub const ALL: [SlotKey; 6] = [
        SlotKey::Category,
        SlotKey::BudgetMax,
        SlotKey::Brand,
        SlotKey::PrimaryUse,
        SlotKey::HouseholdSize,
        SlotKey::Space,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::BudgetMax => "budget_max",
            Self::Brand => "brand",
            Self::PrimaryUse => "primary_use",
            Self::HouseholdSize => "household_size",
            Self::Space => "space",
        }
    }

    /// Human label used inside Spanish prompts and fallback questions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Category => "tipo de producto",
            Self::BudgetMax => "presupuesto máximo",
            Self::Brand => "marca preferida",
            Self::PrimaryUse => "uso principal",
            Self::HouseholdSize => "número de personas en el hogar",
            Self::Space => "espacio disponible",
        }
    }

    /// Maps English and Spanish slot spellings onto the allow-list.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        let key = match normalized.as_str() {
            "category" | "categoria" | "categoría" | "kategorie" | "product_type" => Self::Category,
            "budget_max" | "budget" | "max_budget" | "presupuesto_max" | "presupuesto"
            | "presupuesto_maximo" | "presupuesto_máximo" => Self::BudgetMax,
            "brand" | "marca" => Self::Brand,
            "primary_use" | "use" | "usage" | "uso_principal" | "uso" => Self::PrimaryUse,
            "household_size" | "tamano_hogar" | "tamaño_hogar" | "personas_hogar" => {
                Self::HouseholdSize
            }
            "space" | "available_space" | "espacio_disponible" | "espacio" => Self::Space,
            _ => return None,
        };
        Some(key)
    }

    /// Slots that may be used as search criteria (category gates the whole search).
    pub fn is_criterion(&self) -> bool {
        !matches!(self, Self::Category)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SlotValue {
    Amount(Decimal),
    Text(String),
}

impl SlotValue {
    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            Self::Amount(amount) => Some(*amount),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Amount(_) => None,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(amount) => write!(f, "{}", amount.normalize()),
            Self::Text(text) => f.write_str(text),
        }
    }
}

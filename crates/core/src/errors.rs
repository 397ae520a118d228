use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;

/// Apology sent whenever a turn cannot be completed.
pub const APOLOGY_MESSAGE: &str =
    "Disculpa, tuve un pequeño problema. ¿Podrías repetir tu pregunta?";
pub const CATALOG_UNAVAILABLE_MESSAGE: &str =
    "En este momento no puedo consultar el catálogo. Intenta de nuevo en unos minutos.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown slot `{0}`")]
    UnknownSlot(String),
    #[error("invalid value for slot `{slot}`: {reason}")]
    InvalidSlotValue { slot: String, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("catalog failure: {0}")]
    Catalog(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Customer-facing text; internal error details never reach the chat.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Catalog(_) => CATALOG_UNAVAILABLE_MESSAGE,
            Self::Domain(_) | Self::Integration(_) | Self::Configuration(_) => APOLOGY_MESSAGE,
        }
    }
}

impl From<CatalogError> for ApplicationError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value.to_string())
    }
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::catalog::CatalogError;
    use crate::config::ConfigError;
    use crate::errors::{ApplicationError, DomainError, APOLOGY_MESSAGE};

    #[test]
    fn domain_error_maps_to_apology() {
        let error = ApplicationError::from(DomainError::UnknownSlot("resolucion".to_owned()));

        assert_eq!(error.user_message(), APOLOGY_MESSAGE);
        assert_eq!(error.to_string(), "unknown slot `resolucion`");
    }

    #[test]
    fn catalog_error_has_user_safe_message() {
        let error =
            ApplicationError::from(CatalogError::MissingFile(PathBuf::from("/srv/catalog.csv")));

        assert!(matches!(error, ApplicationError::Catalog(ref message) if message.contains("catalog.csv")));
        assert!(!error.user_message().contains("catalog.csv"));
    }

    #[test]
    fn configuration_error_keeps_details_internal() {
        let error = ApplicationError::from(ConfigError::Validation("llm.api_key".to_owned()));

        assert!(matches!(error, ApplicationError::Configuration(_)));
        assert_eq!(error.user_message(), APOLOGY_MESSAGE);
    }
}

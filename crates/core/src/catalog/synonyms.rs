//! Category vocabulary shared by catalog loading, search, and slot resolution.

/// Canonical category → accepted spellings. Order matters when categorizing a
/// product: the first category whose synonym appears in the text wins.
const CATEGORY_SYNONYMS: &[(&str, &[&str])] = &[
    ("televisor", &["televisor", "televisores", "television", "tv", "smart tv", "tele"]),
    ("nevera", &["nevera", "neveras", "nevecon", "refrigerador", "refrigeradora", "frigorifico"]),
    ("lavadora", &["lavadora", "lavadoras", "lavasecadora", "washing"]),
    ("celular", &["celular", "celulares", "smartphone", "movil", "telefono"]),
    (
        "computador",
        &["computador", "computadores", "computadora", "laptop", "portatil", "pc", "notebook"],
    ),
    ("tablet", &["tablet", "tablets", "ipad"]),
    ("parlante", &["parlante", "parlantes", "speaker", "altavoz"]),
    ("auriculares", &["auriculares", "auricular", "audifonos", "headphones", "earphones"]),
    ("microondas", &["microondas", "microwave"]),
    ("aire_acondicionado", &["aire acondicionado", "aires acondicionados"]),
];

pub const UNCATEGORIZED: &str = "otros";

pub fn known_categories() -> Vec<&'static str> {
    CATEGORY_SYNONYMS.iter().map(|(canonical, _)| *canonical).collect()
}

pub fn synonyms_for(canonical: &str) -> &'static [&'static str] {
    CATEGORY_SYNONYMS
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, synonyms)| *synonyms)
        .unwrap_or(&[])
}

/// Resolves a free-text category mention to its canonical name.
///
/// Exact matches are tried first, then whole-word phrase matches, so
/// "un smart tv grande" resolves to `televisor` while "pcb" does not match `pc`.
pub fn resolve_category(term: &str) -> Option<&'static str> {
    let normalized = normalize_term(term);
    if normalized.is_empty() {
        return None;
    }

    for (canonical, synonyms) in CATEGORY_SYNONYMS {
        if normalize_term(canonical) == normalized
            || synonyms.iter().any(|synonym| *synonym == normalized)
        {
            return Some(*canonical);
        }
    }

    CATEGORY_SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|synonym| contains_phrase(&normalized, synonym)))
        .map(|(canonical, _)| *canonical)
}

/// Derives a product's canonical category from its product type and title.
pub fn categorize(product_type: &str, title: &str) -> &'static str {
    let text = normalize_term(&format!("{product_type} {title}"));
    CATEGORY_SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|synonym| contains_phrase(&text, synonym)))
        .map(|(canonical, _)| *canonical)
        .unwrap_or(UNCATEGORIZED)
}

/// Lowercases, folds Spanish accents, and collapses punctuation into single spaces.
pub fn normalize_term(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other if other.is_alphanumeric() => other,
            _ => ' ',
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word phrase containment over already-normalized text.
pub fn contains_phrase(normalized_text: &str, phrase: &str) -> bool {
    format!(" {normalized_text} ").contains(&format!(" {phrase} "))
}

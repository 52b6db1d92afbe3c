//! Locale-insensitive classification of free-text order status labels.
//!
//! The CRM org may run with translated picklists, so the same logical
//! status arrives as "Draft" or "Rascunho" depending on the user who
//! last touched the order. Comparison happens on a canonical key:
//! Unicode NFD, combining marks stripped, lower-cased, trimmed.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Closed vocabulary the orchestrator branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Draft,
    Activated,
    Other,
}

const DRAFT_LABELS: &[&str] = &["Draft", "Rascunho"];
const ACTIVATED_LABELS: &[&str] = &["Activated", "Ativado", "Activado"];

/// Canonical comparison key: NFD, no combining marks, lowercase, trimmed.
pub fn canonical_key(label: &str) -> String {
    label
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Classifies a raw status label into the closed vocabulary.
pub fn classify(label: &str) -> OrderStatus {
    let key = canonical_key(label);
    if DRAFT_LABELS.iter().any(|l| canonical_key(l) == key) {
        OrderStatus::Draft
    } else if ACTIVATED_LABELS.iter().any(|l| canonical_key(l) == key) {
        OrderStatus::Activated
    } else {
        OrderStatus::Other
    }
}

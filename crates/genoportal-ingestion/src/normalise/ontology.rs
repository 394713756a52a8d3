//! Ontology term identifiers.
//!
//! Terms are checked against their identifier pattern only; whether the term
//! actually exists in the ontology is left to the repository.
//!
//! # Example
//! ```ignore
//! let (valid, invalid) = parse_terms("HP_0000118, HP:12", OntologyKind::Phenotype);
//! assert_eq!(valid, vec!["HP:0000118"]);
//! assert_eq!(invalid, vec!["HP:12"]);
//! ```

use lazy_static::lazy_static;
use regex::Regex;

use super::values::split_list;

lazy_static! {
    static ref HPO_TERM: Regex = Regex::new(r"^HP:\d{7}$").unwrap();
    static ref MONDO_TERM: Regex = Regex::new(r"^MONDO:\d{7}$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OntologyKind {
    /// Human Phenotype Ontology, `HP:0000118`.
    Phenotype,
    /// MONDO disease ontology, `MONDO:0007254`.
    Disorder,
}

impl OntologyKind {
    fn pattern(&self) -> &'static Regex {
        match self {
            OntologyKind::Phenotype => &HPO_TERM,
            OntologyKind::Disorder  => &MONDO_TERM,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OntologyKind::Phenotype => "HPO",
            OntologyKind::Disorder  => "MONDO",
        }
    }
}

/// Canonical spelling: upper-cased, `HP_0000118` → `HP:0000118`.
pub fn normalize_term(raw: &str) -> String {
    raw.trim().to_uppercase().replacen('_', ":", 1)
}

/// Split a comma-separated cell into (valid, invalid) terms, both normalised
/// and deduplicated in first-seen order.
pub fn parse_terms(cell: &str, kind: OntologyKind) -> (Vec<String>, Vec<String>) {
    let mut valid: Vec<String> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();
    for raw in split_list(cell) {
        let term = normalize_term(&raw);
        let bucket = if kind.pattern().is_match(&term) { &mut valid } else { &mut invalid };
        if !bucket.contains(&term) {
            bucket.push(term);
        }
    }
    (valid, invalid)
}

//! Cell value normalisation.
//!
//! - `ontology`: HPO / MONDO term identifiers, validated by pattern only
//! - `values`: abbreviations, dates, booleans, list splitting and numeric coercion

pub mod ontology;
pub mod values;

pub use ontology::{parse_terms, OntologyKind};
pub use values::{abbreviate, coerce_value, is_truthy, normalize_date, split_list};

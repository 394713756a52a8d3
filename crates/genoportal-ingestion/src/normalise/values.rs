//! Scalar cell normalisation shared by both row flavours.

use chrono::NaiveDate;
use serde_json::Value;

/// Known abbreviations, keyed by lower-cased cell text.
fn abbreviation(lower: &str) -> Option<&'static str> {
    match lower {
        "male" | "m"         => Some("M"),
        "female" | "f"       => Some("F"),
        "unknown" | "u"      => Some("U"),
        "yes" | "y"          => Some("Y"),
        "no" | "n"           => Some("N"),
        _ => None,
    }
}

/// Expand or contract a mapped value via the abbreviation table; other
/// values come back trimmed.
pub fn abbreviate(raw: &str) -> String {
    let trimmed = raw.trim();
    abbreviation(&trimmed.to_lowercase())
        .map(str::to_string)
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "y" | "yes" | "true" | "1" | "x")
}

/// Comma-separated cell → trimmed, non-empty items.
pub fn split_list(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalise a date cell to `YYYY-MM-DD`.
///
/// Accepts ISO dates and US `MM/DD/YYYY` or `MM/DD/YY`. Returns `None` when the
/// cell is not a recognisable date.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = if raw.contains('/') {
        let year_len = raw.rsplit('/').next().map(str::len).unwrap_or(0);
        let format = if year_len == 4 { "%m/%d/%Y" } else { "%m/%d/%y" };
        NaiveDate::parse_from_str(raw, format).ok()
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    };
    parsed.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Properties stored as integers when the cell parses as one.
const INTEGER_FIELDS: &[&str] = &["age", "birth_year", "age_at_death"];

/// Properties stored as floats when the cell parses as one.
const FLOAT_FIELDS: &[&str] = &["dna_concentration"];

/// Convert an already-abbreviated cell into the JSON value stored under
/// `field`: `is_*` flags become booleans, date fields ISO dates, numeric
/// fields numbers. Anything that does not parse stays a string.
pub fn coerce_value(field: &str, cell: &str) -> Value {
    if field.starts_with("is_") {
        return Value::Bool(is_truthy(cell));
    }
    if field.ends_with("date") || field.starts_with("date_") {
        if let Some(date) = normalize_date(cell) {
            return Value::String(date);
        }
    }
    if INTEGER_FIELDS.contains(&field) {
        if let Ok(n) = cell.parse::<i64>() {
            return Value::from(n);
        }
    }
    if FLOAT_FIELDS.contains(&field) {
        if let Ok(n) = cell.parse::<f64>() {
            return Value::from(n);
        }
    }
    Value::String(cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_abbreviations() {
        assert_eq!(abbreviate(" Male "), "M");
        assert_eq!(abbreviate("female"), "F");
        assert_eq!(abbreviate("YES"), "Y");
        assert_eq!(abbreviate("n"), "N");
        assert_eq!(abbreviate("WGS"), "WGS");
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("Y"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("N"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2021-03-04").as_deref(), Some("2021-03-04"));
        assert_eq!(normalize_date("3/4/2021").as_deref(), Some("2021-03-04"));
        assert_eq!(normalize_date("03/04/21").as_deref(), Some("2021-03-04"));
        assert_eq!(normalize_date("last tuesday"), None);
        assert_eq!(normalize_date("13/40/2021"), None);
    }

    #[test]
    fn test_coerce_value() {
        assert_eq!(coerce_value("is_pregnancy", "Y"), json!(true));
        assert_eq!(coerce_value("sequencing_date", "1/2/2020"), json!("2020-01-02"));
        assert_eq!(coerce_value("date_received", "2020-01-02"), json!("2020-01-02"));
        assert_eq!(coerce_value("birth_year", "1987"), json!(1987));
        assert_eq!(coerce_value("age", "about 40"), json!("about 40"));
        assert_eq!(coerce_value("dna_concentration", "12.5"), json!(12.5));
        assert_eq!(coerce_value("clinic_notes", "42"), json!("42"));
    }
}

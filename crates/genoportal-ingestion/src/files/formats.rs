//! Extension → file-format matching.

use std::collections::BTreeSet;

use genoportal_common::FileFormat;

/// Every dotted suffix of `name`, longest first.
/// `a_R1.fastq.gz` → `["fastq.gz", "gz"]`.
pub fn suffix_chain(name: &str) -> Vec<String> {
    let parts: Vec<&str> = name.split('.').collect();
    (1..parts.len())
        .map(|start| parts[start..].join("."))
        .filter(|suffix| !suffix.is_empty())
        .collect()
}

/// Formats in `catalog` accepting `extension`, standard or alternate.
pub fn match_formats(extension: &str, catalog: &[FileFormat]) -> BTreeSet<FileFormat> {
    catalog
        .iter()
        .filter(|format| format.accepts(extension))
        .cloned()
        .collect()
}

/// The suffix of `name` that `format` accepted, longest first.
pub fn matched_extension(name: &str, format: &FileFormat) -> Option<String> {
    suffix_chain(name).into_iter().find(|suffix| format.accepts(suffix))
}

/// Candidate names for an extra file of `name`, by swapping the primary's
/// matched extension for each of the extra format's extensions, standard
/// extension first.
pub fn extra_file_candidates(name: &str, primary: &FileFormat, extra: &FileFormat) -> Vec<String> {
    let Some(extension) = matched_extension(name, primary) else {
        return Vec::new();
    };
    let stem = &name[..name.len() - extension.len()];
    extra.extensions().map(|ext| format!("{}{}", stem, ext)).collect()
}

//! Submitted file names → file entities.
//!
//! One resolver lives for a whole submission. It sees every file name in the
//! sheet up front so that extra files and FASTQ mates can be matched
//! regardless of which row lists them first.

pub mod formats;
pub mod pairing;

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use genoportal_common::entities::{make_alias, ExtraFile, FileSubmitted, RelatedFile, PAIRED_WITH};
use genoportal_common::{EntityKind, FileFormat, Reference};

use crate::normalise::split_list;
use formats::{extra_file_candidates, match_formats, suffix_chain};
use pairing::{classify_paired_end, expected_mate};

lazy_static! {
    static ref VALID_FILE_NAME: Regex = Regex::new(r"^[\w+=,.@-]+$").unwrap();
}

/// Outcome of looking up one name's format.
#[derive(Debug, Clone, PartialEq)]
enum FormatLookup {
    Found(FileFormat),
    Ambiguous,
    Unknown,
}

/// Files created from one cell, the aliases the cell refers to, and its row errors.
#[derive(Debug, Default)]
pub struct ResolvedFiles {
    pub files: Vec<FileSubmitted>,
    pub aliases: Vec<Reference>,
    pub errors: Vec<String>,
}

pub struct FileNameResolver {
    project: String,
    catalog: Vec<FileFormat>,
    /// extension → formats accepting it, across the whole submission.
    cache: BTreeMap<String, BTreeSet<FileFormat>>,
    /// Extensions that matched more than one format.
    ambiguous: BTreeSet<String>,
    /// Every file name listed anywhere in the submission.
    submission_names: BTreeSet<String>,
    /// extra file name → primary file name.
    extra_of: BTreeMap<String, String>,
    /// primary file name → its extra files.
    extras: BTreeMap<String, Vec<ExtraFile>>,
}

impl FileNameResolver {
    pub fn new(
        project: impl Into<String>,
        catalog: Vec<FileFormat>,
        submission_names: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut resolver = Self {
            project: project.into(),
            catalog,
            cache: BTreeMap::new(),
            ambiguous: BTreeSet::new(),
            submission_names: submission_names.into_iter().collect(),
            extra_of: BTreeMap::new(),
            extras: BTreeMap::new(),
        };
        resolver.index_extra_files();
        resolver
    }

    /// Every name listed in a set of file cells.
    pub fn scan_names<'a>(cells: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        cells.into_iter().flat_map(split_list).collect()
    }

    pub fn alias_for(&self, name: &str) -> String {
        make_alias(&self.project, EntityKind::FileSubmitted, name)
    }

    /// Submission-wide errors, reported once however many rows hit them.
    pub fn global_errors(&self) -> Vec<String> {
        if self.ambiguous.is_empty() {
            return Vec::new();
        }
        let extensions: Vec<&str> = self.ambiguous.iter().map(String::as_str).collect();
        vec![format!(
            "Unable to match a unique file format for extension(s): {}",
            extensions.join(", ")
        )]
    }

    fn lookup_format(&mut self, name: &str) -> FormatLookup {
        for suffix in suffix_chain(name) {
            let key = suffix.to_lowercase();
            let matches = match self.cache.get(&key) {
                Some(hit) => hit.clone(),
                None => {
                    let found = match_formats(&key, &self.catalog);
                    self.cache.insert(key.clone(), found.clone());
                    found
                }
            };
            match matches.len() {
                0 => continue,
                1 => {
                    if let Some(format) = matches.into_iter().next() {
                        return FormatLookup::Found(format);
                    }
                }
                _ => {
                    self.ambiguous.insert(key);
                    return FormatLookup::Ambiguous;
                }
            }
        }
        FormatLookup::Unknown
    }

    /// Decide up front which submitted names are extra files of another
    /// submitted name.
    fn index_extra_files(&mut self) {
        let names: Vec<String> = self.submission_names.iter().cloned().collect();
        for name in &names {
            let FormatLookup::Found(primary) = self.lookup_format(name) else {
                continue;
            };
            for extra_id in &primary.extra_file_formats {
                let Some(extra) = self.catalog.iter().find(|f| &f.identifier == extra_id).cloned() else {
                    continue;
                };
                let found = extra_file_candidates(name, &primary, &extra)
                    .into_iter()
                    .find(|candidate| candidate != name && self.submission_names.contains(candidate));
                if let Some(extra_name) = found {
                    debug!(primary = %name, extra = %extra_name, "Attached extra file");
                    self.extra_of.insert(extra_name.clone(), name.clone());
                    self.extras.entry(name.clone()).or_default().push(ExtraFile {
                        filename: extra_name,
                        file_format: extra.identifier.clone(),
                    });
                }
            }
        }
    }

    /// Resolve one comma-separated cell listed on row `row`.
    pub fn resolve_cell(
        &mut self,
        cell: &str,
        row: usize,
        genome_build: Option<&str>,
        variant_type: Option<&str>,
    ) -> ResolvedFiles {
        let mut resolved = ResolvedFiles::default();
        let names = split_list(cell);

        let invalid: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| !VALID_FILE_NAME.is_match(n))
            .collect();
        if !invalid.is_empty() {
            resolved.errors.push(format!(
                "Row {} - invalid file name(s) {}; names may contain only letters, digits and +=,.@-_",
                row,
                invalid.join(", ")
            ));
        }

        for name in names.iter().filter(|n| VALID_FILE_NAME.is_match(n)) {
            if let Some(primary) = self.extra_of.get(name) {
                let alias = Reference::alias(self.alias_for(primary));
                if !resolved.aliases.contains(&alias) {
                    resolved.aliases.push(alias);
                }
                continue;
            }

            let format = match self.lookup_format(name) {
                FormatLookup::Found(format) => format,
                FormatLookup::Ambiguous => continue,
                FormatLookup::Unknown => {
                    resolved.errors.push(format!(
                        "Row {} - unable to identify file format of {}; extension not recognized",
                        row, name
                    ));
                    continue;
                }
            };

            let mut file = FileSubmitted {
                alias: self.alias_for(name),
                filename: name.clone(),
                file_format: format.identifier.clone(),
                genome_build: genome_build.map(str::to_string),
                variant_type: variant_type.map(str::to_string),
                extra_files: self.extras.get(name).cloned().unwrap_or_default(),
                ..Default::default()
            };
            if format.is_fastq() {
                if let Err(message) = self.pair_fastq(&mut file, row) {
                    resolved.errors.push(message);
                }
            }

            let alias = Reference::alias(file.alias.clone());
            if !resolved.aliases.contains(&alias) {
                resolved.aliases.push(alias);
                resolved.files.push(file);
            }
        }
        resolved
    }

    /// Set `paired_end` and the "paired with" link. Both mates compute each
    /// other's name, so the link comes out symmetric in either row order.
    fn pair_fastq(&self, file: &mut FileSubmitted, row: usize) -> Result<(), String> {
        let Some(end) = classify_paired_end(&file.filename) else {
            return Err(format!(
                "Row {} - unable to determine paired end of FASTQ file {}; file would be unpaired",
                row, file.filename
            ));
        };
        file.paired_end = Some(end.as_str().to_string());

        let mate = expected_mate(&file.filename, end);
        if !self.submission_names.contains(&mate) {
            return Err(format!(
                "Row {} - FASTQ file {} is unpaired; expected paired file {} was not submitted",
                row, file.filename, mate
            ));
        }
        file.related_files.push(RelatedFile {
            relationship_type: PAIRED_WITH.to_string(),
            file: Reference::alias(self.alias_for(&mate)),
        });
        Ok(())
    }
}

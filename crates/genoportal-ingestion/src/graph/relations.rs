//! Relationship post-processing, run once every row has been merged.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use genoportal_common::entities::{Family, Individual};
use genoportal_common::Reference;

use super::merge::{merge_link, Conflict};

/// Suffix for the set of relations seen under one analysis.
///
/// A proband alone or with one parent keeps the bare workup; the full
/// proband/mother/father set is a trio; anyone else makes it a group.
pub fn relation_label(relations: &BTreeSet<String>) -> &'static str {
    let core: BTreeSet<String> = ["proband", "mother", "father"].iter().map(|s| s.to_string()).collect();
    if *relations == core {
        "-Trio"
    } else if relations.is_subset(&core) {
        ""
    } else {
        "-Group"
    }
}

/// `WGS/WES-Group`: distinct workups in descending order, then the label.
pub fn analysis_type(relations: &BTreeSet<String>, workups: &BTreeSet<String>) -> Option<String> {
    if workups.is_empty() {
        return None;
    }
    let joined: Vec<&str> = workups.iter().rev().map(String::as_str).collect();
    Some(format!("{}{}", joined.join("/"), relation_label(relations)))
}

/// Move each family's transient mother/father slots onto its proband and
/// siblings, then clear the slots. Returns `(individual alias, conflict)`
/// for every individual that already had a different parent.
pub fn add_individual_relations(
    families: &mut BTreeMap<String, Family>,
    individuals: &mut BTreeMap<String, Individual>,
) -> Vec<(String, Conflict)> {
    let mut conflicts = Vec::new();

    for family in families.values_mut() {
        let relations = std::mem::take(&mut family.relations);
        if relations.mother.is_none() && relations.father.is_none() {
            continue;
        }

        let children: Vec<&Reference> = family.proband.iter().chain(relations.siblings.iter()).collect();
        for child in children {
            let Some(individual) = individuals.get_mut(child.as_str()) else {
                continue;
            };
            let mut found = Vec::new();
            merge_link("mother", &mut individual.mother, relations.mother.clone(), &mut found);
            merge_link("father", &mut individual.father, relations.father.clone(), &mut found);
            debug!(family = %family.alias, individual = %individual.alias, "Propagated parents");
            conflicts.extend(found.into_iter().map(|c| (individual.alias.clone(), c)));
        }
    }
    conflicts
}

/// Parent links that point outside the submitted individuals:
/// `(child alias, field, missing parent alias)`.
pub fn missing_parents(individuals: &BTreeMap<String, Individual>) -> Vec<(String, &'static str, String)> {
    let mut missing = Vec::new();
    for individual in individuals.values() {
        for (field, parent) in [("mother", &individual.mother), ("father", &individual.father)] {
            if let Some(parent) = parent {
                if !individuals.contains_key(parent.as_str()) {
                    missing.push((individual.alias.clone(), field, parent.as_str().to_string()));
                }
            }
        }
    }
    missing
}

/// Most frequent phenotypes among a family's members, ties broken by term,
/// at most `limit`.
pub fn pooled_phenotypes(family: &Family, individuals: &BTreeMap<String, Individual>, limit: usize) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for member in &family.members {
        let Some(individual) = individuals.get(member.as_str()) else {
            continue;
        };
        for feature in &individual.phenotypic_features {
            *counts.entry(feature.phenotypic_feature.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.into_iter().take(limit).map(|(term, _)| term.to_string()).collect()
}

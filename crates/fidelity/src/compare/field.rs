//! Field-by-field comparison of two matched records.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::ReconConfig;
use crate::input::{FilePair, Record};

use super::pattern::deep_diff;

/// How a matched pair of records compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Identical,
    /// At least one compared field differs.
    Broken,
    /// One or both records have the wrong field count.
    Defective,
}

/// One differing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub index: usize,
    pub old: String,
    pub new: String,
    pub pattern: String,
    /// Audit entry for the field's report.
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub class: Classification,
    pub field_errors: Vec<FieldError>,
    /// One entry per malformed side.
    pub defective_reports: Vec<String>,
}

impl Comparison {
    pub fn is_identical(&self) -> bool {
        self.class == Classification::Identical
    }
}

/// Compares matched records on every non-excluded field.
#[derive(Debug, Clone)]
pub struct FieldComparator {
    number_of_fields: usize,
    excluded: BTreeSet<usize>,
    legacy_name: String,
    new_name: String,
}

impl FieldComparator {
    pub fn new(
        number_of_fields: usize,
        excluded: impl IntoIterator<Item = usize>,
        legacy_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self {
            number_of_fields,
            excluded: excluded.into_iter().collect(),
            legacy_name: legacy_name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn from_config(config: &ReconConfig) -> Self {
        Self::new(
            config.records.number_of_fields,
            config.records.excluded_fields.iter().copied(),
            &config.legacy_name,
            &config.new_name,
        )
    }

    pub fn is_excluded(&self, index: usize) -> bool {
        self.excluded.contains(&index)
    }

    pub fn compare(&self, pair: &FilePair, legacy: &Record, new: &Record) -> Comparison {
        let legacy_ok = legacy.is_well_formed(self.number_of_fields);
        let new_ok = new.is_well_formed(self.number_of_fields);

        if !legacy_ok || !new_ok {
            let mut defective_reports = Vec::new();
            if !legacy_ok {
                defective_reports.push(format!("{}\n{}\n", pair.legacy.display(), legacy));
            }
            if !new_ok {
                defective_reports.push(format!("{}\n{}\n", pair.new.display(), new));
            }
            return Comparison {
                class: Classification::Defective,
                field_errors: Vec::new(),
                defective_reports,
            };
        }

        let label = pair.label();
        let field_errors: Vec<FieldError> = legacy
            .fields
            .iter()
            .zip(&new.fields)
            .enumerate()
            .filter(|(index, (old, new))| !self.is_excluded(*index) && old != new)
            .map(|(index, (old, new_value))| {
                let pattern = deep_diff(old, new_value);
                let report = format!(
                    "{label} :: {index} :: [{old}]:[{new_value}] :: ({pattern})\n\
                     {:<10}: {legacy}\n\
                     {:<10}: {new}\n\n",
                    self.legacy_name, self.new_name,
                );
                FieldError {
                    index,
                    old: old.clone(),
                    new: new_value.clone(),
                    pattern,
                    report,
                }
            })
            .collect();

        let class = if field_errors.is_empty() {
            Classification::Identical
        } else {
            Classification::Broken
        };

        Comparison {
            class,
            field_errors,
            defective_reports: Vec::new(),
        }
    }
}

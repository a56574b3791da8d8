//! Run configuration, loaded from TOML and validated before any file is read.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FidelityError, Result};
use crate::input::RecordLayout;
use crate::stats::Side;

// =============================================================================
// TOP-LEVEL CONFIG
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    /// Run name, used for the run directory and the progress header.
    #[serde(default = "default_name")]
    pub name: String,
    /// Display label of the legacy system.
    #[serde(default = "default_legacy_name")]
    pub legacy_name: String,
    /// Display label of the new system.
    #[serde(default = "default_new_name")]
    pub new_name: String,
    pub storage: StorageConfig,
    pub records: RecordConfig,
    #[serde(default)]
    pub keys: KeyConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_name() -> String {
    "Diff".to_string()
}

fn default_legacy_name() -> String {
    "OldSys".to_string()
}

fn default_new_name() -> String {
    "NewSys".to_string()
}

// =============================================================================
// STORAGE
// =============================================================================

/// Where input files live and where reports go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Legacy file or directory.
    pub legacy: PathBuf,
    /// New-system file or directory.
    pub new: PathBuf,
    /// Root directory for run output.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_legacy_mask")]
    pub legacy_mask: String,
    #[serde(default = "default_new_mask")]
    pub new_mask: String,
    /// Single-group pattern extracting the canonical name from a file name.
    #[serde(default = "default_rename_pattern")]
    pub rename_pattern: String,
}

fn default_output() -> PathBuf {
    PathBuf::from("res")
}

fn default_legacy_mask() -> String {
    "old_*".to_string()
}

fn default_new_mask() -> String {
    "new_*".to_string()
}

fn default_rename_pattern() -> String {
    "^.{3}_(.+)".to_string()
}

// =============================================================================
// RECORDS
// =============================================================================

/// Record layout shared by both systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Expected field count of a well-formed record.
    pub number_of_fields: usize,
    /// Field names for reports. Defaults to `field_<n>`.
    #[serde(default)]
    pub field_names: Vec<String>,
    /// Field indices never compared.
    #[serde(default)]
    pub excluded_fields: Vec<usize>,
    #[serde(default)]
    pub header_lines: usize,
    #[serde(default)]
    pub trailer_lines: usize,
    #[serde(default)]
    pub layout: RecordLayout,
    /// Encoding label of legacy files, e.g. `utf-8`, `utf-16`, `cp1251`.
    #[serde(default = "default_encoding")]
    pub legacy_encoding: String,
    /// Encoding label of new-system files.
    #[serde(default = "default_encoding")]
    pub new_encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl RecordConfig {
    /// Decoder for one side's files. Labels are checked by
    /// [`ReconConfig::validate`]; an unknown one reads as UTF-8.
    pub fn encoding(&self, side: Side) -> &'static Encoding {
        let label = match side {
            Side::Legacy => &self.legacy_encoding,
            Side::New => &self.new_encoding,
        };
        Encoding::for_label(label.trim().as_bytes()).unwrap_or(UTF_8)
    }
}

// =============================================================================
// KEYS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// Discover a unique field combination from a legacy sample.
    #[default]
    Auto,
    /// Use the configured `fields`.
    Manual,
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Auto => write!(f, "auto"),
            KeyMode::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    #[serde(default)]
    pub mode: KeyMode,
    /// Key field indices for manual mode.
    #[serde(default)]
    pub fields: Vec<usize>,
    /// Indices auto discovery must never pick.
    #[serde(default)]
    pub excluded: Vec<usize>,
    /// Maximum number of legacy records sampled for discovery.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Rediscover keys on every run instead of reusing `keys_file`.
    #[serde(default = "default_true")]
    pub search_each_run: bool,
    /// Where discovered keys are persisted.
    #[serde(default = "default_keys_file")]
    pub keys_file: PathBuf,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            mode: KeyMode::Auto,
            fields: Vec::new(),
            excluded: Vec::new(),
            sample_size: default_sample_size(),
            search_each_run: true,
            keys_file: default_keys_file(),
        }
    }
}

fn default_sample_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_keys_file() -> PathBuf {
    PathBuf::from("auto_generated_keys.toml")
}

// =============================================================================
// REPORT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Buffered report lines that trigger a write to disk.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Diff patterns listed per field in the pattern summary.
    #[serde(default = "default_top_patterns")]
    pub top_patterns: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            top_patterns: default_top_patterns(),
        }
    }
}

fn default_flush_threshold() -> usize {
    5000
}

fn default_top_patterns() -> usize {
    10
}

// =============================================================================
// PARSE + VALIDATE
// =============================================================================

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: ReconConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| FidelityError::io(path, e))?;
        Self::from_toml(&input)
    }

    /// Render the effective configuration, as written next to the reports.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let records = &self.records;
        let n = records.number_of_fields;

        if n == 0 {
            return Err(FidelityError::Config(
                "records.number_of_fields = 0, expected > 0".into(),
            ));
        }

        if self.keys.mode == KeyMode::Manual && self.keys.fields.is_empty() {
            return Err(FidelityError::Config(
                "keys.fields must be provided when keys.mode = \"manual\"".into(),
            ));
        }

        check_indices("keys.fields", &self.keys.fields, n)?;
        check_indices("keys.excluded", &self.keys.excluded, n)?;
        check_indices("records.excluded_fields", &records.excluded_fields, n)?;

        match &records.layout {
            RecordLayout::Delimited { delimiter } => {
                if delimiter.is_empty() {
                    return Err(FidelityError::Config(
                        "records.layout.delimiter must not be empty".into(),
                    ));
                }
            }
            RecordLayout::Fixed { widths, tail } => {
                let fields = widths.len() + usize::from(*tail);
                if fields != n {
                    return Err(FidelityError::Config(format!(
                        "records.layout.widths describe {fields} field(s) (tail = {tail}), \
                         number_of_fields is {n}"
                    )));
                }
                if widths.contains(&0) {
                    return Err(FidelityError::Config(
                        "records.layout.widths must all be > 0".into(),
                    ));
                }
            }
        }

        if !records.field_names.is_empty() {
            if records.field_names.len() != n {
                return Err(FidelityError::Config(format!(
                    "records.field_names has {} name(s), number_of_fields is {n}",
                    records.field_names.len()
                )));
            }
            if records.field_names.iter().any(|name| name.trim().is_empty()) {
                return Err(FidelityError::Config(
                    "some of records.field_names are empty".into(),
                ));
            }
            // Field names become report file names inside the run directory
            if let Some(bad) = records
                .field_names
                .iter()
                .find(|name| name.contains(['/', '\\']) || matches!(name.trim(), "." | ".."))
            {
                return Err(FidelityError::Config(format!(
                    "records.field_names entry '{bad}' is not usable as a file name"
                )));
            }
        }

        for (setting, label) in [
            ("records.legacy_encoding", &records.legacy_encoding),
            ("records.new_encoding", &records.new_encoding),
        ] {
            if Encoding::for_label(label.trim().as_bytes()).is_none() {
                return Err(FidelityError::Config(format!(
                    "{setting} = '{label}' is not a known encoding"
                )));
            }
        }

        let pattern = Regex::new(&self.storage.rename_pattern)?;
        // captures_len counts the implicit whole-match group
        if pattern.captures_len() != 2 {
            return Err(FidelityError::Config(format!(
                "storage.rename_pattern '{}' must have exactly one capture group",
                self.storage.rename_pattern
            )));
        }

        if self.report.flush_threshold == 0 {
            return Err(FidelityError::Config(
                "report.flush_threshold must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Name of a field, for report file names and summaries.
    pub fn field_name(&self, index: usize) -> String {
        self.records
            .field_names
            .get(index)
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| format!("field_{index}"))
    }

    /// Configured key fields, or `None` in auto mode.
    pub fn manual_keys(&self) -> Option<&[usize]> {
        match self.keys.mode {
            KeyMode::Manual => Some(&self.keys.fields),
            KeyMode::Auto => None,
        }
    }
}

/// In range and free of duplicates.
fn check_indices(setting: &str, indices: &[usize], number_of_fields: usize) -> Result<()> {
    if let Some(bad) = indices.iter().find(|&&i| i >= number_of_fields) {
        return Err(FidelityError::Config(format!(
            "{setting}: index {bad} is out of range for {number_of_fields} field(s)"
        )));
    }
    let unique: BTreeSet<_> = indices.iter().collect();
    if unique.len() != indices.len() {
        return Err(FidelityError::Config(format!(
            "{setting} has duplicate indices: {indices:?}"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "Billing"

[storage]
legacy = "oldsys_out"
new = "newsys_out"

[records]
number_of_fields = 3
field_names = ["id", "name", "amount"]
layout = { kind = "delimited", delimiter = ";" }
"#;

    #[test]
    fn parse_valid_with_defaults() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Billing");
        assert_eq!(config.legacy_name, "OldSys");
        assert_eq!(config.new_name, "NewSys");
        assert_eq!(config.storage.legacy_mask, "old_*");
        assert_eq!(config.storage.rename_pattern, "^.{3}_(.+)");
        assert_eq!(config.keys.mode, KeyMode::Auto);
        assert_eq!(config.keys.sample_size, 1000);
        assert!(config.keys.search_each_run);
        assert_eq!(config.report.flush_threshold, 5000);
        assert_eq!(config.report.top_patterns, 10);
        assert_eq!(
            config.records.layout,
            RecordLayout::Delimited {
                delimiter: ";".into()
            }
        );
        assert!(config.manual_keys().is_none());
    }

    #[test]
    fn field_names_fall_back_to_index() {
        let input = VALID.replace("field_names = [\"id\", \"name\", \"amount\"]\n", "");
        let config = ReconConfig::from_toml(&input).unwrap();
        assert_eq!(config.field_name(2), "field_2");

        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.field_name(1), "name");
    }

    #[test]
    fn parse_manual_fixed_layout() {
        let input = r#"
[storage]
legacy = "a.txt"
new = "b.txt"

[records]
number_of_fields = 3
layout = { kind = "fixed", widths = [3, 4], tail = true }

[keys]
mode = "manual"
fields = [0, 1]
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(config.manual_keys(), Some(&[0, 1][..]));
        assert_eq!(
            config.records.layout,
            RecordLayout::Fixed {
                widths: vec![3, 4],
                tail: true
            }
        );
    }

    #[test]
    fn reject_invalid_key_mode() {
        let input = format!("{VALID}\n[keys]\nmode = \"automatic\"\n");
        assert!(ReconConfig::from_toml(&input).is_err());
    }

    #[test]
    fn reject_zero_fields() {
        let input = VALID
            .replace("number_of_fields = 3", "number_of_fields = 0")
            .replace("field_names = [\"id\", \"name\", \"amount\"]\n", "");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("number_of_fields = 0"));
    }

    #[test]
    fn reject_manual_mode_without_fields() {
        let input = format!("{VALID}\n[keys]\nmode = \"manual\"\n");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("keys.fields"));
    }

    #[test]
    fn reject_out_of_range_and_duplicate_indices() {
        let input = format!("{VALID}\n[keys]\nmode = \"manual\"\nfields = [0, 3]\n");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let input = VALID.replace(
            "number_of_fields = 3",
            "number_of_fields = 3\nexcluded_fields = [1, 1]",
        );
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn reject_width_count_mismatch() {
        let input = VALID.replace(
            "layout = { kind = \"delimited\", delimiter = \";\" }",
            "layout = { kind = \"fixed\", widths = [3, 4] }",
        );
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("widths"));
    }

    #[test]
    fn reject_field_name_count_mismatch() {
        let input = VALID.replace("[\"id\", \"name\", \"amount\"]", "[\"id\", \"name\"]");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("field_names"));
    }

    #[test]
    fn reject_rename_pattern_without_single_group() {
        let input = VALID.replace(
            "new = \"newsys_out\"",
            "new = \"newsys_out\"\nrename_pattern = \"^(.{3})_(.+)\"",
        );
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("exactly one capture group"));
    }

    #[test]
    fn encodings_default_to_utf8_and_accept_code_pages() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.records.encoding(Side::Legacy), encoding_rs::UTF_8);

        let input = VALID.replace(
            "number_of_fields = 3",
            "number_of_fields = 3\nlegacy_encoding = \"cp1251\"\nnew_encoding = \"utf-16\"",
        );
        let config = ReconConfig::from_toml(&input).unwrap();
        assert_eq!(config.records.encoding(Side::Legacy), encoding_rs::WINDOWS_1251);
        assert_eq!(config.records.encoding(Side::New), encoding_rs::UTF_16LE);
    }

    #[test]
    fn reject_unknown_encoding() {
        let input = VALID.replace(
            "number_of_fields = 3",
            "number_of_fields = 3\nnew_encoding = \"klingon\"",
        );
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("records.new_encoding"));
    }

    #[test]
    fn reject_field_name_with_path_separator() {
        for name in ["../escape", "a/b", "a\\\\b", ".."] {
            let input = VALID.replace("\"amount\"", &format!("{name:?}"));
            let err = ReconConfig::from_toml(&input).unwrap_err();
            assert!(err.to_string().contains("not usable as a file name"), "{name}");
        }
    }

    #[test]
    fn effective_config_round_trips_through_toml() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        let rendered = config.to_toml().unwrap();
        let again = ReconConfig::from_toml(&rendered).unwrap();
        assert_eq!(again.records.field_names, config.records.field_names);
        assert_eq!(again.storage.output, config.storage.output);
    }
}

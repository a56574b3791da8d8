//! Dataset loading: one file into a key → record map.

use std::borrow::Cow;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::{debug, warn};

use crate::config::ReconConfig;
use crate::error::{FidelityError, Result};
use crate::inference::KeyStrategy;
use crate::stats::Side;

use super::layout::RecordLayout;
use super::record::Record;

/// A fully materialized input file.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Records by key, in first-occurrence order.
    pub records: IndexMap<String, Record>,
    /// Leading header lines, verbatim without terminators.
    pub header: Vec<String>,
    /// Trailing trailer lines, verbatim without terminators.
    pub trailer: Vec<String>,
    /// Lines whose key was already taken by an earlier record.
    pub repeats: usize,
    /// Lines that could not be decoded or lacked a key field.
    pub rejected: usize,
    /// Stored records whose field count is wrong. They are classified
    /// defective once matched.
    pub malformed: usize,
    /// Physical line count of the file.
    pub lines: usize,
}

impl Dataset {
    /// Number of distinct keyed records.
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }
}

/// Reads files of one layout into [`Dataset`]s.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    layout: RecordLayout,
    number_of_fields: usize,
    header_lines: usize,
    trailer_lines: usize,
    legacy_encoding: &'static Encoding,
    new_encoding: &'static Encoding,
}

impl DatasetLoader {
    pub fn new(
        layout: RecordLayout,
        number_of_fields: usize,
        header_lines: usize,
        trailer_lines: usize,
    ) -> Self {
        Self {
            layout,
            number_of_fields,
            header_lines,
            trailer_lines,
            legacy_encoding: UTF_8,
            new_encoding: UTF_8,
        }
    }

    pub fn from_config(config: &ReconConfig) -> Self {
        let records = &config.records;
        Self::new(
            records.layout.clone(),
            records.number_of_fields,
            records.header_lines,
            records.trailer_lines,
        )
        .with_encodings(records.encoding(Side::Legacy), records.encoding(Side::New))
    }

    pub fn with_encodings(mut self, legacy: &'static Encoding, new: &'static Encoding) -> Self {
        self.legacy_encoding = legacy;
        self.new_encoding = new;
        self
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn encoding(&self, side: Side) -> &'static Encoding {
        match side {
            Side::Legacy => self.legacy_encoding,
            Side::New => self.new_encoding,
        }
    }

    /// Load one side's file, decoded with that side's encoding.
    pub fn load(&self, path: impl AsRef<Path>, keys: &KeyStrategy, side: Side) -> Result<Dataset> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| FidelityError::io(path, e))?;
        let content = self.decode(&bytes, side, path);

        let dataset = self.load_str(&content, keys, &path.display().to_string());
        debug!(
            file = %path.display(),
            %side,
            lines = dataset.lines,
            records = dataset.total(),
            repeats = dataset.repeats,
            rejected = dataset.rejected,
            malformed = dataset.malformed,
            "loaded dataset"
        );
        Ok(dataset)
    }

    /// A byte order mark overrides the configured encoding. Unmappable
    /// bytes become U+FFFD and are logged.
    fn decode<'b>(&self, bytes: &'b [u8], side: Side, path: &Path) -> Cow<'b, str> {
        let (content, used, had_errors) = self.encoding(side).decode(bytes);
        if had_errors {
            warn!(
                file = %path.display(),
                encoding = used.name(),
                "bytes not valid in the configured encoding were replaced"
            );
        }
        content
    }

    /// Load already-read file content. `source` only labels diagnostics.
    pub fn load_str(&self, content: &str, keys: &KeyStrategy, source: &str) -> Dataset {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let total_lines = lines.len();

        // Trailer lines are counted back from the end, one index per line
        let trailer_start = total_lines.saturating_sub(self.trailer_lines);

        let mut dataset = Dataset {
            lines: total_lines,
            ..Dataset::default()
        };

        for (n, raw) in lines.into_iter().enumerate() {
            if n < self.header_lines {
                dataset.header.push(trim_terminator(raw).to_string());
                continue;
            }
            if self.trailer_lines > 0 && n >= trailer_start {
                dataset.trailer.push(trim_terminator(raw).to_string());
                continue;
            }

            let fields = match self.layout.decode(raw) {
                Ok(fields) => fields,
                Err(defect) => {
                    warn!(file = source, line = n, %defect, "undecodable line");
                    dataset.rejected += 1;
                    continue;
                }
            };
            let record = Record::new(n, fields);

            let Some(key) = keys.key_for(&record) else {
                warn!(
                    file = source,
                    line = n,
                    fields = record.len(),
                    "record lacks a key field"
                );
                dataset.rejected += 1;
                continue;
            };

            match dataset.records.entry(key) {
                Entry::Vacant(slot) => {
                    if !record.is_well_formed(self.number_of_fields) {
                        warn!(
                            file = source,
                            line = n,
                            fields = record.len(),
                            expected = self.number_of_fields,
                            "defective record"
                        );
                        dataset.malformed += 1;
                    }
                    slot.insert(record);
                }
                Entry::Occupied(_) => dataset.repeats += 1,
            }
        }

        dataset
    }

    /// Data lines a file of `side` is expected to hold: physical lines
    /// minus header and trailer. Used for progress totals before loading.
    pub fn expected_records(&self, path: impl AsRef<Path>, side: Side) -> Result<usize> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| FidelityError::io(path, e))?;
        let (content, _, _) = self.encoding(side).decode(&bytes);
        Ok(count_lines(&content).saturating_sub(self.header_lines + self.trailer_lines))
    }
}

/// Physical line count; a final line without terminator still counts.
pub fn count_lines(content: &str) -> usize {
    content.split_inclusive('\n').count()
}

fn trim_terminator(raw: &str) -> &str {
    raw.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn loader(header: usize, trailer: usize) -> DatasetLoader {
        DatasetLoader::new(RecordLayout::default(), 3, header, trailer)
    }

    fn key0() -> KeyStrategy {
        KeyStrategy::fields(vec![0])
    }

    #[test]
    fn test_first_occurrence_wins_and_repeats_counted() {
        let content = "k1,a,b\nk2,c,d\nk1,x,y\nk1,z,z\n";
        let ds = loader(0, 0).load_str(content, &key0(), "t");

        assert_eq!(ds.total(), 2);
        assert_eq!(ds.repeats, 2);
        assert_eq!(ds.get("k1").unwrap().fields, vec!["k1", "a", "b"]);
        assert_eq!(ds.records.keys().collect::<Vec<_>>(), vec!["k1", "k2"]);
    }

    #[test]
    fn test_header_and_trailer_separated() {
        let content = "HDR1\nHDR2\nk1,a,b\nk2,c,d\nTRL1\nTRL2\n";
        let ds = loader(2, 2).load_str(content, &key0(), "t");

        assert_eq!(ds.header, vec!["HDR1", "HDR2"]);
        assert_eq!(ds.trailer, vec!["TRL1", "TRL2"]);
        assert_eq!(ds.total(), 2);
        assert_eq!(ds.lines, 6);
    }

    #[test]
    fn test_trailer_without_final_newline() {
        let content = "k1,a,b\nk2,c,d\nTRAILER";
        let ds = loader(0, 1).load_str(content, &key0(), "t");
        assert_eq!(ds.trailer, vec!["TRAILER"]);
        assert_eq!(ds.total(), 2);
    }

    #[test]
    fn test_header_takes_precedence_over_trailer() {
        let content = "only\n";
        let ds = loader(1, 1).load_str(content, &key0(), "t");
        assert_eq!(ds.header, vec!["only"]);
        assert!(ds.trailer.is_empty());
    }

    #[test]
    fn test_defective_record_kept_when_keyable() {
        let content = "k1,a\nk2,c,d\n";
        let ds = loader(0, 0).load_str(content, &key0(), "t");
        assert_eq!(ds.total(), 2);
        assert_eq!(ds.malformed, 1);
        assert!(!ds.get("k1").unwrap().is_well_formed(3));
    }

    #[test]
    fn test_short_repeat_is_not_defective() {
        let content = "k1,a,b\nk1,a\n";
        let ds = loader(0, 0).load_str(content, &key0(), "t");
        assert_eq!(ds.repeats, 1);
        assert_eq!(ds.malformed, 0);
        assert!(ds.get("k1").unwrap().is_well_formed(3));
    }

    #[test]
    fn test_unkeyable_line_rejected() {
        let content = "k1,a,b\nshort\n";
        let keys = KeyStrategy::fields(vec![0, 2]);
        let ds = loader(0, 0).load_str(content, &keys, "t");
        assert_eq!(ds.total(), 1);
        assert_eq!(ds.rejected, 1);
    }

    #[test]
    fn test_undecodable_fixed_width_line_rejected() {
        let loader = DatasetLoader::new(
            RecordLayout::Fixed {
                widths: vec![3, 4],
                tail: false,
            },
            2,
            0,
            0,
        );
        let ds = loader.load_str("abcdefg\nabcdef\n", &key0(), "t");
        assert_eq!(ds.total(), 1);
        assert_eq!(ds.rejected, 1);
        assert_eq!(ds.get("abc").unwrap().fields, vec!["abc", "defg"]);
    }

    #[test]
    fn test_ordinal_keys_use_line_number() {
        let content = "H\nsame,a,b\nsame,a,b\n";
        let ds = loader(1, 0).load_str(content, &KeyStrategy::Ordinal, "t");
        assert_eq!(ds.total(), 2);
        assert_eq!(ds.records.keys().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_count_lines_and_expected_records() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"H\nk1,a,b\nk2,c,d\nT").unwrap();

        assert_eq!(count_lines("H\nk1,a,b\nk2,c,d\nT"), 4);
        assert_eq!(count_lines(""), 0);
        assert_eq!(
            loader(1, 1).expected_records(file.path(), Side::Legacy).unwrap(),
            2
        );
    }

    #[test]
    fn test_cp1251_values_stay_distinct() {
        let (ivan, _, _) = encoding_rs::WINDOWS_1251.encode("K1,Иван,1\nK2,Петр,2\n");
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&ivan).unwrap();

        let loader = loader(0, 0).with_encodings(encoding_rs::WINDOWS_1251, UTF_8);
        let ds = loader.load(file.path(), &key0(), Side::Legacy).unwrap();
        assert_eq!(ds.get("K1").unwrap().fields, vec!["K1", "Иван", "1"]);
        assert_eq!(ds.get("K2").unwrap().fields, vec!["K2", "Петр", "2"]);

        // The same bytes read as UTF-8 lose the text
        let ds = loader.load(file.path(), &key0(), Side::New).unwrap();
        assert_ne!(ds.get("K1").unwrap().fields[1], "Иван");
    }

    #[test]
    fn test_utf16_with_bom_decoded() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "K1,Zoë,7\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let loader = loader(0, 0).with_encodings(encoding_rs::UTF_16LE, UTF_8);
        let ds = loader.load(file.path(), &key0(), Side::Legacy).unwrap();
        assert_eq!(ds.get("K1").unwrap().fields, vec!["K1", "Zoë", "7"]);
        assert_eq!(loader.expected_records(file.path(), Side::Legacy).unwrap(), 1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = loader(0, 0)
            .load("/nonexistent/fidelity/input.txt", &key0(), Side::Legacy)
            .unwrap_err();
        assert!(matches!(err, FidelityError::Io { .. }));
    }
}

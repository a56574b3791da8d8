//! Decoded records.

use std::fmt;

/// One decoded line. Well-formed only when it has exactly the configured
/// number of fields; otherwise it is kept but classified defective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 0-based line number in the source file.
    pub line: usize,
    pub fields: Vec<String>,
}

impl Record {
    pub fn new(line: usize, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn is_well_formed(&self, number_of_fields: usize) -> bool {
        self.fields.len() == number_of_fields
    }
}

impl AsRef<[String]> for Record {
    fn as_ref(&self) -> &[String] {
        &self.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.fields)
    }
}

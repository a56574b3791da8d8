//! Record layouts and line decoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a raw line splits into fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordLayout {
    /// Fields separated by a delimiter string. No quoting.
    Delimited { delimiter: String },
    /// Fields of fixed character widths, optionally followed by a
    /// free-length remainder field.
    Fixed {
        widths: Vec<usize>,
        #[serde(default)]
        tail: bool,
    },
}

impl Default for RecordLayout {
    fn default() -> Self {
        RecordLayout::Delimited {
            delimiter: ",".to_string(),
        }
    }
}

/// A line that does not fit the layout. Never becomes a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeDefect {
    #[error("line is {actual} character(s) wide, layout expects exactly {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("line is {actual} character(s) wide, layout expects more than {expected} (remainder field)")]
    MissingTail { expected: usize, actual: usize },
}

impl RecordLayout {
    /// Split one raw line, with or without its terminator, into fields.
    pub fn decode(&self, raw: &str) -> Result<Vec<String>, DecodeDefect> {
        let line = strip_terminator(raw);

        match self {
            RecordLayout::Delimited { delimiter } => {
                let delimiter = resolve_delimiter(delimiter);
                Ok(line.split(delimiter).map(str::to_string).collect())
            }
            RecordLayout::Fixed { widths, tail } => decode_fixed(line, widths, *tail),
        }
    }

    /// Human-readable description for logs and the progress header.
    pub fn describe(&self) -> String {
        match self {
            RecordLayout::Delimited { delimiter } => {
                format!("delimited ({:?})", resolve_delimiter(delimiter))
            }
            RecordLayout::Fixed { widths, tail } => {
                let total: usize = widths.iter().sum();
                if *tail {
                    format!("fixed {widths:?} + remainder ({total}+ chars)")
                } else {
                    format!("fixed {widths:?} ({total} chars)")
                }
            }
        }
    }
}

/// Config files may spell a tab as the two characters `\t`.
fn resolve_delimiter(delimiter: &str) -> &str {
    if delimiter == "\\t" { "\t" } else { delimiter }
}

fn strip_terminator(raw: &str) -> &str {
    match raw.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => raw,
    }
}

fn decode_fixed(line: &str, widths: &[usize], tail: bool) -> Result<Vec<String>, DecodeDefect> {
    let expected: usize = widths.iter().sum();
    let actual = line.chars().count();

    if tail && actual <= expected {
        return Err(DecodeDefect::MissingTail { expected, actual });
    }
    if !tail && actual != expected {
        return Err(DecodeDefect::WidthMismatch { expected, actual });
    }

    let mut fields = Vec::with_capacity(widths.len() + usize::from(tail));
    let mut rest = line;
    for &width in widths {
        // Widths count characters, not bytes
        let split = rest
            .char_indices()
            .nth(width)
            .map(|(offset, _)| offset)
            .unwrap_or(rest.len());
        let (field, remainder) = rest.split_at(split);
        fields.push(field.trim().to_string());
        rest = remainder;
    }
    if tail {
        fields.push(rest.trim().to_string());
    }

    Ok(fields)
}

//! Fuzz target for record decoding.
//!
//! Decoding must never panic, whatever the line or the layout, and a
//! successful fixed-width decode always yields one field per width.

#![no_main]

use arbitrary::Arbitrary;
use fidelity::RecordLayout;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    line: String,
    delimiter: String,
    widths: Vec<u8>,
    tail: bool,
}

fuzz_target!(|input: Input| {
    if input.line.len() > 10_000 || input.widths.len() > 64 {
        return;
    }

    if !input.delimiter.is_empty() {
        let layout = RecordLayout::Delimited {
            delimiter: input.delimiter.clone(),
        };
        let _ = layout.decode(&input.line);
    }

    let widths: Vec<usize> = input.widths.iter().map(|&w| usize::from(w).max(1)).collect();
    let expected = widths.len() + usize::from(input.tail);
    let layout = RecordLayout::Fixed {
        widths,
        tail: input.tail,
    };
    if let Ok(fields) = layout.decode(&input.line) {
        assert_eq!(fields.len(), expected);
    }
});

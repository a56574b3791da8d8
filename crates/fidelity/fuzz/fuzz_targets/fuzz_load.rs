//! Fuzz target for dataset loading.
//!
//! Arbitrary file content (including invalid UTF-8) must load without
//! panicking, and every line is accounted for exactly once.

#![no_main]

use fidelity::{DatasetLoader, KeyStrategy, RecordLayout};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 100_000 {
        return;
    }

    let content = String::from_utf8_lossy(data);
    let loader = DatasetLoader::new(RecordLayout::default(), 3, 1, 1);
    let dataset = loader.load_str(&content, &KeyStrategy::fields(vec![0, 2]), "fuzz");

    assert_eq!(
        dataset.header.len()
            + dataset.trailer.len()
            + dataset.total()
            + dataset.repeats
            + dataset.rejected,
        dataset.lines
    );
});

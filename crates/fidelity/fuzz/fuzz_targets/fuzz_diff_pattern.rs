//! Fuzz target for diff patterns.
//!
//! Patterns must be deterministic and identical inputs must render as dots
//! only.

#![no_main]

use fidelity::deep_diff;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (String, String)| {
    let (old, new) = data;
    // Alignment is quadratic in the worst case
    if old.len() > 2_000 || new.len() > 2_000 {
        return;
    }

    let pattern = deep_diff(&old, &new);
    assert_eq!(pattern, deep_diff(&old, &new));

    if old == new {
        assert!(pattern.chars().all(|c| c == '.'));
    }
});

//! Key inference: how records from the two systems are matched.

mod keys;

pub use keys::{
    compose_key, load_keys, sample_records, save_keys, KeyDiscoverer, KeyStrategy,
    MIN_SAMPLE_SIZE,
};

//! CLI command implementations.

pub mod keys;
pub mod pairs;
pub mod run;

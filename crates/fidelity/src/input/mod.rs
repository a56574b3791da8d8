//! Input decoding, loading and file pairing.

mod layout;
mod loader;
mod pairing;
mod record;

pub use layout::{DecodeDefect, RecordLayout};
pub use loader::{count_lines, Dataset, DatasetLoader};
pub use pairing::{list_files, FilePair, FilePairer, Pairing};
pub use record::Record;

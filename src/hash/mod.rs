// Hashing and comparison
// Content digests and the file-pair comparator used by the sync engine

pub mod compare;
pub mod hash;

pub use compare::{Comparator, Comparison, CONFLICT_WINDOW};
pub use hash::{hash_bytes, hash_file, hash_reader, HASH_HEX_LEN};

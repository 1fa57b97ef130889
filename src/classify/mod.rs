pub mod classify_reads;
pub mod classify_sequence;

pub use classify_reads::classify_reads_parallel;
pub use classify_sequence::{classify_sequence, ClassifyConfig, KmerLookup};

// src/lib.rs

//! Taxonomic read classification core with mergeable unique-k-mer counting.
//!
//! Reads are classified by mapping their k-mers to taxa and resolving the
//! per-read hit multiset against the taxonomy tree; per-taxon accumulators
//! track read counts, k-mer counts, and an approximate distinct-k-mer count
//! that merges losslessly across threads, files, and runs.
//!
//! The k-mer -> taxon index itself, sequence file parsing, and report
//! rendering are external collaborators; see [`classify::KmerLookup`] for
//! the seam the index plugs into.

pub mod classify;
pub mod counts;
pub mod errors;
pub mod hll;
pub mod kmer;
pub mod taxonomy;
pub mod types;

pub use classify::{classify_reads_parallel, classify_sequence, ClassifyConfig, KmerLookup};
pub use counts::{
    merge_count_files, merge_taxon_counts, read_taxon_counts, read_taxon_counts_file,
    write_taxon_counts, CounterConfig, TaxonCount, TaxonCountMap,
};
pub use errors::{Error, Result};
pub use hll::HyperLogLog;
pub use kmer::KmerScanner;
pub use taxonomy::{build_parent_map, build_parent_map_file, lca, resolve_tree, ParentMap};
pub use types::{
    HitCounts, PackedKmer, ReadClassification, TaxonId, TAXID_ROOT, TAXID_UNCLASSIFIED,
};

//src/types.rs

use ahash::AHashMap;

/// A taxonomy node identifier.
///
/// `0` is the "no hit / unclassified" sentinel, `1` is the reserved root.
pub type TaxonId = u32;

/// Sentinel taxon meaning "no hit / unclassified".
pub const TAXID_UNCLASSIFIED: TaxonId = 0;

/// The reserved root of the taxonomy.
pub const TAXID_ROOT: TaxonId = 1;

/// Per-read raw hit counts: taxon -> number of k-mers that mapped to that
/// exact taxon (not yet propagated to ancestors). Created and destroyed per
/// read.
pub type HitCounts = AHashMap<TaxonId, u32>;

/// One 2-bit packed k-mer window plus whether any base in the window was
/// outside ACGT. Ambiguous windows still advance the scan but are excluded
/// from lookups and unique-k-mer accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedKmer {
    pub value: u64,
    pub ambiguous: bool,
}

/// The consensus call for one read: the resolved taxon plus the raw per-taxon
/// evidence that produced it. Downstream reporting (out of scope here) turns
/// this into human-readable output.
#[derive(Debug, Clone)]
pub struct ReadClassification {
    pub taxon: TaxonId,
    pub hit_counts: HitCounts,
}

impl ReadClassification {
    pub fn is_classified(&self) -> bool {
        self.taxon != TAXID_UNCLASSIFIED
    }
}

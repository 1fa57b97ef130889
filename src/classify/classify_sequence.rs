use ahash::AHashMap;

use crate::counts::{CounterConfig, TaxonCount, TaxonCountMap};
use crate::errors::Result;
use crate::kmer::KmerScanner;
use crate::taxonomy::{resolve_tree, ParentMap};
use crate::types::{HitCounts, ReadClassification, TaxonId, TAXID_UNCLASSIFIED};

/// The external k-mer -> taxon index. The on-disk database format is out of
/// scope here; anything that answers point queries can drive classification.
pub trait KmerLookup: Sync {
    /// Taxon assigned to a packed k-mer, or 0 on a miss. Implementations that
    /// index canonical k-mers should canonicalize here.
    fn taxon_for(&self, kmer: u64) -> TaxonId;
}

impl KmerLookup for AHashMap<u64, TaxonId> {
    fn taxon_for(&self, kmer: u64) -> TaxonId {
        self.get(&kmer).copied().unwrap_or(TAXID_UNCLASSIFIED)
    }
}

/// Immutable per-run classification parameters. Fixed before scanning begins;
/// every shard of one run must use the same values.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyConfig {
    /// K-mer length, in 1..=[`crate::kmer::MAX_K`].
    pub k: usize,
    pub counter: CounterConfig,
}

impl ClassifyConfig {
    pub fn new(k: usize) -> Self {
        ClassifyConfig {
            k,
            counter: CounterConfig::default(),
        }
    }
}

/// Classify one read.
///
/// Scans the read's k-mers, looks each unambiguous one up, tallies per-taxon
/// hits, resolves them to a consensus taxon, and records the evidence into
/// `taxon_counts` (k-mers under the taxon that matched them, the read under
/// the consensus). Ambiguous windows advance the scan but contribute no
/// evidence. Reads shorter than k come back unclassified, never as an error;
/// a lookup result missing from the parent map does error, since it signals
/// an inconsistent index/taxonomy pairing.
pub fn classify_sequence<L: KmerLookup + ?Sized>(
    seq: &[u8],
    lookup: &L,
    parent_map: &ParentMap,
    config: ClassifyConfig,
    taxon_counts: &mut TaxonCountMap,
) -> Result<ReadClassification> {
    let mut hit_counts = HitCounts::new();

    if seq.len() >= config.k {
        let mut scanner = KmerScanner::new(seq, config.k);
        while let Some(kmer) = scanner.next_kmer() {
            if scanner.ambig_kmer() {
                continue;
            }
            let taxon = lookup.taxon_for(kmer);
            if taxon == TAXID_UNCLASSIFIED {
                continue;
            }
            *hit_counts.entry(taxon).or_insert(0) += 1;
            taxon_counts
                .entry(taxon)
                .or_insert_with(|| TaxonCount::new(config.counter))
                .add_kmer(kmer);
        }
    }

    let call = resolve_tree(&hit_counts, parent_map)?;
    if call != TAXID_UNCLASSIFIED {
        taxon_counts
            .entry(call)
            .or_insert_with(|| TaxonCount::new(config.counter))
            .increment_read_count();
    }

    Ok(ReadClassification {
        taxon: call,
        hit_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn toy_map() -> ParentMap {
        let mut m = ParentMap::new();
        m.insert(1, 1);
        m.insert(2, 1);
        m.insert(3, 2);
        m.insert(4, 2);
        m
    }

    /// Index every k-mer of each reference under its taxon.
    fn lookup_for(refs: &[(&[u8], TaxonId)], k: usize) -> AHashMap<u64, TaxonId> {
        let mut index = AHashMap::new();
        for &(seq, taxon) in refs {
            for pk in KmerScanner::new(seq, k) {
                if !pk.ambiguous {
                    index.insert(pk.value, taxon);
                }
            }
        }
        index
    }

    #[test]
    fn read_matching_one_reference_is_called_to_it() {
        let map = toy_map();
        let lookup = lookup_for(&[(b"ACGTACGTAC", 3)], 4);
        let mut counts = TaxonCountMap::new();

        let call =
            classify_sequence(b"ACGTACGTAC", &lookup, &map, ClassifyConfig::new(4), &mut counts)
                .unwrap();
        assert_eq!(call.taxon, 3);
        assert!(call.is_classified());

        let tc = &counts[&3];
        assert_eq!(tc.read_count, 1);
        assert_eq!(tc.kmer_count, 7); // 10 - 4 + 1 windows, all hits
        assert_eq!(tc.unique_kmer_count(), 4); // ACGT period-4 repeat
    }

    #[test]
    fn read_with_no_hits_is_unclassified_and_records_nothing() {
        let map = toy_map();
        let lookup: AHashMap<u64, TaxonId> = AHashMap::new();
        let mut counts = TaxonCountMap::new();

        let call =
            classify_sequence(b"ACGTACGT", &lookup, &map, ClassifyConfig::new(4), &mut counts)
                .unwrap();
        assert_eq!(call.taxon, 0);
        assert!(call.hit_counts.is_empty());
        assert!(counts.is_empty());
    }

    #[test]
    fn read_shorter_than_k_is_unclassified() {
        let map = toy_map();
        let lookup = lookup_for(&[(b"ACGTACGT", 3)], 4);
        let mut counts = TaxonCountMap::new();

        let call = classify_sequence(b"ACG", &lookup, &map, ClassifyConfig::new(4), &mut counts)
            .unwrap();
        assert_eq!(call.taxon, 0);
        assert!(counts.is_empty());
    }

    #[test]
    fn ambiguous_windows_contribute_no_evidence() {
        let map = toy_map();
        let lookup = lookup_for(&[(b"ACGTACGTAC", 3)], 4);
        let mut counts = TaxonCountMap::new();

        // The N voids four windows; the flanks still hit.
        let call =
            classify_sequence(b"ACGTNACGTA", &lookup, &map, ClassifyConfig::new(4), &mut counts)
                .unwrap();
        assert_eq!(call.taxon, 3);
        assert_eq!(counts[&3].kmer_count, 3);
    }

    #[test]
    fn split_evidence_resolves_through_the_tree() {
        let map = toy_map();
        // Taxa 3 and 4 are siblings under 2; give 3 more matching windows.
        let lookup = lookup_for(&[(b"ACGTACGTAC", 3), (b"TTTTGGGG", 4)], 4);
        let mut counts = TaxonCountMap::new();

        let call = classify_sequence(
            b"ACGTACGTACTTTTG",
            &lookup,
            &map,
            ClassifyConfig::new(4),
            &mut counts,
        )
        .unwrap();
        assert_eq!(call.taxon, 3);
        assert_eq!(call.hit_counts[&3], 7);
        assert_eq!(call.hit_counts[&4], 2); // TTTT, TTTG
        assert_eq!(counts[&4].read_count, 0);
        assert_eq!(counts[&3].read_count, 1);
    }

    #[test]
    fn lookup_taxon_missing_from_taxonomy_is_an_error() {
        let map = toy_map();
        let lookup = lookup_for(&[(b"ACGTACGT", 99)], 4);
        let mut counts = TaxonCountMap::new();

        let err =
            classify_sequence(b"ACGTACGT", &lookup, &map, ClassifyConfig::new(4), &mut counts)
                .unwrap_err();
        assert!(matches!(err, Error::UnknownTaxon(99)));
    }
}

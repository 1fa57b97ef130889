use rayon::prelude::*;

use super::classify_sequence::{classify_sequence, ClassifyConfig, KmerLookup};
use crate::counts::{merge_taxon_counts, TaxonCountMap};
use crate::errors::Result;
use crate::taxonomy::ParentMap;
use crate::types::ReadClassification;

/// Parallel classification of many reads.
///
/// Reads are embarrassingly parallel: each worker classifies its share
/// against the shared read-only parent map and lookup, accumulating into a
/// thread-private `TaxonCountMap`. Private maps meet only at reduce points,
/// where accumulator merging is commutative and associative, so the combined
/// counts are identical to a serial run regardless of how rayon splits the
/// work. Classifications come back in input order.
pub fn classify_reads_parallel<L, S>(
    reads: &[S],
    lookup: &L,
    parent_map: &ParentMap,
    config: ClassifyConfig,
) -> Result<(Vec<ReadClassification>, TaxonCountMap)>
where
    L: KmerLookup + Sync,
    S: AsRef<[u8]> + Sync,
{
    reads
        .par_iter()
        .fold(
            || Ok((Vec::new(), TaxonCountMap::new())),
            |acc: Result<(Vec<ReadClassification>, TaxonCountMap)>, read| {
                let (mut calls, mut counts) = acc?;
                let call =
                    classify_sequence(read.as_ref(), lookup, parent_map, config, &mut counts)?;
                calls.push(call);
                Ok((calls, counts))
            },
        )
        .reduce(
            || Ok((Vec::new(), TaxonCountMap::new())),
            |left, right| {
                let (mut calls, mut counts) = left?;
                let (right_calls, right_counts) = right?;
                calls.extend(right_calls);
                merge_taxon_counts(&mut counts, right_counts)?;
                Ok((calls, counts))
            },
        )
}

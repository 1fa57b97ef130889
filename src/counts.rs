//src/counts.rs

use ahash::{AHashMap, AHashSet};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::hll::{HyperLogLog, DEFAULT_PRECISION};
use crate::types::TaxonId;

/// Selects the unique-k-mer counter used for a whole run. Precision is a
/// global run parameter: every accumulator merged together must share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterConfig {
    /// Probabilistic counter: bounded memory, ~1% error at the default
    /// precision, mergeable across shards.
    Sketch { precision: u8 },
    /// Exact fallback: precise but proportional to the number of distinct
    /// k-mers. Useful for small runs and for validating the sketch.
    Exact,
}

impl Default for CounterConfig {
    fn default() -> Self {
        CounterConfig::Sketch {
            precision: DEFAULT_PRECISION,
        }
    }
}

/// The two unique-k-mer counter variants behind a common capability surface:
/// insert, cardinality, merge, (de)serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueKmerCounts {
    Sketch(HyperLogLog),
    Exact(AHashSet<u64>),
}

impl UniqueKmerCounts {
    fn new(config: CounterConfig) -> Self {
        match config {
            CounterConfig::Sketch { precision } => {
                UniqueKmerCounts::Sketch(HyperLogLog::new(precision))
            }
            CounterConfig::Exact => UniqueKmerCounts::Exact(AHashSet::new()),
        }
    }

    fn insert(&mut self, kmer: u64) {
        match self {
            UniqueKmerCounts::Sketch(hll) => hll.insert(kmer),
            UniqueKmerCounts::Exact(set) => {
                set.insert(kmer);
            }
        }
    }

    fn cardinality(&self) -> u64 {
        match self {
            UniqueKmerCounts::Sketch(hll) => hll.cardinality(),
            UniqueKmerCounts::Exact(set) => set.len() as u64,
        }
    }

    // The exact-set variant reports as precision 0 in mismatch errors.
    fn precision_tag(&self) -> u8 {
        match self {
            UniqueKmerCounts::Sketch(hll) => hll.precision(),
            UniqueKmerCounts::Exact(_) => 0,
        }
    }

    fn check_mergeable(&self, other: &UniqueKmerCounts) -> Result<()> {
        match (self, other) {
            (UniqueKmerCounts::Sketch(a), UniqueKmerCounts::Sketch(b))
                if a.precision() == b.precision() =>
            {
                Ok(())
            }
            (UniqueKmerCounts::Exact(_), UniqueKmerCounts::Exact(_)) => Ok(()),
            (a, b) => Err(Error::IncompatiblePrecision {
                expected: a.precision_tag(),
                found: b.precision_tag(),
            }),
        }
    }

    fn merge(&mut self, other: &UniqueKmerCounts) -> Result<()> {
        match (self, other) {
            (UniqueKmerCounts::Sketch(a), UniqueKmerCounts::Sketch(b)) => a.merge(b),
            (UniqueKmerCounts::Exact(a), UniqueKmerCounts::Exact(b)) => {
                a.extend(b.iter().copied());
                Ok(())
            }
            (a, b) => Err(Error::IncompatiblePrecision {
                expected: a.precision_tag(),
                found: b.precision_tag(),
            }),
        }
    }

    fn set_observed(&mut self, n_observed: u64) {
        if let UniqueKmerCounts::Sketch(hll) = self {
            hll.set_observed(n_observed);
        }
    }

    fn serialize(&self) -> String {
        match self {
            UniqueKmerCounts::Sketch(hll) => hll.serialize(),
            UniqueKmerCounts::Exact(set) => {
                let mut kmers: Vec<u64> = set.iter().copied().collect();
                kmers.sort_unstable();
                let items: Vec<String> = kmers.iter().map(|k| k.to_string()).collect();
                format!("exact:{}", items.join(","))
            }
        }
    }

    fn deserialize(serialized: &str) -> Result<Self> {
        match serialized.split(':').next() {
            Some("hll") => Ok(UniqueKmerCounts::Sketch(HyperLogLog::deserialize(serialized)?)),
            Some("exact") => {
                let payload = serialized.strip_prefix("exact:").ok_or_else(|| {
                    Error::MalformedAccumulatorRecord {
                        line_no: 0,
                        reason: "missing exact payload".to_string(),
                    }
                })?;
                let mut set = AHashSet::new();
                for item in payload.split(',').filter(|s| !s.is_empty()) {
                    let kmer = item.parse().map_err(|_| Error::MalformedAccumulatorRecord {
                        line_no: 0,
                        reason: format!("bad exact k-mer entry {item:?}"),
                    })?;
                    set.insert(kmer);
                }
                Ok(UniqueKmerCounts::Exact(set))
            }
            _ => Err(Error::MalformedAccumulatorRecord {
                line_no: 0,
                reason: "unknown unique counter tag".to_string(),
            }),
        }
    }
}

/// Per-taxon summary: exact read and k-mer counters plus one unique-k-mer
/// counter. Created lazily the first time a taxon receives evidence; owned by
/// one worker until an explicit merge step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonCount {
    pub read_count: u64,
    pub kmer_count: u64,
    kmers: UniqueKmerCounts,
}

impl TaxonCount {
    pub fn new(config: CounterConfig) -> Self {
        TaxonCount {
            read_count: 0,
            kmer_count: 0,
            kmers: UniqueKmerCounts::new(config),
        }
    }

    pub fn increment_read_count(&mut self) {
        self.read_count += 1;
    }

    /// Counts the insert operation exactly and feeds the unique counter.
    /// `kmer_count` counts all inserts; the counter estimates distinct ones.
    pub fn add_kmer(&mut self, kmer: u64) {
        self.kmer_count += 1;
        self.kmers.insert(kmer);
    }

    pub fn unique_kmer_count(&self) -> u64 {
        self.kmers.cardinality()
    }

    /// Read and k-mer counts add exactly; the unique counters merge per their
    /// variant. The counter merge runs first, so a precision mismatch leaves
    /// `self` untouched.
    pub fn merge(&mut self, other: &TaxonCount) -> Result<()> {
        self.kmers.merge(&other.kmers)?;
        self.read_count += other.read_count;
        self.kmer_count += other.kmer_count;
        Ok(())
    }

    /// One line, tab-separated: `readCount\tkmerCount\tcounter`.
    pub fn serialize(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.read_count,
            self.kmer_count,
            self.kmers.serialize()
        )
    }

    /// Inverse of [`serialize`](Self::serialize). The counter's observed
    /// tally is restored from `kmer_count` rather than trusted from the
    /// serialized sketch, so estimate capping stays correct after reload.
    pub fn deserialize(serialized: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedAccumulatorRecord {
            line_no: 0,
            reason: reason.to_string(),
        };

        let mut fields = serialized.splitn(3, '\t');
        let read_count: u64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("bad read count"))?;
        let kmer_count: u64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("bad k-mer count"))?;
        let counter_field = fields.next().ok_or_else(|| malformed("missing counter field"))?;

        let mut kmers = UniqueKmerCounts::deserialize(counter_field)?;
        kmers.set_observed(kmer_count);
        Ok(TaxonCount {
            read_count,
            kmer_count,
            kmers,
        })
    }
}

/// taxon -> accumulator for one shard (one thread's share or one file).
pub type TaxonCountMap = AHashMap<TaxonId, TaxonCount>;

/// Merge `from` into `into`: union of key sets, accumulator merge on overlap.
/// Commutative and associative, so the combined result is identical no matter
/// how shards were split or in which order they arrive.
///
/// Compatibility is checked across the whole shard before anything is
/// folded in, so an `IncompatiblePrecision` failure leaves `into` untouched
/// and the caller can skip the shard or abort.
pub fn merge_taxon_counts(into: &mut TaxonCountMap, from: TaxonCountMap) -> Result<()> {
    for (taxid, counts) in &from {
        if let Some(existing) = into.get(taxid) {
            existing.kmers.check_mergeable(&counts.kmers)?;
        }
    }

    into.reserve(from.len());
    for (taxid, counts) in from {
        match into.entry(taxid) {
            std::collections::hash_map::Entry::Occupied(mut e) => e.get_mut().merge(&counts)?,
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(counts);
            }
        }
    }
    Ok(())
}

/// Reads per-taxon accumulator lines, `taxid\treadCount\tkmerCount\tcounter`.
/// Repeated taxids within one source are merged. Corrupt lines report their
/// line number and leave nothing half-applied for that line.
pub fn read_taxon_counts<R: BufRead>(reader: R) -> Result<TaxonCountMap> {
    let mut map = TaxonCountMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.is_empty() {
            continue;
        }

        let located = |reason: String| Error::MalformedAccumulatorRecord { line_no, reason };
        let (taxid_field, rest) = line
            .split_once('\t')
            .ok_or_else(|| located("missing tab after taxid".to_string()))?;
        let taxid: TaxonId = taxid_field
            .parse()
            .map_err(|_| located(format!("bad taxid {taxid_field:?}")))?;
        let counts = TaxonCount::deserialize(rest).map_err(|e| match e {
            Error::MalformedAccumulatorRecord { reason, .. } => located(reason),
            other => other,
        })?;

        match map.entry(taxid) {
            std::collections::hash_map::Entry::Occupied(mut e) => e.get_mut().merge(&counts)?,
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(counts);
            }
        }
    }
    Ok(map)
}

/// File-opening wrapper around [`read_taxon_counts`]; `.gz` inputs are
/// decompressed transparently.
pub fn read_taxon_counts_file<P: AsRef<Path>>(path: P) -> Result<TaxonCountMap> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let map = read_taxon_counts(reader)?;
    log::info!("Loaded {} taxon accumulators from {}", map.len(), path.display());
    Ok(map)
}

/// Writes the merge-format lines in ascending taxid order, so output is
/// deterministic regardless of map iteration order.
pub fn write_taxon_counts<W: Write>(writer: &mut W, map: &TaxonCountMap) -> Result<()> {
    let mut taxids: Vec<TaxonId> = map.keys().copied().collect();
    taxids.sort_unstable();
    for taxid in taxids {
        writeln!(writer, "{}\t{}", taxid, map[&taxid].serialize())?;
    }
    Ok(())
}

/// The shard-combination workflow: load every count file and fold the maps
/// together. Order of the input files does not affect the result.
pub fn merge_count_files<P: AsRef<Path>>(paths: &[P]) -> Result<TaxonCountMap> {
    let mut merged = TaxonCountMap::new();
    for path in paths {
        let shard = read_taxon_counts_file(path)?;
        merge_taxon_counts(&mut merged, shard)?;
    }
    log::info!(
        "Merged {} count file(s) into {} taxa",
        paths.len(),
        merged.len()
    );
    Ok(merged)
}

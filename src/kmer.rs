//src/kmer.rs

use crate::types::PackedKmer;

/// Largest supported k-mer length: 31 bases pack into the low 62 bits of a
/// `u64` at 2 bits per base.
pub const MAX_K: usize = 31;

/// A lazy, single-pass sliding-window scanner over one nucleotide sequence.
///
/// The k-mer length is fixed at construction and immutable afterward; one
/// scanner handles one sequence, but independent scanners over independent
/// sequences are fully parallel. Each call to [`next_kmer`](Self::next_kmer)
/// advances the window by exactly one base and returns the packed window, or
/// `None` once the end of the scan range is reached.
///
/// Ambiguity is tracked with a shifting k-bit flag register: any non-ACGT
/// base marks the k windows it participates in, queryable via
/// [`ambig_kmer`](Self::ambig_kmer) immediately after each extraction.
pub struct KmerScanner<'a> {
    seq: &'a [u8],
    k: usize,
    kmer_mask: u64,
    ambig_mask: u64,
    curr_pos: usize,
    pos2: usize,
    kmer: u64,
    ambig: u64,
    loaded_nt: usize,
}

impl<'a> KmerScanner<'a> {
    /// Scan the whole sequence. Panics if `k` is 0 or exceeds [`MAX_K`].
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        Self::with_range(seq, k, 0, seq.len())
    }

    /// Scan `seq[start..finish]` only. `finish` is clamped to the sequence
    /// length.
    pub fn with_range(seq: &'a [u8], k: usize, start: usize, finish: usize) -> Self {
        assert!(k >= 1 && k <= MAX_K, "k-mer length must be in 1..={MAX_K}");
        KmerScanner {
            seq,
            k,
            kmer_mask: (1u64 << (2 * k)) - 1,
            ambig_mask: (1u64 << k) - 1,
            curr_pos: start,
            pos2: finish.min(seq.len()),
            kmer: 0,
            ambig: 0,
            loaded_nt: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Advance the window one base and return the packed k-mer, or `None`
    /// once the scan range is exhausted. The most recently read base occupies
    /// the low 2 bits.
    pub fn next_kmer(&mut self) -> Option<u64> {
        while self.curr_pos < self.pos2 {
            if self.loaded_nt == self.k {
                self.loaded_nt -= 1;
            }
            self.loaded_nt += 1;
            self.kmer = (self.kmer << 2) & self.kmer_mask;
            self.ambig = (self.ambig << 1) & self.ambig_mask;
            match self.seq[self.curr_pos] {
                b'A' | b'a' => {}
                b'C' | b'c' => self.kmer |= 1,
                b'G' | b'g' => self.kmer |= 2,
                b'T' | b't' => self.kmer |= 3,
                _ => self.ambig |= 1,
            }
            self.curr_pos += 1;
            if self.loaded_nt == self.k {
                return Some(self.kmer);
            }
        }
        None
    }

    /// Does the most recently returned k-mer contain a non-ACGT base?
    pub fn ambig_kmer(&self) -> bool {
        self.ambig != 0
    }
}

impl Iterator for KmerScanner<'_> {
    type Item = PackedKmer;

    fn next(&mut self) -> Option<PackedKmer> {
        self.next_kmer().map(|value| PackedKmer {
            value,
            ambiguous: self.ambig_kmer(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(seq: &[u8], k: usize) -> Vec<PackedKmer> {
        KmerScanner::new(seq, k).collect()
    }

    #[test]
    fn packs_two_bits_per_base() {
        // AC = 0b0001, CG = 0b0110, GT = 0b1011
        let kmers = collect(b"ACGT", 2);
        assert_eq!(kmers.len(), 3);
        assert_eq!(kmers[0], PackedKmer { value: 0b0001, ambiguous: false });
        assert_eq!(kmers[1], PackedKmer { value: 0b0110, ambiguous: false });
        assert_eq!(kmers[2], PackedKmer { value: 0b1011, ambiguous: false });
    }

    #[test]
    fn lowercase_bases_are_accepted() {
        assert_eq!(collect(b"acgt", 2), collect(b"ACGT", 2));
    }

    #[test]
    fn ambiguous_base_flags_every_window_it_touches() {
        let kmers = collect(b"ACNGT", 2);
        assert_eq!(kmers.len(), 4);
        assert!(!kmers[0].ambiguous); // AC
        assert!(kmers[1].ambiguous); // CN
        assert!(kmers[2].ambiguous); // NG
        assert!(!kmers[3].ambiguous); // GT
        assert_eq!(kmers[3].value, 0b1011);
    }

    #[test]
    fn window_advances_by_one_even_through_ambiguity() {
        let count = collect(b"AANNNAAA", 3).len();
        assert_eq!(count, 6); // 8 - 3 + 1
    }

    #[test]
    fn sequence_shorter_than_k_yields_nothing() {
        let mut scanner = KmerScanner::new(b"AC", 3);
        assert_eq!(scanner.next_kmer(), None);
        // Exhaustion is stable, not an error.
        assert_eq!(scanner.next_kmer(), None);
    }

    #[test]
    fn scan_range_limits_the_windows() {
        // Only positions 1..4 are scanned: CG, GT.
        let kmers: Vec<_> = KmerScanner::with_range(b"ACGTA", 2, 1, 4).collect();
        assert_eq!(kmers.len(), 2);
        assert_eq!(kmers[0].value, 0b0110);
        assert_eq!(kmers[1].value, 0b1011);
    }

    #[test]
    fn max_k_window_uses_the_full_mask() {
        let seq = vec![b'T'; 40];
        let kmers = collect(&seq, MAX_K);
        assert_eq!(kmers.len(), 40 - MAX_K + 1);
        assert_eq!(kmers[0].value, (1u64 << (2 * MAX_K)) - 1);
    }
}

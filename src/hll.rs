//src/hll.rs

use crate::errors::{Error, Result};

/// Default sketch precision; 2^14 registers keeps the relative error of the
/// distinct-k-mer estimate around 1%.
pub const DEFAULT_PRECISION: u8 = 14;
pub const MIN_PRECISION: u8 = 10;
pub const MAX_PRECISION: u8 = 18;

/// 64-bit murmur3 finalizer. Items are mixed through this on insert so that
/// raw k-mer values (which are far from uniform) spread evenly over the
/// registers.
#[inline]
fn murmur64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// A mergeable approximate distinct-element counter.
///
/// The low `precision` bits of the mixed hash select one of 2^precision
/// one-byte registers; the register keeps the maximum over all inserts of
/// `leading-zero count of the remaining bits + 1`. Because every update is a
/// register-wise max, merging two sketches of equal precision by taking the
/// register-wise max exactly reproduces the sketch of the union of their
/// inputs, which is what makes per-shard counting combinable without ever
/// materializing the element sets.
///
/// `n_observed` counts raw inserts (not distinct elements) and caps the
/// estimate: the number of distinct elements can never exceed the number of
/// insert operations. It is carried through serialization so the cap stays
/// correct after reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
    n_observed: u64,
}

impl HyperLogLog {
    /// Panics if `precision` is outside `MIN_PRECISION..=MAX_PRECISION`.
    pub fn new(precision: u8) -> Self {
        assert!(
            (MIN_PRECISION..=MAX_PRECISION).contains(&precision),
            "sketch precision must be in {MIN_PRECISION}..={MAX_PRECISION}"
        );
        HyperLogLog {
            precision,
            registers: vec![0u8; 1usize << precision],
            n_observed: 0,
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn observed(&self) -> u64 {
        self.n_observed
    }

    /// Overrides the observed-insert counter, e.g. when an accumulator
    /// restores it from its exact k-mer count after deserialization.
    pub fn set_observed(&mut self, n_observed: u64) {
        self.n_observed = n_observed;
    }

    pub fn insert(&mut self, item: u64) {
        let h = murmur64(item);
        let idx = (h & (self.registers.len() as u64 - 1)) as usize;
        let w = h >> self.precision;
        // w has its top `precision` bits clear, so this is the leading-zero
        // count within the remaining 64-p bits, plus one.
        let rank = w.leading_zeros() as u8 - self.precision + 1;
        if rank > self.registers[idx] {
            self.registers[idx] = rank;
        }
        self.n_observed += 1;
    }

    /// Estimate of the number of distinct items inserted.
    ///
    /// Uses the bias-corrected harmonic-mean estimator, switching to linear
    /// counting while the raw estimate is below 2.5·m and zero registers
    /// remain. Hashes are 64-bit, so no large-range correction is needed.
    pub fn cardinality(&self) -> u64 {
        let m = self.registers.len() as f64;
        let mut sum = 0.0;
        let mut zeros = 0u64;
        for &r in &self.registers {
            sum += 1.0 / (1u64 << r) as f64;
            if r == 0 {
                zeros += 1;
            }
        }
        let raw = alpha(self.registers.len()) * m * m / sum;

        let mut est = if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        };
        if self.n_observed > 0 && est > self.n_observed as f64 {
            est = self.n_observed as f64;
        }
        est.round() as u64
    }

    /// Register-wise maximum merge. Idempotent, commutative and associative;
    /// fails with `IncompatiblePrecision` when the register counts differ.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<()> {
        if self.precision != other.precision {
            return Err(Error::IncompatiblePrecision {
                expected: self.precision,
                found: other.precision,
            });
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
        self.n_observed += other.n_observed;
        Ok(())
    }

    /// Single whitespace-free field: `hll:<p>:<observed>:d:<hex registers>`
    /// or, while most registers are still zero,
    /// `hll:<p>:<observed>:s:<idx.val,idx.val,...>`.
    pub fn serialize(&self) -> String {
        use std::fmt::Write as _;

        let nonzero = self.registers.iter().filter(|&&r| r != 0).count();
        let mut out = format!("hll:{}:{}:", self.precision, self.n_observed);
        if nonzero * 8 < self.registers.len() * 2 {
            out.push_str("s:");
            let mut first = true;
            for (idx, &r) in self.registers.iter().enumerate() {
                if r == 0 {
                    continue;
                }
                if !first {
                    out.push(',');
                }
                let _ = write!(out, "{idx}.{r}");
                first = false;
            }
        } else {
            out.push_str("d:");
            for &r in &self.registers {
                let _ = write!(out, "{r:02x}");
            }
        }
        out
    }

    pub fn deserialize(serialized: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedAccumulatorRecord {
            line_no: 0,
            reason: reason.to_string(),
        };

        let mut fields = serialized.splitn(5, ':');
        if fields.next() != Some("hll") {
            return Err(malformed("missing hll tag"));
        }
        let precision: u8 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .filter(|p| (MIN_PRECISION..=MAX_PRECISION).contains(p))
            .ok_or_else(|| malformed("bad sketch precision"))?;
        let n_observed: u64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("bad observed counter"))?;
        let mode = fields.next().ok_or_else(|| malformed("missing encoding mode"))?;
        let payload = fields.next().ok_or_else(|| malformed("missing register payload"))?;

        let m = 1usize << precision;
        // Ranks come from the leading-zero count of the 64-p remaining hash
        // bits, so nothing above this can occur in a well-formed sketch.
        let max_rank = 64 - precision + 1;
        let mut registers = vec![0u8; m];
        match mode {
            "s" => {
                for pair in payload.split(',').filter(|p| !p.is_empty()) {
                    let (idx, val) = pair
                        .split_once('.')
                        .and_then(|(i, v)| Some((i.parse::<usize>().ok()?, v.parse::<u8>().ok()?)))
                        .ok_or_else(|| malformed("bad sparse register pair"))?;
                    if idx >= m {
                        return Err(malformed("sparse register index out of range"));
                    }
                    if val > max_rank {
                        return Err(malformed("register value exceeds attainable rank"));
                    }
                    registers[idx] = val;
                }
            }
            "d" => {
                if payload.len() != 2 * m {
                    return Err(malformed("dense register payload has wrong length"));
                }
                for (idx, chunk) in payload.as_bytes().chunks_exact(2).enumerate() {
                    let s = std::str::from_utf8(chunk).map_err(|_| malformed("non-ascii payload"))?;
                    let val =
                        u8::from_str_radix(s, 16).map_err(|_| malformed("bad register byte"))?;
                    if val > max_rank {
                        return Err(malformed("register value exceeds attainable rank"));
                    }
                    registers[idx] = val;
                }
            }
            _ => return Err(malformed("unknown encoding mode")),
        }

        Ok(HyperLogLog {
            precision,
            registers,
            n_observed,
        })
    }
}

fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sketch_of(range: impl IntoIterator<Item = u64>) -> HyperLogLog {
        let mut hll = HyperLogLog::new(DEFAULT_PRECISION);
        for item in range {
            hll.insert(item);
        }
        hll
    }

    fn assert_within_pct(estimate: u64, truth: u64, pct: f64) {
        let err = (estimate as f64 - truth as f64).abs() / truth as f64;
        assert!(
            err <= pct / 100.0,
            "estimate {estimate} is {:.2}% off {truth}",
            err * 100.0
        );
    }

    #[test]
    fn repeated_inserts_are_idempotent_on_registers() {
        let once = sketch_of([42]);
        let mut many = HyperLogLog::new(DEFAULT_PRECISION);
        for _ in 0..100 {
            many.insert(42);
        }
        assert_eq!(once.registers, many.registers);
        assert_eq!(many.observed(), 100);
        // The cap keeps a duplicate-heavy sketch honest anyway.
        assert_eq!(many.cardinality(), 1);
    }

    #[test]
    fn estimates_stay_within_two_percent_in_the_linear_regime() {
        assert_within_pct(sketch_of(1..=1_000).cardinality(), 1_000, 2.0);
        assert_within_pct(sketch_of(1..=10_000).cardinality(), 10_000, 2.0);
    }

    #[test]
    fn large_cardinalities_use_the_harmonic_estimator() {
        assert_within_pct(sketch_of(1..=200_000).cardinality(), 200_000, 3.0);
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let s1 = sketch_of(1..=1_000);
        let s2 = sketch_of(500..=1_500);
        let s3 = sketch_of(10_000..=11_000);

        let mut ab = s1.clone();
        ab.merge(&s2).unwrap();
        let mut ba = s2.clone();
        ba.merge(&s1).unwrap();
        assert_eq!(ab, ba);

        let mut left = ab.clone();
        left.merge(&s3).unwrap();
        let mut bc = s2.clone();
        bc.merge(&s3).unwrap();
        let mut right = s1.clone();
        right.merge(&bc).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn merge_equals_inserting_the_union() {
        let mut merged = sketch_of(1..=1_000);
        merged.merge(&sketch_of(500..=1_500)).unwrap();

        let mut union = sketch_of(1..=1_500);
        // Match the raw insert count: 1000 + 1001 inserts happened.
        union.set_observed(merged.observed());
        assert_eq!(merged, union);
        assert_within_pct(merged.cardinality(), 1_500, 2.0);
    }

    #[test]
    fn merge_rejects_mismatched_precision() {
        let mut a = HyperLogLog::new(12);
        let b = HyperLogLog::new(14);
        assert!(matches!(
            a.merge(&b),
            Err(Error::IncompatiblePrecision { expected: 12, found: 14 })
        ));
    }

    #[test]
    fn serialization_round_trips_sparse_and_dense() {
        let empty = HyperLogLog::new(DEFAULT_PRECISION);
        assert_eq!(HyperLogLog::deserialize(&empty.serialize()).unwrap(), empty);

        let sparse = sketch_of(1..=50);
        assert!(sparse.serialize().starts_with("hll:14:50:s:"));
        assert_eq!(HyperLogLog::deserialize(&sparse.serialize()).unwrap(), sparse);

        let dense = sketch_of(1..=100_000);
        assert!(dense.serialize().contains(":d:"));
        let back = HyperLogLog::deserialize(&dense.serialize()).unwrap();
        assert_eq!(back, dense);
        assert_eq!(back.cardinality(), dense.cardinality());
    }

    #[test]
    fn deserialized_registers_are_bounded_by_the_attainable_rank() {
        // The maximum rank survives a round trip and estimates safely.
        let hll = HyperLogLog::deserialize("hll:14:3:s:0.51").unwrap();
        assert_eq!(hll.cardinality(), 1);

        // Dense payloads are held to the same bound: 55 is the ceiling at
        // precision 10, 56 is corrupt.
        let at_max = format!("hll:10:0:d:{}", "37".repeat(1024));
        assert!(HyperLogLog::deserialize(&at_max).is_ok());
        let over = format!("hll:10:0:d:{}", "38".repeat(1024));
        assert!(matches!(
            HyperLogLog::deserialize(&over),
            Err(Error::MalformedAccumulatorRecord { .. })
        ));
    }

    #[test]
    fn deserialization_rejects_corrupt_input() {
        for bad in [
            "",
            "hll",
            "hll:14:10",
            "hll:99:10:s:",
            "hll:14:x:s:",
            "hll:14:10:q:00",
            "hll:14:10:d:0102",
            "hll:14:10:s:99999999.3",
            // Rank 52 is unattainable at precision 14 (max is 64 - 14 + 1).
            "hll:14:0:s:0.52",
            "hll:14:0:s:0.200",
        ] {
            assert!(
                matches!(
                    HyperLogLog::deserialize(bad),
                    Err(Error::MalformedAccumulatorRecord { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }
}

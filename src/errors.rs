//src/errors.rs

use crate::types::TaxonId;

/// Errors surfaced by the classification core.
///
/// Taxonomy construction errors abort a run: a broken taxonomy invalidates
/// all downstream classification. Precision mismatches fail only the
/// offending merge; the caller decides whether to skip the shard or abort.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed taxonomy record at line {line_no}: {line:?}")]
    MalformedTaxonomyRecord { line_no: usize, line: String },

    #[error("duplicate taxon {taxid} with conflicting parents {first} and {second}")]
    DuplicateTaxon {
        taxid: TaxonId,
        first: TaxonId,
        second: TaxonId,
    },

    #[error("taxon {0} not present in the parent map")]
    UnknownTaxon(TaxonId),

    #[error("cannot merge sketches of precision {expected} and {found}")]
    IncompatiblePrecision { expected: u8, found: u8 },

    #[error("malformed taxon count record at line {line_no}: {reason}")]
    MalformedAccumulatorRecord { line_no: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

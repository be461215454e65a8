use std::io;

use thiserror::Error;

/// Errors raised while transforming an individual record.
///
/// Every variant carries the zero-based index of the input record that
/// triggered it. All of these are fatal to the running pipeline: the record
/// is not emitted and the invocation aborts with a nonzero exit code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[record {record}] no AF field in record")]
    MissingAf { record: usize },

    #[error("[record {record}] AF field of multi-allelic record was not a float vector")]
    AfTypeMismatch { record: usize },

    #[error(
        "[record {record}] AF field of multi-allelic record has wrong size: {actual}, but {expected} was expected"
    )]
    AfLengthMismatch {
        record: usize,
        expected: usize,
        actual: usize,
    },

    #[error(
        "[record {record}] expected {expected} elements in field {field}, but got {actual}; a single '.' as placeholder is not supported"
    )]
    FieldLengthMismatch {
        record: usize,
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "[record {record}] field {field}: every sample must be diploid and must contain the correct number of values (no single '.' placeholder allowed)"
    )]
    DiploidOrCardinalityMismatch { record: usize, field: String },

    #[error("[record {record}] cannot compute localised alleles if PL field is not present")]
    MissingPl { record: usize },

    #[error("[record {record}] PL field was not an integer column")]
    PlTypeMismatch { record: usize },

    #[error("[record {record}] AD field was not an integer column")]
    AdTypeMismatch { record: usize },

    #[error("[record {record}] cannot add {field} field, because {field} field already present")]
    FieldAlreadyPresent { record: usize, field: String },

    #[error("VCF file contains no samples")]
    NoSamples,

    #[error("[record {record}] failed to read record")]
    Reader {
        record: usize,
        #[source]
        source: io::Error,
    },

    #[error("[record {record}] failed to write record")]
    Writer {
        record: usize,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Reader-side failure with a plain-text cause.
    pub fn reader(record: usize, message: impl Into<String>) -> Self {
        Self::Reader {
            record,
            source: io::Error::new(io::ErrorKind::InvalidData, message.into()),
        }
    }
}

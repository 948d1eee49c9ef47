use thiserror::Error;

use crate::record::DataType;

/// Errors produced while parsing or combining metric records.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The key or sample text does not follow the expected grammar.
    #[error("invalid key format: {0}")]
    InvalidFormat(#[from] FormatError),

    /// The value text cannot be represented as the requested data type.
    #[error("invalid {data_type} value `{value}`")]
    InvalidValue {
        /// The data type the value was parsed as.
        data_type: DataType,
        /// The offending value text.
        value: String,
    },

    /// A record was constructed with a count of zero.
    #[error("record count must be at least 1")]
    InvalidCount,

    /// Two records with different operation or measurement types were merged.
    ///
    /// This indicates a grouping defect upstream of the merge.
    #[error("cannot merge `{left}` with `{right}`")]
    IncompatibleMerge {
        /// Key of the left-hand record.
        left: String,
        /// Key of the right-hand record.
        right: String,
    },
}

/// The specific way in which a key or sample failed to parse.
#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    /// The `:` between data type and operation type is missing.
    #[error("no type separator `:`")]
    MissingTypeSeparator,
    /// The `*` between operation type and measurement type is missing.
    #[error("no measurement separator `*`")]
    MissingMeasurementSeparator,
    /// The `:` between measurement type and value of a sample is missing.
    #[error("no sample separator `:`")]
    MissingSampleSeparator,
    /// The data type token is not one of the known data types.
    #[error("invalid output type `{0}`")]
    UnknownDataType(String),
    /// An operation or measurement type contains a separator of the key grammar.
    #[error("`{name}` contains reserved character `{character}`")]
    ReservedCharacter {
        /// The offending operation or measurement type.
        name: String,
        /// The first reserved character found in `name`.
        character: char,
    },
}

/// Result type for record operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

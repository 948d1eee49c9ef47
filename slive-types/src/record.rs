//! Metric records, their values and the textual key grammar.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, FormatError, Result};

const TYPE_SEPARATOR: char = ':';
const MEASUREMENT_SEPARATOR: char = '*';

/// Fails if `name` contains a character that separates the parts of a key or sample.
pub fn check_name(name: &str) -> Result<(), FormatError> {
    match name.chars().find(|c| [TYPE_SEPARATOR, MEASUREMENT_SEPARATOR].contains(c)) {
        Some(character) => Err(FormatError::ReservedCharacter {
            name: name.to_owned(),
            character,
        }),
        None => Ok(()),
    }
}

/// The representation of a [`MetricValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// Free-form text. Merging concatenates with `;`.
    String,
    /// 32-bit floating point number.
    Float,
    /// 64-bit signed integer.
    Long,
    /// 64-bit floating point number.
    Double,
    /// 32-bit signed integer.
    Integer,
}

impl DataType {
    /// All data types, in declaration order.
    pub const ALL: [DataType; 5] = [
        DataType::String,
        DataType::Float,
        DataType::Long,
        DataType::Double,
        DataType::Integer,
    ];

    /// Returns the uppercase name used in keys.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "STRING",
            DataType::Float => "FLOAT",
            DataType::Long => "LONG",
            DataType::Double => "DOUBLE",
            DataType::Integer => "INTEGER",
        }
    }

    /// Rank on the merge promotion ladder. The higher rank wins.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            DataType::String => 4,
            DataType::Double => 3,
            DataType::Float => 2,
            DataType::Long => 1,
            DataType::Integer => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|data_type| data_type.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FormatError::UnknownDataType(s.to_owned()))
    }
}

/// A measured value. The variant determines the record's [`DataType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum MetricValue {
    /// See [`DataType::String`].
    String(String),
    /// See [`DataType::Float`].
    Float(f32),
    /// See [`DataType::Long`].
    Long(i64),
    /// See [`DataType::Double`].
    Double(f64),
    /// See [`DataType::Integer`].
    Integer(i32),
}

impl MetricValue {
    /// Returns the data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            MetricValue::String(_) => DataType::String,
            MetricValue::Float(_) => DataType::Float,
            MetricValue::Long(_) => DataType::Long,
            MetricValue::Double(_) => DataType::Double,
            MetricValue::Integer(_) => DataType::Integer,
        }
    }

    /// Parses value text as the given data type.
    pub fn parse(data_type: DataType, text: &str) -> Result<Self> {
        let invalid = || Error::InvalidValue {
            data_type,
            value: text.to_owned(),
        };

        let value = match data_type {
            DataType::String => MetricValue::String(text.to_owned()),
            DataType::Float => MetricValue::Float(text.parse().map_err(|_| invalid())?),
            DataType::Long => MetricValue::Long(text.parse().map_err(|_| invalid())?),
            DataType::Double => MetricValue::Double(text.parse().map_err(|_| invalid())?),
            DataType::Integer => MetricValue::Integer(text.parse().map_err(|_| invalid())?),
        };

        Ok(value)
    }

    /// Returns the value as a whole number, if it is an integer type.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            MetricValue::Long(value) => Some(value),
            MetricValue::Integer(value) => Some(value.into()),
            _ => None,
        }
    }
}

/// Renders the canonical textual form, independent of locale.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::String(value) => f.write_str(value),
            MetricValue::Float(value) => write!(f, "{value}"),
            MetricValue::Long(value) => write!(f, "{value}"),
            MetricValue::Double(value) => write!(f, "{value}"),
            MetricValue::Integer(value) => write!(f, "{value}"),
        }
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::String(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_owned())
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::Float(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Long(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Integer(value)
    }
}

/// Identifies a class of records: `DATATYPE:operationType*measurementType`.
///
/// The first `:` separates the data type, and the first `*` after it separates the measurement
/// type. The data type token is matched case-insensitively but always rendered in uppercase.
///
/// ```
/// use slive_types::{DataType, MetricKey};
///
/// let key: MetricKey = "LONG:write*duration".parse().unwrap();
/// assert_eq!(key.data_type, DataType::Long);
/// assert_eq!(key.operation_type, "write");
/// assert_eq!(key.to_string(), "LONG:write*duration");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    /// Representation of the record value.
    pub data_type: DataType,
    /// The operation this record measures, such as `write`.
    pub operation_type: String,
    /// The kind of measurement, such as `duration`.
    pub measurement_type: String,
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{TYPE_SEPARATOR}{}{MEASUREMENT_SEPARATOR}{}",
            self.data_type, self.operation_type, self.measurement_type
        )
    }
}

impl FromStr for MetricKey {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        let (type_token, rest) = key
            .split_once(TYPE_SEPARATOR)
            .ok_or(FormatError::MissingTypeSeparator)?;
        let data_type = type_token.parse()?;
        let (operation_type, measurement_type) = rest
            .split_once(MEASUREMENT_SEPARATOR)
            .ok_or(FormatError::MissingMeasurementSeparator)?;
        check_name(operation_type)?;
        check_name(measurement_type)?;

        Ok(Self {
            data_type,
            operation_type: operation_type.to_owned(),
            measurement_type: measurement_type.to_owned(),
        })
    }
}

/// A single immutable measurement.
///
/// Records are created by the executor once per operation attempt, optionally merged during
/// aggregation, and dropped once the summary has been produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct MetricRecord {
    operation_type: String,
    measurement_type: String,
    value: MetricValue,
    count: u64,
}

#[derive(Deserialize)]
struct RawRecord {
    operation_type: String,
    measurement_type: String,
    value: MetricValue,
    count: u64,
}

impl TryFrom<RawRecord> for MetricRecord {
    type Error = Error;

    fn try_from(raw: RawRecord) -> Result<Self> {
        MetricRecord::new(raw.operation_type, raw.measurement_type, raw.value)?.with_count(raw.count)
    }
}

impl MetricRecord {
    /// Creates a record with a count of one.
    ///
    /// Fails with [`FormatError::ReservedCharacter`] if either type contains `:` or `*`.
    pub fn new(
        operation_type: impl Into<String>,
        measurement_type: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> Result<Self> {
        let operation_type = operation_type.into();
        let measurement_type = measurement_type.into();
        check_name(&operation_type)?;
        check_name(&measurement_type)?;

        Ok(Self {
            operation_type,
            measurement_type,
            value: value.into(),
            count: 1,
        })
    }

    /// Replaces the number of measurements this record represents.
    pub fn with_count(mut self, count: u64) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidCount);
        }
        self.count = count;
        Ok(self)
    }

    /// A successful operation that took `elapsed_ms` milliseconds.
    pub fn duration(operation_type: impl Into<String>, elapsed_ms: i64) -> Result<Self> {
        Self::new(operation_type, crate::DURATION, elapsed_ms)
    }

    /// A failed operation that took `elapsed_ms` milliseconds before failing.
    ///
    /// An operation type that could not be dispatched at all carries `-1`.
    pub fn error(operation_type: impl Into<String>, elapsed_ms: i64) -> Result<Self> {
        Self::new(operation_type, crate::ERROR, elapsed_ms)
    }

    /// An operation that was not performed.
    pub fn skipped(operation_type: impl Into<String>) -> Result<Self> {
        Self::new(operation_type, crate::SKIPPED, 0i64)
    }

    /// The failure of an operation whose name cannot be recorded, under
    /// [`INVALID_OPERATION`](crate::INVALID_OPERATION) with value `-1`.
    pub fn invalid_operation() -> Self {
        Self::from_parts(
            crate::INVALID_OPERATION.to_owned(),
            crate::ERROR.to_owned(),
            MetricValue::Long(-1),
            1,
        )
    }

    /// Builds a record from a parsed key and the textual value.
    pub fn from_key(key: MetricKey, value: &str) -> Result<Self> {
        let value = MetricValue::parse(key.data_type, value)?;
        Ok(Self {
            operation_type: key.operation_type,
            measurement_type: key.measurement_type,
            value,
            count: 1,
        })
    }

    /// Parses a record from its key string and value text.
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        Self::from_key(key.parse()?, value)
    }

    /// Returns the data type of the value.
    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    /// Returns the operation type, such as `write`.
    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    /// Returns the measurement type, such as `duration`.
    pub fn measurement_type(&self) -> &str {
        &self.measurement_type
    }

    /// Returns the measured value.
    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    /// Returns how many measurements were combined into this record.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `true` if this record describes a failed operation.
    pub fn is_error(&self) -> bool {
        self.measurement_type == crate::ERROR
    }

    /// Returns the key identifying this record's class.
    pub fn key(&self) -> MetricKey {
        MetricKey {
            data_type: self.data_type(),
            operation_type: self.operation_type.clone(),
            measurement_type: self.measurement_type.clone(),
        }
    }

    /// Renders the key in `DATATYPE:operationType*measurementType` form.
    pub fn key_string(&self) -> String {
        self.key().to_string()
    }

    /// Renders the value in its canonical textual form.
    pub fn output_value(&self) -> String {
        self.value.to_string()
    }

    /// Renders the reducer entry, `measurementType:value`.
    pub fn to_sample(&self) -> String {
        format!("{}:{}", self.measurement_type, self.value)
    }

    pub(crate) fn from_parts(
        operation_type: String,
        measurement_type: String,
        value: MetricValue,
        count: u64,
    ) -> Self {
        Self {
            operation_type,
            measurement_type,
            value,
            count,
        }
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key(), self.value)
    }
}

use crate::error::{Error, FormatError, Result};
use crate::record::DataType;

/// The reducer entry form of a record: `measurementType:value`.
///
/// Workers emit one sample per operation attempt, grouped by operation type. The value is always
/// interpreted as a whole number of milliseconds.
///
/// ```
/// use slive_types::Sample;
///
/// let sample = Sample::parse("duration:100").unwrap();
/// assert_eq!(sample.measurement_type, "duration");
/// assert_eq!(sample.value, 100);
/// assert!(Sample::parse("invalid").is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample<'a> {
    /// The measurement tag, such as `duration` or `error`.
    pub measurement_type: &'a str,
    /// The measured milliseconds.
    pub value: i64,
}

impl<'a> Sample<'a> {
    /// Parses a sample entry.
    pub fn parse(entry: &'a str) -> Result<Self> {
        let (measurement_type, value) = entry
            .split_once(':')
            .ok_or(FormatError::MissingSampleSeparator)?;

        let value = value.trim().parse().map_err(|_| Error::InvalidValue {
            data_type: DataType::Long,
            value: value.to_owned(),
        })?;

        Ok(Self {
            measurement_type,
            value,
        })
    }

    /// Returns `true` if the sample describes a failed operation.
    pub fn is_error(&self) -> bool {
        self.measurement_type == crate::ERROR
    }

    /// Returns `true` if the sample describes an operation that was not performed.
    pub fn is_skipped(&self) -> bool {
        self.measurement_type == crate::SKIPPED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricRecord;

    #[test]
    fn parses_record_samples() {
        let entry = MetricRecord::error("write", 42).unwrap().to_sample();
        let sample = Sample::parse(&entry).unwrap();

        assert_eq!(sample.measurement_type, "error");
        assert_eq!(sample.value, 42);
        assert!(sample.is_error());
        assert!(!sample.is_skipped());
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert_eq!(
            Sample::parse("duration:1.5"),
            Err(Error::InvalidValue {
                data_type: DataType::Long,
                value: "1.5".into()
            })
        );
        assert_eq!(
            Sample::parse("duration"),
            Err(Error::InvalidFormat(FormatError::MissingSampleSeparator))
        );
    }
}

//! Type-directed combination of metric records.
//!
//! Two records sharing an operation and measurement type merge into one whose count is the sum
//! of both counts. The value type is chosen by the first matching rule:
//!
//! 1. either operand is a string: concatenate `a;b`, preserving argument order
//! 2. either is a double: sum as double
//! 3. either is a float: sum as float
//! 4. either is a long: sum as long
//! 5. both are integers: sum as integer
//!
//! Integer sums saturate at the bounds of their type.

use crate::error::{Error, Result};
use crate::record::{DataType, MetricRecord, MetricValue};

const STRING_SEPARATOR: &str = ";";

impl MetricRecord {
    /// Combines this record with another one of the same operation and measurement type.
    ///
    /// Fails with [`Error::IncompatibleMerge`] if the operation or measurement types differ.
    ///
    /// ```
    /// use slive_types::{MetricRecord, MetricValue};
    ///
    /// let a = MetricRecord::duration("write", 100).unwrap();
    /// let b = MetricRecord::new("write", "duration", 50i32).unwrap();
    /// let merged = a.merge(&b).unwrap();
    ///
    /// assert_eq!(merged.value(), &MetricValue::Long(150));
    /// assert_eq!(merged.count(), 2);
    /// ```
    pub fn merge(&self, other: &MetricRecord) -> Result<MetricRecord> {
        if self.operation_type() != other.operation_type()
            || self.measurement_type() != other.measurement_type()
        {
            return Err(Error::IncompatibleMerge {
                left: self.key_string(),
                right: other.key_string(),
            });
        }

        Ok(MetricRecord::from_parts(
            self.operation_type().to_owned(),
            self.measurement_type().to_owned(),
            merge_values(self.value(), other.value()),
            self.count().saturating_add(other.count()),
        ))
    }
}

fn merge_values(a: &MetricValue, b: &MetricValue) -> MetricValue {
    let target = if a.data_type().precedence() >= b.data_type().precedence() {
        a.data_type()
    } else {
        b.data_type()
    };

    match target {
        DataType::String => MetricValue::String(format!("{a}{STRING_SEPARATOR}{b}")),
        DataType::Double => MetricValue::Double(to_f64(a) + to_f64(b)),
        DataType::Float => MetricValue::Float(to_f32(a) + to_f32(b)),
        DataType::Long => MetricValue::Long(to_i64(a).saturating_add(to_i64(b))),
        DataType::Integer => MetricValue::Integer(to_i32(a).saturating_add(to_i32(b))),
    }
}

// Strings always promote to a string result, so the numeric conversions below never see one.

fn to_f64(value: &MetricValue) -> f64 {
    match *value {
        MetricValue::Double(v) => v,
        MetricValue::Float(v) => v.into(),
        MetricValue::Long(v) => v as f64,
        MetricValue::Integer(v) => v.into(),
        MetricValue::String(_) => f64::NAN,
    }
}

fn to_f32(value: &MetricValue) -> f32 {
    match *value {
        MetricValue::Float(v) => v,
        MetricValue::Double(v) => v as f32,
        MetricValue::Long(v) => v as f32,
        MetricValue::Integer(v) => v as f32,
        MetricValue::String(_) => f32::NAN,
    }
}

fn to_i64(value: &MetricValue) -> i64 {
    match *value {
        MetricValue::Long(v) => v,
        MetricValue::Integer(v) => v.into(),
        MetricValue::Float(v) => v as i64,
        MetricValue::Double(v) => v as i64,
        MetricValue::String(_) => 0,
    }
}

fn to_i32(value: &MetricValue) -> i32 {
    match *value {
        MetricValue::Integer(v) => v,
        MetricValue::Long(v) => v as i32,
        MetricValue::Float(v) => v as i32,
        MetricValue::Double(v) => v as i32,
        MetricValue::String(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: impl Into<MetricValue>) -> MetricRecord {
        MetricRecord::new("write", "duration", value).unwrap()
    }

    #[test]
    fn long_plus_long() {
        let merged = record(100i64).merge(&record(50i64)).unwrap();

        assert_eq!(merged.data_type(), DataType::Long);
        assert_eq!(merged.value(), &MetricValue::Long(150));
        assert_eq!(merged.count(), 2);
    }

    #[test]
    fn long_absorbs_integer() {
        let merged = record(100i64).merge(&record(50i32)).unwrap();
        assert_eq!(merged.value(), &MetricValue::Long(150));

        let merged = record(50i32).merge(&record(100i64)).unwrap();
        assert_eq!(merged.value(), &MetricValue::Long(150));
    }

    #[test]
    fn double_absorbs_float() {
        let merged = record(1000.0f64).merge(&record(500.0f32)).unwrap();
        assert_eq!(merged.value(), &MetricValue::Double(1500.0));
    }

    #[test]
    fn float_absorbs_long() {
        let merged = record(2.5f32).merge(&record(3i64)).unwrap();
        assert_eq!(merged.value(), &MetricValue::Float(5.5));
    }

    #[test]
    fn integers_stay_integers() {
        let merged = record(2i32).merge(&record(3i32)).unwrap();
        assert_eq!(merged.value(), &MetricValue::Integer(5));

        let merged = record(i32::MAX).merge(&record(1i32)).unwrap();
        assert_eq!(merged.value(), &MetricValue::Integer(i32::MAX));
    }

    #[test]
    fn strings_concatenate_in_order() {
        let merged = record("a").merge(&record("b")).unwrap();
        assert_eq!(merged.value(), &MetricValue::String("a;b".into()));

        let merged = record("b").merge(&record("a")).unwrap();
        assert_eq!(merged.value(), &MetricValue::String("b;a".into()));
    }

    #[test]
    fn string_wins_over_numbers() {
        let merged = record(1.5f64).merge(&record("slow")).unwrap();
        assert_eq!(merged.value(), &MetricValue::String("1.5;slow".into()));
    }

    #[test]
    fn counts_accumulate() {
        let a = record(10i64).with_count(3).unwrap();
        let b = record(20i64).with_count(4).unwrap();
        assert_eq!(a.merge(&b).unwrap().count(), 7);
    }

    #[test]
    fn rejects_different_operations() {
        let a = MetricRecord::duration("write", 10).unwrap();
        let b = MetricRecord::duration("read", 10).unwrap();

        assert_eq!(
            a.merge(&b),
            Err(Error::IncompatibleMerge {
                left: "LONG:write*duration".into(),
                right: "LONG:read*duration".into(),
            })
        );
    }

    #[test]
    fn rejects_different_measurements() {
        let a = MetricRecord::duration("write", 10).unwrap();
        let b = MetricRecord::error("write", 10).unwrap();
        assert!(matches!(a.merge(&b), Err(Error::IncompatibleMerge { .. })));
    }
}

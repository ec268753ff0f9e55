//! Typed flat value storage

use crate::types::{ElementXi, Error, FeValue, Result, Value, ValueType};

/// A flat array of values of one value type
#[derive(Debug, PartialEq, Clone)]
pub enum ValueStorage {
    /// Library floating point values
    FeValue(Vec<FeValue>),
    /// Double precision values
    Double(Vec<f64>),
    /// Single precision values
    Float(Vec<f32>),
    /// 32 bit integers
    Int(Vec<i32>),
    /// 16 bit integers
    Short(Vec<i16>),
    /// Strings
    String(Vec<String>),
    /// Embedded locations
    ElementXi(Vec<Option<ElementXi>>),
}

impl ValueStorage {
    /// Create storage holding `len` zero values
    pub fn new(value_type: ValueType, len: usize) -> Self {
        match value_type {
            ValueType::FeValue => ValueStorage::FeValue(vec![0.0; len]),
            ValueType::Double => ValueStorage::Double(vec![0.0; len]),
            ValueType::Float => ValueStorage::Float(vec![0.0; len]),
            ValueType::Int => ValueStorage::Int(vec![0; len]),
            ValueType::Short => ValueStorage::Short(vec![0; len]),
            ValueType::String => ValueStorage::String(vec![String::new(); len]),
            ValueType::ElementXi => ValueStorage::ElementXi(vec![None; len]),
        }
    }

    /// The type of the values
    pub fn value_type(&self) -> ValueType {
        match self {
            ValueStorage::FeValue(_) => ValueType::FeValue,
            ValueStorage::Double(_) => ValueType::Double,
            ValueStorage::Float(_) => ValueType::Float,
            ValueStorage::Int(_) => ValueType::Int,
            ValueStorage::Short(_) => ValueType::Short,
            ValueStorage::String(_) => ValueType::String,
            ValueStorage::ElementXi(_) => ValueType::ElementXi,
        }
    }

    /// The number of values
    pub fn len(&self) -> usize {
        match self {
            ValueStorage::FeValue(v) => v.len(),
            ValueStorage::Double(v) => v.len(),
            ValueStorage::Float(v) => v.len(),
            ValueStorage::Int(v) => v.len(),
            ValueStorage::Short(v) => v.len(),
            ValueStorage::String(v) => v.len(),
            ValueStorage::ElementXi(v) => v.len(),
        }
    }

    /// Is the storage empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a value
    pub fn get(&self, index: usize) -> Option<Value> {
        Some(match self {
            ValueStorage::FeValue(v) => Value::FeValue(*v.get(index)?),
            ValueStorage::Double(v) => Value::Double(*v.get(index)?),
            ValueStorage::Float(v) => Value::Float(*v.get(index)?),
            ValueStorage::Int(v) => Value::Int(*v.get(index)?),
            ValueStorage::Short(v) => Value::Short(*v.get(index)?),
            ValueStorage::String(v) => Value::String(v.get(index)?.clone()),
            ValueStorage::ElementXi(v) => Value::ElementXi(v.get(index)?.clone()),
        })
    }

    /// Set a value, which must have the storage's value type
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::InvalidArgument(format!(
                "value index {index} out of range for {len} values"
            )));
        }
        match (self, value) {
            (ValueStorage::FeValue(v), Value::FeValue(x)) => v[index] = x,
            (ValueStorage::Double(v), Value::Double(x)) => v[index] = x,
            (ValueStorage::Float(v), Value::Float(x)) => v[index] = x,
            (ValueStorage::Int(v), Value::Int(x)) => v[index] = x,
            (ValueStorage::Short(v), Value::Short(x)) => v[index] = x,
            (ValueStorage::String(v), Value::String(x)) => v[index] = x,
            (ValueStorage::ElementXi(v), Value::ElementXi(x)) => v[index] = x,
            (storage, value) => {
                return Err(Error::InvalidArgument(format!(
                    "cannot store a {} value in {} storage",
                    value.value_type(),
                    storage.value_type()
                )))
            }
        }
        Ok(())
    }

    /// Get a numeric value as a floating point number
    pub fn get_fe_value(&self, index: usize) -> Result<FeValue> {
        let value = self.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!("value index {index} out of range"))
        })?;
        value.as_fe_value().ok_or_else(|| {
            Error::InvalidArgument(format!("{} values are not numeric", self.value_type()))
        })
    }

    /// Set a numeric value from a floating point number
    pub fn set_fe_value(&mut self, index: usize, value: FeValue) -> Result<()> {
        let value = Value::from_fe_value(self.value_type(), value)?;
        self.set(index, value)
    }

    /// The value a fraction `xi` of the way from the value at `one` to the value at `two`
    ///
    /// Numeric values are interpolated linearly, rounding for integer types; other values
    /// are taken from the nearer index.
    pub fn interpolate(&self, one: usize, two: usize, xi: FeValue) -> Result<Value> {
        if one == two || xi == 0.0 {
            return self.get(one).ok_or_else(|| {
                Error::InvalidArgument(format!("value index {one} out of range"))
            });
        }
        if self.value_type().is_numeric() {
            let a = self.get_fe_value(one)?;
            let b = self.get_fe_value(two)?;
            Value::from_fe_value(self.value_type(), a + xi * (b - a))
        } else {
            let nearest = if xi < 0.5 { one } else { two };
            self.get(nearest).ok_or_else(|| {
                Error::InvalidArgument(format!("value index {nearest} out of range"))
            })
        }
    }

    /// Copy a value from another storage of the same type
    pub fn copy_from(
        &mut self,
        index: usize,
        source: &ValueStorage,
        source_index: usize,
    ) -> Result<()> {
        let value = source.get(source_index).ok_or_else(|| {
            Error::InvalidArgument(format!("value index {source_index} out of range"))
        })?;
        self.set(index, value)
    }

    /// The minimum and maximum numeric value in a range
    pub fn min_max(&self, range: std::ops::Range<usize>) -> Result<(FeValue, FeValue)> {
        if range.is_empty() {
            return Err(Error::InvalidArgument("empty range".to_string()));
        }
        let mut min = FeValue::INFINITY;
        let mut max = FeValue::NEG_INFINITY;
        for i in range {
            let v = self.get_fe_value(i)?;
            min = min.min(v);
            max = max.max(v);
        }
        Ok((min, max))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::ElementIdentifier;
    use approx::*;

    #[test]
    fn test_zero_initialised() {
        let storage = ValueStorage::new(ValueType::Int, 3);
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.get(2), Some(Value::Int(0)));
        assert_eq!(storage.get(3), None);
        let storage = ValueStorage::new(ValueType::ElementXi, 1);
        assert_eq!(storage.get(0), Some(Value::ElementXi(None)));
    }

    #[test]
    fn test_set_checks_type() {
        let mut storage = ValueStorage::new(ValueType::Short, 2);
        storage.set(1, Value::Short(7)).unwrap();
        assert_eq!(storage.get(1), Some(Value::Short(7)));
        assert!(storage.set(1, Value::Int(7)).is_err());
        assert!(storage.set(2, Value::Short(7)).is_err());
        assert_eq!(storage.get(1), Some(Value::Short(7)));
    }

    #[test]
    fn test_interpolate() {
        let mut storage = ValueStorage::new(ValueType::FeValue, 2);
        storage.set_fe_value(0, 1.0).unwrap();
        storage.set_fe_value(1, 3.0).unwrap();
        assert_eq!(storage.interpolate(0, 1, 0.25).unwrap(), Value::FeValue(1.5));

        let mut storage = ValueStorage::new(ValueType::Int, 2);
        storage.set_fe_value(1, 3.0).unwrap();
        assert_eq!(storage.interpolate(0, 1, 0.5).unwrap(), Value::Int(2));

        let mut storage = ValueStorage::new(ValueType::ElementXi, 2);
        let location = ElementXi {
            element: ElementIdentifier::element(1),
            xi: vec![0.5],
        };
        storage
            .set(1, Value::ElementXi(Some(location.clone())))
            .unwrap();
        assert_eq!(storage.interpolate(0, 1, 0.4).unwrap(), Value::ElementXi(None));
        assert_eq!(
            storage.interpolate(0, 1, 0.6).unwrap(),
            Value::ElementXi(Some(location))
        );
    }

    #[test]
    fn test_min_max() {
        let mut storage = ValueStorage::new(ValueType::Double, 3);
        storage.set_fe_value(0, 2.0).unwrap();
        storage.set_fe_value(1, -1.0).unwrap();
        let (min, max) = storage.min_max(0..3).unwrap();
        assert_relative_eq!(min, -1.0);
        assert_relative_eq!(max, 2.0);
        assert!(ValueStorage::new(ValueType::String, 1).min_max(0..1).is_err());
    }
}

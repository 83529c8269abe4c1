use chrono::{DateTime, Utc};

use crate::types::Value;

/// Conversion between an application type and [`Value`].
///
/// `from_value` returns `None` when the value holds a different variant;
/// `to_value` always succeeds.
pub trait ValueConvertible: Sized {
    fn from_value(value: &Value) -> Option<Self>;

    fn to_value(&self) -> Value;
}

macro_rules! integer_convertible {
    ($($ty:ty),*) => {
        $(
            impl ValueConvertible for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Integer(integer) => <$ty>::try_from(*integer).ok(),
                        _ => None,
                    }
                }

                fn to_value(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    value.to_value()
                }
            }
        )*
    };
}

integer_convertible!(i8, i16, i32, i64, u8, u16, u32);

// Pointer width is at most 64 bits on every supported target, so the widening
// cast is lossless. `u64` and `usize` have no total mapping onto `Integer`.
impl ValueConvertible for isize {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(integer) => isize::try_from(*integer).ok(),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self as i64)
    }
}

impl From<isize> for Value {
    fn from(value: isize) -> Self {
        value.to_value()
    }
}

/// Implements the trait for types that map onto exactly one variant.
macro_rules! variant_convertible {
    ($ty:ty, $variant:ident) => {
        impl ValueConvertible for $ty {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
        }

        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        }
    };
}

variant_convertible!(f32, Float);
variant_convertible!(f64, Double);
variant_convertible!(String, Text);
variant_convertible!(Vec<u8>, Blob);
variant_convertible!(DateTime<Utc>, Timestamp);

impl ValueConvertible for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.bool()
    }

    fn to_value(&self) -> Value {
        Value::Integer(if *self { 1 } else { 0 })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        value.to_value()
    }
}

impl<T: ValueConvertible> ValueConvertible for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

//! Argument values captured by test doubles.
//!
//! Recorded calls keep heterogeneous argument lists. Rather than erasing the
//! values into `dyn Any`, every argument is converted into the closed [`Arg`]
//! variant type, which keeps recorded histories comparable, printable and
//! serializable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single positional argument of a recorded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Arg {
    /// The unit value, also used for `None`.
    Unit,
    Bool(bool),
    /// Any integer that fits in `i64`, whatever its source type.
    Int(i64),
    /// Unsigned integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Arg>),
    Map(BTreeMap<String, Arg>),
    /// The `Debug` rendering of a value with no structural mapping.
    Opaque(String),
}

impl Arg {
    /// Captures a value by its `Debug` representation.
    pub fn debug(value: &impl fmt::Debug) -> Self {
        Arg::Opaque(format!("{:?}", value))
    }

    /// Captures raw bytes.
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Arg::Bytes(value.into())
    }

    /// Converts any serializable value into its structural form.
    ///
    /// Structs become maps and sequences become lists. Integers follow the
    /// same rule as the `From` conversions, so `Arg::serialized(&3u32)`
    /// equals `Arg::from(3u32)`.
    pub fn serialized<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(Self::from_json(json))
    }

    fn from_unsigned(value: u64) -> Self {
        i64::try_from(value).map_or(Arg::UInt(value), Arg::Int)
    }

    fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Arg::Unit,
            Value::Bool(b) => Arg::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Arg::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Arg::UInt(u)
                } else {
                    Arg::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Arg::Str(s),
            Value::Array(items) => Arg::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(fields) => Arg::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a signed integer, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Arg::Int(i) => Some(*i),
            Arg::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }
}

/// Builds a `Vec<Arg>` from a heterogeneous list of expressions.
///
/// ```
/// use testbed_proto::{Arg, args};
///
/// let args = args!["send", 3, true];
/// assert_eq!(args, vec![Arg::from("send"), Arg::Int(3), Arg::Bool(true)]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($arg)),+]
    };
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Unit => f.write_str("()"),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::UInt(u) => write!(f, "{}", u),
            Arg::Float(x) => write!(f, "{:?}", x),
            Arg::Str(s) => write!(f, "{:?}", s),
            Arg::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Arg::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Arg::Map(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Arg::Opaque(repr) => f.write_str(repr),
        }
    }
}

impl From<()> for Arg {
    fn from((): ()) -> Self {
        Arg::Unit
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

macro_rules! from_signed {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Arg::Int(i64::from(value))
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Arg::from_unsigned(u64::from(value))
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<isize> for Arg {
    fn from(value: isize) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<usize> for Arg {
    fn from(value: usize) -> Self {
        Arg::from_unsigned(value as u64)
    }
}

impl From<f32> for Arg {
    fn from(value: f32) -> Self {
        Arg::Float(f64::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<char> for Arg {
    fn from(value: char) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Str(value.clone())
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(value.to_vec())
    }
}

impl From<&Arg> for Arg {
    fn from(value: &Arg) -> Self {
        value.clone()
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Unit, Into::into)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Arg::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Arg>> From<BTreeMap<String, T>> for Arg {
    fn from(fields: BTreeMap<String, T>) -> Self {
        Arg::Map(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

//! Parameter types and values.

use std::fmt;

/// Declared type of a parameter.
///
/// The type says how a [`ParameterValue`] should be read. It has nothing to
/// do with the data flowing through the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterType {
    /// Matches any declared type when used in a request.
    #[default]
    Any,
    /// No data is carried.
    None,
    /// A 64-bit float.
    Double,
    /// An unsigned 64-bit integer.
    Uint64,
    /// A signed 64-bit integer.
    Int64,
    /// A boolean flag.
    Bool,
    /// A UTF-8 string.
    String,
    /// An argv-like list of strings.
    ArgList,
    /// A user-defined type, tagged by an application-chosen number.
    Custom(u32),
}

impl ParameterType {
    /// Whether a request for `requested` may be served by a parameter
    /// declared as `self`.
    pub fn accepts(self, requested: ParameterType) -> bool {
        requested == ParameterType::Any || self == ParameterType::Any || self == requested
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Any => write!(f, "any"),
            ParameterType::None => write!(f, "none"),
            ParameterType::Double => write!(f, "double"),
            ParameterType::Uint64 => write!(f, "uint64"),
            ParameterType::Int64 => write!(f, "int64"),
            ParameterType::Bool => write!(f, "bool"),
            ParameterType::String => write!(f, "string"),
            ParameterType::ArgList => write!(f, "arglist"),
            ParameterType::Custom(tag) => write!(f, "custom({tag})"),
        }
    }
}

/// Current value of a parameter.
///
/// Values are small and cloned when handed to callbacks, so a receiver
/// never shares memory with the owning filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParameterValue {
    /// No data.
    #[default]
    None,
    /// A 64-bit float.
    Double(f64),
    /// An unsigned 64-bit integer.
    Uint64(u64),
    /// A signed 64-bit integer.
    Int64(i64),
    /// A boolean flag.
    Bool(bool),
    /// A UTF-8 string.
    String(String),
    /// An argv-like list of strings.
    ArgList(Vec<String>),
    /// Opaque bytes of a user-defined type.
    Custom {
        /// Application-chosen type tag.
        tag: u32,
        /// Encoded value.
        bytes: Vec<u8>,
    },
}

impl ParameterValue {
    /// The type this value naturally carries.
    pub fn parameter_type(&self) -> ParameterType {
        match self {
            ParameterValue::None => ParameterType::None,
            ParameterValue::Double(_) => ParameterType::Double,
            ParameterValue::Uint64(_) => ParameterType::Uint64,
            ParameterValue::Int64(_) => ParameterType::Int64,
            ParameterValue::Bool(_) => ParameterType::Bool,
            ParameterValue::String(_) => ParameterType::String,
            ParameterValue::ArgList(_) => ParameterType::ArgList,
            ParameterValue::Custom { tag, .. } => ParameterType::Custom(*tag),
        }
    }

    /// Try to get as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Double(v) => Some(*v),
            ParameterValue::Uint64(v) => Some(*v as f64),
            ParameterValue::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int64(v) => Some(*v),
            ParameterValue::Uint64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParameterValue::Uint64(v) => Some(*v),
            ParameterValue::Int64(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an argument list.
    pub fn as_args(&self) -> Option<&[String]> {
        match self {
            ParameterValue::ArgList(args) => Some(args),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::None => write!(f, "none"),
            ParameterValue::Double(v) => write!(f, "{v}"),
            ParameterValue::Uint64(v) => write!(f, "{v}"),
            ParameterValue::Int64(v) => write!(f, "{v}"),
            ParameterValue::Bool(v) => write!(f, "{v}"),
            ParameterValue::String(s) => write!(f, "{s:?}"),
            ParameterValue::ArgList(args) => write!(f, "{args:?}"),
            ParameterValue::Custom { tag, bytes } => {
                write!(f, "custom({tag}, {} bytes)", bytes.len())
            }
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Double(v)
    }
}

impl From<u64> for ParameterValue {
    fn from(v: u64) -> Self {
        ParameterValue::Uint64(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int64(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::String(v)
    }
}

impl From<Vec<String>> for ParameterValue {
    fn from(v: Vec<String>) -> Self {
        ParameterValue::ArgList(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_accepts_everything() {
        assert!(ParameterType::Double.accepts(ParameterType::Any));
        assert!(ParameterType::Any.accepts(ParameterType::Bool));
        assert!(ParameterType::Custom(7).accepts(ParameterType::Custom(7)));
        assert!(!ParameterType::Custom(7).accepts(ParameterType::Custom(8)));
        assert!(!ParameterType::Double.accepts(ParameterType::Uint64));
    }

    #[test]
    fn test_value_type() {
        assert_eq!(ParameterValue::from(2.5).parameter_type(), ParameterType::Double);
        assert_eq!(ParameterValue::from("x").parameter_type(), ParameterType::String);
        let custom = ParameterValue::Custom {
            tag: 3,
            bytes: vec![1, 2],
        };
        assert_eq!(custom.parameter_type(), ParameterType::Custom(3));
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(ParameterValue::Int64(7).as_f64(), Some(7.0));
        assert_eq!(ParameterValue::Int64(-1).as_u64(), None);
        assert_eq!(ParameterValue::Uint64(u64::MAX).as_i64(), None);
        assert_eq!(ParameterValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ParameterValue::Int64(7).to_string(), "7");
        assert_eq!(ParameterValue::from("gain").to_string(), "\"gain\"");
        assert_eq!(ParameterType::Custom(2).to_string(), "custom(2)");
    }
}

use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;

use crate::error::SqlwError;

/// Declared type of a query parameter or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// UTF-8 text, carried as a JSON string
    Text,
    /// 64-bit signed integer, carried as a JSON integer
    Integer,
    /// Boolean, stored by the engine as 0/1
    Boolean,
    /// Byte sequence, carried as a JSON string
    Blob,
    /// 64-bit float, carried as a JSON floating point number
    Double,
}

impl Kind {
    /// The spelling used in configuration files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Text => "text",
            Kind::Integer => "int",
            Kind::Boolean => "bool",
            Kind::Blob => "blob",
            Kind::Double => "double",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = SqlwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Kind::Text),
            "int" => Ok(Kind::Integer),
            "bool" => Ok(Kind::Boolean),
            "blob" => Ok(Kind::Blob),
            "double" | "float" => Ok(Kind::Double),
            other => Err(SqlwError::ConfigError(format!("Unknown type: {other}"))),
        }
    }
}

/// Payload of a [`TypedValue`]. The variant is the kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Blob(Vec<u8>),
    Double(f64),
}

impl Value {
    /// Zero value for a kind: empty text/blob, 0, false, 0.0.
    #[must_use]
    pub fn zero(kind: Kind) -> Self {
        match kind {
            Kind::Text => Value::Text(String::new()),
            Kind::Integer => Value::Integer(0),
            Kind::Boolean => Value::Boolean(false),
            Kind::Blob => Value::Blob(Vec::new()),
            Kind::Double => Value::Double(0.0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Value::Text(_) => Kind::Text,
            Value::Integer(_) => Kind::Integer,
            Value::Boolean(_) => Kind::Boolean,
            Value::Blob(_) => Kind::Blob,
            Value::Double(_) => Kind::Double,
        }
    }
}

/// A named, typed slot: one declared parameter or one declared column of a query.
///
/// The kind is fixed at construction. Every write goes through a check against
/// it, so the payload variant can never drift from the declared kind:
/// ```rust
/// use sqlw::prelude::*;
///
/// let mut id = TypedValue::new("identifier", Kind::Integer);
/// assert!(id.set(Value::Integer(7)).is_ok());
/// assert!(id.set(Value::Double(7.0)).is_err());
/// assert_eq!(id.as_int(), Some(7));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    name: String,
    value: Value,
}

impl TypedValue {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            value: Value::zero(kind),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Overwrite the payload.
    ///
    /// # Errors
    /// Returns [`SqlwError::KindMismatch`] if `value` is not of the declared kind; the
    /// payload is left unchanged.
    pub fn set(&mut self, value: Value) -> Result<(), SqlwError> {
        if value.kind() != self.kind() {
            return Err(SqlwError::KindMismatch {
                name: self.name.clone(),
                expected: self.kind(),
                found: value.kind(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Text payload. Blob payloads are not text and return `None`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = &self.value {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Integer(value) = self.value {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Boolean(value) = self.value {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = &self.value {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        if let Value::Double(value) = self.value {
            Some(value)
        } else {
            None
        }
    }

    /// Encode the payload as an untyped JSON value.
    ///
    /// Blobs are emitted as strings (lossy for bytes that are not UTF-8), and a
    /// non-finite double has no JSON form and becomes `null`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match &self.value {
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Blob(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::Double(f) => JsonValue::from(*f),
        }
    }

    /// Decode `json` into the payload.
    ///
    /// The JSON type must match the kind exactly: integers are not accepted for
    /// doubles, floats are not accepted for integers, and nothing is stringified.
    /// Returns `false` and leaves the payload untouched on a mismatch.
    pub fn from_json(&mut self, json: &JsonValue) -> bool {
        let decoded = match (self.kind(), json) {
            (Kind::Text, JsonValue::String(s)) => Value::Text(s.clone()),
            (Kind::Integer, JsonValue::Number(n)) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => return false,
            },
            (Kind::Boolean, JsonValue::Bool(b)) => Value::Boolean(*b),
            (Kind::Blob, JsonValue::String(s)) => Value::Blob(s.as_bytes().to_vec()),
            (Kind::Double, JsonValue::Number(n)) if n.is_f64() => match n.as_f64() {
                Some(f) => Value::Double(f),
                None => return false,
            },
            _ => return false,
        };
        self.value = decoded;
        true
    }

    /// Replace the payload without a kind check. Callers guarantee the kind.
    pub(crate) fn overwrite(&mut self, value: Value) {
        debug_assert_eq!(value.kind(), self.kind());
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_parses_config_spellings() {
        assert_eq!("text".parse::<Kind>().unwrap(), Kind::Text);
        assert_eq!("int".parse::<Kind>().unwrap(), Kind::Integer);
        assert_eq!("bool".parse::<Kind>().unwrap(), Kind::Boolean);
        assert_eq!("blob".parse::<Kind>().unwrap(), Kind::Blob);
        assert_eq!("double".parse::<Kind>().unwrap(), Kind::Double);
        assert_eq!("float".parse::<Kind>().unwrap(), Kind::Double);
        assert!(matches!(
            "varchar".parse::<Kind>(),
            Err(SqlwError::ConfigError(_))
        ));
    }

    #[test]
    fn json_round_trips_per_kind() {
        let cases = [
            (Kind::Text, json!("hello")),
            (Kind::Integer, json!(-3_428_975_i64)),
            (Kind::Boolean, json!(true)),
            (Kind::Double, json!(2.5)),
            (Kind::Blob, json!("raw bytes")),
        ];
        for (kind, input) in cases {
            let mut value = TypedValue::new("v", kind);
            assert!(value.from_json(&input), "{kind} should accept {input}");
            assert_eq!(value.to_json(), input);
        }
    }

    #[test]
    fn from_json_rejects_other_types_and_keeps_payload() {
        let mut id = TypedValue::new("identifier", Kind::Integer);
        assert!(id.from_json(&json!(41)));
        assert!(!id.from_json(&json!(41.5)));
        assert!(!id.from_json(&json!("41")));
        assert!(!id.from_json(&json!(null)));
        assert_eq!(id.as_int(), Some(41));

        let mut ratio = TypedValue::new("ratio", Kind::Double);
        assert!(!ratio.from_json(&json!(3)));
        assert_eq!(ratio.as_double(), Some(0.0));

        let mut flag = TypedValue::new("flag", Kind::Boolean);
        assert!(!flag.from_json(&json!(1)));

        let mut name = TypedValue::new("name", Kind::Text);
        assert!(!name.from_json(&json!(["a"])));
        assert_eq!(name.as_text(), Some(""));
    }

    #[test]
    fn integer_outside_i64_is_rejected() {
        let mut id = TypedValue::new("identifier", Kind::Integer);
        assert!(!id.from_json(&json!(u64::MAX)));
    }

    #[test]
    fn wrong_variant_access_is_loud() {
        let mut blob = TypedValue::new("payload", Kind::Blob);
        assert_eq!(blob.as_text(), None);
        assert_eq!(blob.as_blob(), Some(&[][..]));
        let err = blob.set(Value::Text("x".into())).unwrap_err();
        assert!(matches!(
            err,
            SqlwError::KindMismatch {
                expected: Kind::Blob,
                found: Kind::Text,
                ..
            }
        ));
    }
}

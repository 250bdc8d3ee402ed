use rusqlite::types::ValueRef;
use rusqlite::{Row, Statement};

use crate::error::SqlwError;
use crate::types::{Kind, TypedValue, Value};

impl TypedValue {
    /// Bind the payload into the 1-based parameter slot `index` of `stmt`.
    ///
    /// Text and blob payloads are bound by reference; the engine copies them
    /// before the call returns. Doubles go through the real-valued bind, never
    /// the integer one.
    ///
    /// # Errors
    /// Returns the engine error if the slot does not exist or the bind is refused.
    pub fn bind_to(&self, stmt: &mut Statement<'_>, index: usize) -> Result<(), SqlwError> {
        match self.value() {
            Value::Text(s) => stmt.raw_bind_parameter(index, s.as_str())?,
            Value::Integer(i) => stmt.raw_bind_parameter(index, *i)?,
            Value::Boolean(b) => stmt.raw_bind_parameter(index, i64::from(*b))?,
            Value::Blob(bytes) => stmt.raw_bind_parameter(index, bytes.as_slice())?,
            Value::Double(f) => stmt.raw_bind_parameter(index, *f)?,
        }
        Ok(())
    }

    /// Overwrite the payload from the 0-based column `index` of `row`.
    ///
    /// NULL reads as the zero value of the kind, so text and blob columns do not
    /// distinguish NULL from empty. Integers widen into doubles; any other
    /// storage class that does not fit the kind is an error.
    ///
    /// # Errors
    /// Returns `SqlwError::ExecutionError` naming the column on a storage class
    /// mismatch, or the engine error if the column index is out of range.
    pub fn read_from(&mut self, row: &Row<'_>, index: usize) -> Result<(), SqlwError> {
        let raw = row.get_ref(index)?;
        let value = match (self.kind(), raw) {
            (kind, ValueRef::Null) => Value::zero(kind),
            (Kind::Text, ValueRef::Text(bytes) | ValueRef::Blob(bytes)) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            (Kind::Text, ValueRef::Integer(i)) => Value::Text(i.to_string()),
            (Kind::Text, ValueRef::Real(f)) => Value::Text(f.to_string()),
            (Kind::Integer, ValueRef::Integer(i)) => Value::Integer(i),
            (Kind::Boolean, ValueRef::Integer(i)) => Value::Boolean(i != 0),
            (Kind::Blob, ValueRef::Blob(bytes) | ValueRef::Text(bytes)) => Value::Blob(bytes.to_vec()),
            (Kind::Double, ValueRef::Real(f)) => Value::Double(f),
            (Kind::Double, ValueRef::Integer(i)) => Value::Double(i as f64),
            (kind, other) => {
                return Err(SqlwError::ExecutionError(format!(
                    "column `{}` is declared {kind} but the row holds {:?}",
                    self.name(),
                    other.data_type()
                )));
            }
        };
        self.overwrite(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn read_one(sql: &str, kind: Kind) -> Result<TypedValue, SqlwError> {
        let conn = Connection::open_in_memory()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.raw_query();
        let row = rows
            .next()?
            .ok_or_else(|| SqlwError::ExecutionError("no row".into()))?;
        let mut value = TypedValue::new("c", kind);
        value.read_from(row, 0)?;
        Ok(value)
    }

    #[test]
    fn null_reads_as_empty_for_text_and_blob() {
        let text = read_one("SELECT NULL", Kind::Text).unwrap();
        assert_eq!(text.as_text(), Some(""));
        let blob = read_one("SELECT NULL", Kind::Blob).unwrap();
        assert_eq!(blob.as_blob(), Some(&[][..]));
    }

    #[test]
    fn double_keeps_fraction() {
        let value = read_one("SELECT 2.75", Kind::Double).unwrap();
        assert_eq!(value.as_double(), Some(2.75));
        let widened = read_one("SELECT 3", Kind::Double).unwrap();
        assert_eq!(widened.as_double(), Some(3.0));
    }

    #[test]
    fn real_into_integer_column_is_an_error() {
        let err = read_one("SELECT 1.5", Kind::Integer).unwrap_err();
        assert!(matches!(err, SqlwError::ExecutionError(msg) if msg.contains("`c`")));
    }

    #[test]
    fn bind_then_read_back_each_kind() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1, ?2, ?3, ?4, ?5").unwrap();

        let mut params = vec![
            TypedValue::new("t", Kind::Text),
            TypedValue::new("i", Kind::Integer),
            TypedValue::new("b", Kind::Boolean),
            TypedValue::new("x", Kind::Blob),
            TypedValue::new("d", Kind::Double),
        ];
        params[0].set(Value::Text("tester".into())).unwrap();
        params[1].set(Value::Integer(3_428_975)).unwrap();
        params[2].set(Value::Boolean(true)).unwrap();
        params[3].set(Value::Blob(b"\x01\x02".to_vec())).unwrap();
        params[4].set(Value::Double(0.125)).unwrap();
        for (i, p) in params.iter().enumerate() {
            p.bind_to(&mut stmt, i + 1).unwrap();
        }

        let mut columns = params.clone();
        for c in &mut columns {
            c.overwrite(Value::zero(c.kind()));
        }
        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        for (i, c) in columns.iter_mut().enumerate() {
            c.read_from(row, i).unwrap();
        }
        assert_eq!(columns, params);
    }

    #[test]
    fn binding_past_the_last_slot_fails() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1").unwrap();
        let value = TypedValue::new("extra", Kind::Integer);
        assert!(value.bind_to(&mut stmt, 2).is_err());
    }
}

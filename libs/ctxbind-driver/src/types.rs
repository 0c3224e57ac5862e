//! Values and result sets exchanged with drivers.

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// This value read as `sql_type`, or `None` when it has no such reading.
    /// `NULL` reads as every type.
    #[must_use]
    pub fn convert(&self, sql_type: SqlType) -> Option<Self> {
        match (sql_type, self) {
            (_, Self::Null)
            | (SqlType::Other, _)
            | (SqlType::Boolean, Self::Bool(_))
            | (SqlType::BigInt, Self::Int(_))
            | (SqlType::Double, Self::Float(_))
            | (SqlType::Text, Self::Text(_))
            | (SqlType::Bytes, Self::Bytes(_)) => Some(self.clone()),
            (SqlType::Boolean, Self::Int(v)) => Some(Self::Bool(*v != 0)),
            (SqlType::Boolean, Self::Text(v)) => parse_bool(v).map(Self::Bool),
            (SqlType::Integer, Self::Int(v)) => i32::try_from(*v).ok().map(Self::from),
            (SqlType::Integer, Self::Text(v)) => v.trim().parse::<i32>().ok().map(Self::from),
            (SqlType::Integer | SqlType::BigInt, Self::Bool(v)) => Some(Self::Int(i64::from(*v))),
            (SqlType::BigInt, Self::Text(v)) => v.trim().parse().ok().map(Self::Int),
            (SqlType::Double, Self::Int(v)) => v.to_string().parse().ok().map(Self::Float),
            (SqlType::Double, Self::Text(v)) => v.trim().parse().ok().map(Self::Float),
            (SqlType::Text, Self::Bytes(v)) => String::from_utf8(v.clone()).ok().map(Self::Text),
            (SqlType::Text, _) => Some(Self::Text(self.to_string())),
            (SqlType::Bytes, Self::Text(v)) => Some(Self::Bytes(v.clone().into_bytes())),
            _ => None,
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" => Some(true),
        "f" | "false" | "0" => Some(false),
        _ => None,
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Declared type of an OUT parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    Double,
    Text,
    Bytes,
    Other,
}

/// Which generated keys an insert should make available.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GeneratedKeys {
    #[default]
    None,
    /// Every generated column.
    All,
    /// Generated columns by 1-based position.
    Indexes(Vec<usize>),
    /// Generated columns by name.
    Names(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Driver-specific type name, e.g. `INT4`.
    pub type_name: String,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A fully materialized query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    #[must_use]
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column named `name` (case-insensitive).
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value at `row` in the column named `name`.
    #[must_use]
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row)?.get(col)
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn result_set_lookup_by_column_name() {
        let rs = ResultSet::new(
            vec![Column::new("id", "INT8"), Column::new("Name", "TEXT")],
            vec![
                vec![Value::Int(1), Value::from("alpha")],
                vec![Value::Int(2), Value::Null],
            ],
        );

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.get(0, "name"), Some(&Value::Text("alpha".to_owned())));
        assert_eq!(rs.get(1, "ID").and_then(Value::as_i64), Some(2));
        assert!(rs.get(1, "name").is_some_and(Value::is_null));
        assert!(rs.get(2, "id").is_none());
        assert!(rs.get(0, "missing").is_none());
    }

    #[test]
    fn values_read_as_registered_types() {
        assert_eq!(Value::Int(7).convert(SqlType::Text), Some(Value::from("7")));
        assert_eq!(Value::from("42").convert(SqlType::BigInt), Some(Value::Int(42)));
        assert_eq!(Value::from("t").convert(SqlType::Boolean), Some(Value::Bool(true)));
        assert_eq!(Value::Int(3).convert(SqlType::Double), Some(Value::Float(3.0)));
        assert_eq!(Value::Null.convert(SqlType::Integer), Some(Value::Null));
        assert_eq!(Value::Int(i64::MAX).convert(SqlType::Integer), None);
        assert_eq!(Value::from("abc").convert(SqlType::BigInt), None);
        assert_eq!(Value::Float(1.5).convert(SqlType::Bytes), None);
    }

    #[test]
    fn optional_values_convert_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_owned()));
    }
}

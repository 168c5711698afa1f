use std::{
    fmt::{self, Display, Formatter},
    ops::Range,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{Record, Value};

#[derive(Error, Debug)]
pub(crate) enum SchemaError {
    #[error("the schema has no columns")]
    Empty,
    #[error("column `{0}` is declared more than once")]
    DuplicateColumn(String),
    #[error("column `{0}` is not part of the schema")]
    UnknownColumn(String),
    #[error("record is missing column `{0}`")]
    MissingColumn(String),
    #[error("column type `{0}` is not supported")]
    UnsupportedType(String),
    #[error("column `{column}` expects {expected}, found {found}")]
    TypeMismatched {
        column: String,
        expected: ColumnType,
        found: &'static str,
    },
    #[error("value of `{column}` has {len} bytes, the column holds {width}")]
    TooLarge {
        column: String,
        width: usize,
        len: usize,
    },
}

/// The type of a column, which fixes its width in the record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// 4-byte signed integer.
    Int,
    /// 8-byte floating point number.
    Float,
    /// 1-byte boolean.
    Boolean,
    /// 8-byte signed epoch.
    Date,
    /// Zero-padded UTF-8 string of a fixed number of bytes.
    Varchar(u32),
}

impl ColumnType {
    /// The number of bytes a value of this type occupies in a record.
    #[inline]
    pub fn width(&self) -> usize {
        match self {
            Self::Int => 4,
            Self::Float | Self::Date => 8,
            Self::Boolean => 1,
            Self::Varchar(n) => *n as usize,
        }
    }

    /// The byte pattern that marks a logically deleted key of this type.
    pub(crate) fn tombstone(&self) -> Vec<u8> {
        match self {
            Self::Int => i32::MIN.to_le_bytes().to_vec(),
            Self::Date => i64::MIN.to_le_bytes().to_vec(),
            Self::Float => 0x7FF8_DEAD_BEEF_0001u64.to_le_bytes().to_vec(),
            Self::Boolean => vec![0xFF],
            Self::Varchar(n) => vec![0xFF; *n as usize],
        }
    }

    #[inline]
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Varchar(_) => "VARCHAR",
        }
    }
}

impl Display for ColumnType {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Varchar(n) => write!(f, "VARCHAR({n})"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for ColumnType {
    type Err = crate::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).map_err(Into::into)
    }
}

impl ColumnType {
    fn parse(s: &str) -> Result<Self, SchemaError> {
        let unsupported = || SchemaError::UnsupportedType(s.to_owned());
        let upper = s.trim().to_ascii_uppercase();

        let ty = match upper.as_str() {
            "INT" => Self::Int,
            "FLOAT" => Self::Float,
            "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            other => {
                let len = other
                    .strip_prefix("VARCHAR(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|len| len.trim().parse::<u32>().ok())
                    .filter(|len| *len > 0)
                    .ok_or_else(unsupported)?;
                Self::Varchar(len)
            }
        };
        Ok(ty)
    }
}

impl TryFrom<String> for ColumnType {
    type Error = crate::Error;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    #[inline]
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}

/// A named column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl Column {
    #[inline]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Creates a column from a type name such as `INT` or `VARCHAR(20)`.
    #[inline]
    pub fn parse(name: impl Into<String>, ty: &str) -> crate::Result<Self> {
        Ok(Self::new(name, ty.parse()?))
    }
}

/// Where a column lives inside a serialized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub width: usize,
}

impl Field {
    #[inline]
    pub(crate) fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// An ordered list of columns with one of them designated as primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    layout: Vec<Field>,
    primary_key: usize,
}

impl Schema {
    pub(crate) fn new(columns: Vec<Column>, primary_key: &str) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        let primary_key = columns
            .iter()
            .position(|c| c.name == primary_key)
            .ok_or_else(|| SchemaError::UnknownColumn(primary_key.to_owned()))?;

        let mut offset = 0;
        let layout = columns
            .iter()
            .map(|c| {
                let field = Field {
                    name: c.name.clone(),
                    offset,
                    width: c.ty.width(),
                };
                offset += field.width;
                field
            })
            .collect();

        Ok(Self {
            columns,
            layout,
            primary_key,
        })
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The byte layout of a serialized record, in column order.
    #[inline]
    pub fn layout(&self) -> &[Field] {
        &self.layout
    }

    #[inline]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[inline]
    pub fn primary_key(&self) -> &Column {
        &self.columns[self.primary_key]
    }

    #[inline]
    pub(crate) fn key_type(&self) -> ColumnType {
        self.primary_key().ty
    }

    #[inline]
    pub fn key_offset(&self) -> usize {
        self.layout[self.primary_key].offset
    }

    #[inline]
    pub fn key_width(&self) -> usize {
        self.layout[self.primary_key].width
    }

    #[inline]
    pub(crate) fn key_range(&self) -> Range<usize> {
        self.layout[self.primary_key].range()
    }

    /// The size in bytes of every serialized record.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.layout.iter().map(|f| f.width).sum()
    }

    /// Checks a value against a column and coerces it to the column type.
    ///
    /// Trailing NUL characters are dropped from VARCHAR values, since the zero padding
    /// of the column cannot tell them apart.
    pub(crate) fn coerce(&self, column: &Column, value: &Value) -> Result<Value, SchemaError> {
        let value = match (column.ty, value) {
            (ColumnType::Int, Value::Int(_))
            | (ColumnType::Float, Value::Float(_))
            | (ColumnType::Boolean, Value::Boolean(_))
            | (ColumnType::Date, Value::Date(_)) => value.clone(),
            (ColumnType::Varchar(_), Value::Varchar(s)) => {
                Value::Varchar(s.trim_end_matches('\0').to_owned())
            }
            (ColumnType::Float, Value::Int(v)) => Value::Float(*v as f64),
            (ColumnType::Date, Value::Int(v)) => Value::Date(*v as i64),
            (ty, found) => {
                return Err(SchemaError::TypeMismatched {
                    column: column.name.clone(),
                    expected: ty,
                    found: found.type_name(),
                })
            }
        };
        Ok(value)
    }

    /// Coerces a value to the type of the named column.
    #[inline]
    pub(crate) fn coerce_to(&self, name: &str, value: &Value) -> Result<Value, SchemaError> {
        let column = self
            .column(name)
            .ok_or_else(|| SchemaError::UnknownColumn(name.to_owned()))?;
        self.coerce(column, value)
    }

    /// Reorders a record into column order, checking every value on the way.
    pub(crate) fn normalize(&self, record: &Record) -> Result<Record, SchemaError> {
        if let Some((name, _)) = record.iter().find(|(name, _)| self.column(name).is_none()) {
            return Err(SchemaError::UnknownColumn(name.to_string()));
        }

        self.columns
            .iter()
            .map(|column| {
                let value = record
                    .get(&column.name)
                    .ok_or_else(|| SchemaError::MissingColumn(column.name.clone()))?;
                Ok((column.name.clone(), self.coerce(column, value)?))
            })
            .collect()
    }
}

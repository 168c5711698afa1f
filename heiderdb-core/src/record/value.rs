use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

use serde::{Deserialize, Serialize};

/// A typed column value.
///
/// Values have a total order: floats compare with [`f64::total_cmp`] and values
/// of different variants order by variant. Every index compares keys with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f64),
    Boolean(bool),
    Date(i64),
    Varchar(String),
}

impl Value {
    #[inline]
    fn rank(&self) -> u8 {
        match self {
            Self::Int(_) => 0,
            Self::Float(_) => 1,
            Self::Boolean(_) => 2,
            Self::Date(_) => 3,
            Self::Varchar(_) => 4,
        }
    }

    #[inline]
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "INT",
            Self::Float(_) => "FLOAT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Date(_) => "DATE",
            Self::Varchar(_) => "VARCHAR",
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Varchar(v) => Some(v),
            _ => None,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Varchar(a), Self::Varchar(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Value {}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Varchar(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Date(value)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Varchar(value.to_owned())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Self::Varchar(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn test_total_order() {
        assert!(Value::Int(-1) < Value::Int(3));
        assert!(Value::Float(f64::NEG_INFINITY) < Value::Float(-0.5));
        assert!(Value::Float(1.0) < Value::Float(f64::NAN));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert!(Value::Varchar("abc".into()) < Value::Varchar("abd".into()));
        assert!(Value::Boolean(false) < Value::Boolean(true));
        // Different variants order by variant.
        assert!(Value::Int(i32::MAX) < Value::Float(f64::MIN));

        let mut values = vec![Value::Int(7), Value::Int(-2), Value::Int(5)];
        values.sort();
        assert_eq!(values, [Value::Int(-2), Value::Int(5), Value::Int(7)]);
    }
}

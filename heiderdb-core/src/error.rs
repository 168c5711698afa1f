use std::{
    fmt::{Display, Formatter},
    io,
};

use crate::{index, medium, meta, schema, storage, table};

/// A `Result` type that all API calls in HeiderDB will return.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error cases that can be return by API calls in HeiderDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An error occured during an I/O operation.
    IO,
    /// A record with the same primary key already exists.
    DuplicateKey,
    /// A record lacks a column of the schema.
    MissingColumn,
    /// A column type name is not recognized.
    UnsupportedColumnType,
    /// A VARCHAR value is longer than its column allows (strict mode only).
    RecordTooLarge,
    /// The key to delete is not present.
    KeyNotFound,
    /// An index page failed validation.
    CorruptPage,
    /// The input (e.g., column, value, page size) is invalid.
    InputInvalid,
    /// A metadata file is missing, malformed or of another version.
    FileUnexpected,
}

#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl Display for ErrorCode {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::IO => "IO error",
            Self::DuplicateKey => "duplicate primary key",
            Self::MissingColumn => "missing column",
            Self::UnsupportedColumnType => "unsupported column type",
            Self::RecordTooLarge => "record too large",
            Self::KeyNotFound => "key not found",
            Self::CorruptPage => "index page is corrupted",
            Self::InputInvalid => "invalid input argument",
            Self::FileUnexpected => "unexpected metadata file",
        })
    }
}

impl Error {
    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[inline]
    fn new<E>(code: ErrorCode, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code,
            source: Box::new(source),
        }
    }
}

impl Display for Error {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.source)
    }
}

impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(value: io::Error) -> Self {
        Self::new(ErrorCode::IO, value)
    }
}

impl From<medium::file::Error> for Error {
    #[inline]
    fn from(value: medium::file::Error) -> Self {
        Self::new(ErrorCode::IO, value)
    }
}

impl From<medium::bytes::Error> for Error {
    #[inline]
    fn from(value: medium::bytes::Error) -> Self {
        Self::new(ErrorCode::CorruptPage, value)
    }
}

impl From<storage::PageError> for Error {
    #[inline]
    fn from(value: storage::PageError) -> Self {
        Self::new(ErrorCode::CorruptPage, value)
    }
}

impl From<schema::SchemaError> for Error {
    #[inline]
    fn from(value: schema::SchemaError) -> Self {
        use schema::SchemaError::*;

        let code = match &value {
            MissingColumn(_) => ErrorCode::MissingColumn,
            UnsupportedType(_) => ErrorCode::UnsupportedColumnType,
            TooLarge { .. } => ErrorCode::RecordTooLarge,
            UnknownColumn(_) | TypeMismatched { .. } | Empty | DuplicateColumn(_) => {
                ErrorCode::InputInvalid
            }
        };
        Self::new(code, value)
    }
}

impl From<index::KeyError> for Error {
    #[inline]
    fn from(value: index::KeyError) -> Self {
        let code = match &value {
            index::KeyError::Duplicate(_) => ErrorCode::DuplicateKey,
            index::KeyError::NotFound(_) => ErrorCode::KeyNotFound,
            index::KeyError::Reserved(_) => ErrorCode::InputInvalid,
        };
        Self::new(code, value)
    }
}

impl From<table::InputInvalid> for Error {
    #[inline]
    fn from(value: table::InputInvalid) -> Self {
        Self::new(ErrorCode::InputInvalid, value)
    }
}

impl From<meta::ValidationError> for Error {
    #[inline]
    fn from(value: meta::ValidationError) -> Self {
        Self::new(ErrorCode::FileUnexpected, value)
    }
}

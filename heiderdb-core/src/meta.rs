use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{error::Result, medium::File};

/// The current format version of every HeiderDB metadata file.
pub(crate) const VERSION: u32 = 1;

#[derive(Error, Debug)]
pub(crate) enum ValidationError {
    #[error("the metadata file {0:?} does not exist")]
    Missing(PathBuf),
    #[error("the metadata file {path:?} is invalid: {source}")]
    FileInvalid {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("the metadata file {path:?} has version {found:?}, expected {VERSION}")]
    VersionMismatched { path: PathBuf, found: Option<u64> },
    #[error("the metadata file {path:?} is inconsistent: {reason}")]
    Inconsistent { path: PathBuf, reason: &'static str },
}

/// Loads a JSON side-file, checking its `version` field first.
pub(crate) fn load<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ValidationError::Missing(path.to_owned()).into());
    }

    let mut file = File::open(path)?;
    let mut bytes = vec![0; file.len() as usize];
    file.read_at(0, &mut bytes)?;

    let invalid = |source| ValidationError::FileInvalid {
        path: path.to_owned(),
        source,
    };
    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(invalid)?;

    let found = value.get("version").and_then(|v| v.as_u64());
    if found != Some(VERSION as u64) {
        return Err(ValidationError::VersionMismatched {
            path: path.to_owned(),
            found,
        }
        .into());
    }

    serde_json::from_value(value).map_err(|e| invalid(e).into())
}

/// Replaces a JSON side-file with the serialized metadata.
pub(crate) fn save<T>(path: impl AsRef<Path>, meta: &T, force_sync: bool) -> Result<()>
where
    T: Serialize,
{
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(meta).map_err(|source| ValidationError::FileInvalid {
        path: path.to_owned(),
        source,
    })?;

    let mut file = File::create(path)?;
    file.append(&bytes)?;
    if force_sync {
        file.sync()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{load, save, VERSION};
    use crate::{error::Result, ErrorCode};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        root: u32,
        names: Vec<String>,
        version: u32,
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.json");

        let sample = Sample {
            root: 3,
            names: vec!["a".into(), "b".into()],
            version: VERSION,
        };
        save(&path, &sample, false)?;
        assert_eq!(load::<Sample>(&path)?, sample);

        // Saving replaces the previous content entirely.
        let smaller = Sample {
            root: 1,
            names: vec![],
            version: VERSION,
        };
        save(&path, &smaller, true)?;
        assert_eq!(load::<Sample>(&path)?, smaller);

        Ok(())
    }

    #[test]
    fn test_validation() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let err = load::<Sample>(dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileUnexpected);

        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json")?;
        assert_eq!(load::<Sample>(&path).unwrap_err().code(), ErrorCode::FileUnexpected);

        std::fs::write(&path, br#"{"root": 1, "names": [], "version": 99}"#)?;
        assert_eq!(load::<Sample>(&path).unwrap_err().code(), ErrorCode::FileUnexpected);

        std::fs::write(&path, br#"{"root": "x", "names": [], "version": 1}"#)?;
        assert_eq!(load::<Sample>(&path).unwrap_err().code(), ErrorCode::FileUnexpected);

        Ok(())
    }
}

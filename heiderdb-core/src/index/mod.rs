//! The primary index contract and the pieces every index kind shares.

use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    bptree::BPTree,
    error::Result,
    hash::ExtendibleHash,
    isam::IsamSparse,
    medium::DataFile,
    record::{self, Record, Value},
    schema::{ColumnType, Schema},
    sequential::SequentialFile,
    table::Options,
};

#[derive(Error, Debug)]
pub(crate) enum KeyError {
    #[error("key {0} already exists")]
    Duplicate(Value),
    #[error("key {0} does not exist")]
    NotFound(Value),
    #[error("key {0} is reserved as the deletion marker")]
    Reserved(Value),
}

/// The structure used as the primary index of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Paged B+ tree, the best choice for point and range queries.
    #[serde(rename = "bplus_tree")]
    BPlusTree,
    /// Directory and bucket hashing, fast point queries but range queries scan.
    ExtendibleHash,
    /// Sorted main area with overflow chains, periodically rebuilt.
    SequentialFile,
    /// Two-level sparse directory over sorted data pages.
    IsamSparse,
}

impl Display for IndexKind {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BPlusTree => "B+ tree",
            Self::ExtendibleHash => "extendible hash",
            Self::SequentialFile => "sequential file",
            Self::IsamSparse => "sparse ISAM",
        })
    }
}

/// A diagnostic snapshot of an index structure.
///
/// Fields that do not apply to an index kind are left at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub kind: IndexKind,
    /// Number of live entries.
    pub entries: usize,
    /// B+ tree order, bucket or data page capacity, or the main area slots of a sequential file.
    pub capacity: usize,
    pub height: usize,
    pub global_depth: u32,
    pub directory_size: usize,
    pub overflow_count: usize,
    pub tombstones: usize,
    pub page_count: u32,
    pub free_pages: usize,
}

impl IndexStats {
    #[inline]
    pub(crate) fn new(kind: IndexKind, entries: usize) -> Self {
        Self {
            kind,
            entries,
            capacity: 0,
            height: 0,
            global_depth: 0,
            directory_size: 0,
            overflow_count: 0,
            tombstones: 0,
            page_count: 0,
            free_pages: 0,
        }
    }
}

/// The capabilities every primary index provides.
///
/// Keys handed to an index are already coerced to the primary key type, and
/// records handed to [`Index::add`] are already serialized.
pub(crate) trait Index {
    fn kind(&self) -> IndexKind;

    /// Looks up the record with the given key.
    fn search(&self, key: &Value) -> Result<Option<Record>>;

    /// Returns the records whose keys fall within `begin..=end`, in ascending key order.
    /// An absent `end` leaves the range open.
    fn range_search(&self, begin: &Value, end: Option<&Value>) -> Result<Vec<Record>>;

    /// Appends the record to the data file and indexes it under `key`.
    fn add(&mut self, record: &[u8], key: &Value) -> Result<()>;

    fn remove(&mut self, key: &Value) -> Result<bool>;

    /// Reorganizes the on-disk structure from its live entries.
    fn rebuild(&mut self) -> Result<()>;

    fn get_all(&self) -> Result<Vec<Record>>;

    fn count(&self) -> usize;

    fn stats(&self) -> Result<IndexStats>;

    /// Writes a human readable picture of the structure.
    fn dump(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.stats() {
            Ok(stats) => writeln!(f, "{stats:#?}"),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Everything an index needs to know about the table it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub(crate) schema: Arc<Schema>,
    pub(crate) data: DataFile,
    pub(crate) dir: PathBuf,
    pub(crate) table: String,
    pub(crate) page_size: u32,
    pub(crate) options: Options,
}

impl Context {
    /// The path of an index file, named `‹table›_‹primary key›_‹suffix›`.
    #[inline]
    pub(crate) fn index_path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}",
            self.table,
            self.schema.primary_key().name,
            suffix
        ))
    }

    #[inline]
    pub(crate) fn key_type(&self) -> ColumnType {
        self.schema.key_type()
    }

    #[inline]
    pub(crate) fn key_width(&self) -> usize {
        self.schema.key_width()
    }

    #[inline]
    pub(crate) fn record_size(&self) -> usize {
        self.schema.record_size()
    }

    /// Extracts the key of a serialized record.
    #[inline]
    pub(crate) fn record_key(&self, bytes: &[u8]) -> Value {
        record::decode_key(self.key_type(), &bytes[self.schema.key_range()])
    }

    #[inline]
    pub(crate) fn read_record(&self, pos: u64) -> Result<Record> {
        let bytes = self.data.read(pos)?;
        Ok(record::decode(&self.schema, &bytes))
    }

    pub(crate) fn read_records<I>(&self, positions: I) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = u64>,
    {
        positions
            .into_iter()
            .map(|pos| self.read_record(pos))
            .collect()
    }
}

/// Whether `key` lies within `begin..=end`.
#[inline]
pub(crate) fn in_range(key: &Value, begin: &Value, end: Option<&Value>) -> bool {
    key >= begin && end.map_or(true, |end| key <= end)
}

/// Creates a fresh index of the given kind, discarding any previous index files.
pub(crate) fn create_index(kind: IndexKind, ctx: Context) -> Result<Box<dyn Index>> {
    Ok(match kind {
        IndexKind::BPlusTree => Box::new(BPTree::create(ctx)?),
        IndexKind::ExtendibleHash => Box::new(ExtendibleHash::create(ctx)?),
        IndexKind::SequentialFile => Box::new(SequentialFile::create(ctx)?),
        IndexKind::IsamSparse => Box::new(IsamSparse::create(ctx)?),
    })
}

/// Opens an existing index from its metadata side-file.
pub(crate) fn load_index(kind: IndexKind, ctx: Context) -> Result<Box<dyn Index>> {
    Ok(match kind {
        IndexKind::BPlusTree => Box::new(BPTree::load(ctx)?),
        IndexKind::ExtendibleHash => Box::new(ExtendibleHash::load(ctx)?),
        IndexKind::SequentialFile => Box::new(SequentialFile::load(ctx)?),
        IndexKind::IsamSparse => Box::new(IsamSparse::load(ctx)?),
    })
}

#[cfg(test)]
mod tests {
    use super::IndexKind;

    #[test]
    fn test_kind_names() {
        let names: Vec<_> = [
            IndexKind::BPlusTree,
            IndexKind::ExtendibleHash,
            IndexKind::SequentialFile,
            IndexKind::IsamSparse,
        ]
        .iter()
        .map(|k| serde_json::to_string(k).unwrap())
        .collect();

        assert_eq!(
            names,
            [
                "\"bplus_tree\"",
                "\"extendible_hash\"",
                "\"sequential_file\"",
                "\"isam_sparse\""
            ]
        );
        assert_eq!(
            serde_json::from_str::<IndexKind>("\"isam_sparse\"").unwrap(),
            IndexKind::IsamSparse
        );
    }
}

/// Shared fixtures for the unit tests of each index kind.
#[cfg(test)]
pub(crate) mod testing {
    use std::{path::Path, sync::Arc};

    use super::Context;
    use crate::{
        medium::DataFile,
        record::{self, Record, Value},
        schema::{Column, ColumnType, Schema},
        table::Options,
    };

    /// A context for an `items` table keyed by `id INT` with a `name VARCHAR(8)` column.
    pub(crate) fn context(dir: &Path, page_size: u32, options: Options) -> Context {
        let schema = Schema::new(
            vec![
                Column::new("id", ColumnType::Int),
                Column::new("name", ColumnType::Varchar(8)),
            ],
            "id",
        )
        .unwrap();
        let data = DataFile::new(dir.join("items.dat"), schema.record_size(), false);
        data.truncate(0).unwrap();

        Context {
            schema: Arc::new(schema),
            data,
            dir: dir.to_owned(),
            table: "items".into(),
            page_size,
            options,
        }
    }

    /// The serialized record and key for `id`.
    pub(crate) fn row(ctx: &Context, id: i32) -> (Vec<u8>, Value) {
        let record = Record::new().with("id", id).with("name", format!("n{id}"));
        let bytes = record::encode(&ctx.schema, &record, false).unwrap();
        (bytes, Value::Int(id))
    }

    pub(crate) fn ids(records: &[Record]) -> Vec<i32> {
        records
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_int))
            .collect()
    }
}

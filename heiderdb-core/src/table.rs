use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::trace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    debugger::Debugger,
    error::Result,
    index::{self, Context, Index, IndexKind, KeyError},
    medium::{self, DataFile},
    meta::{self, ValidationError},
    record::{self, Record, Value},
    schema::{Column, Field, Schema, SchemaError},
    storage::Page,
};

#[derive(Error, Debug)]
pub(crate) enum InputInvalid {
    #[error("page size {page_size} {reason}")]
    PageSize { page_size: u32, reason: &'static str },
    #[error("column `{0}` is not the primary key")]
    NotPrimaryKey(String),
    #[error("table name `{0}` is not usable as a file name")]
    TableName(String),
}

/// The options for configuring a HeiderDB table.
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) page_size: Option<u32>,
    pub(crate) force_sync: bool,
    pub(crate) strict_varchar: bool,
    pub(crate) seq_overflow_ratio: f64,
    pub(crate) seq_tombstone_ratio: f64,
    pub(crate) isam_tombstone_ratio: f64,
    pub(crate) hash_max_depth: u32,
}

impl Options {
    /// Creates a new Options instance with default values.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the size of an index page.
    ///
    /// By default, it is the operating system's memory page size. A table keeps the
    /// page size it was created with.
    #[inline]
    pub fn page_size(&mut self, page_size: Option<u32>) -> &mut Self {
        self.page_size = page_size;
        self
    }

    /// Decide whether to force synchronization at the end of every mutating call.
    ///
    /// If it is false, data is still written through before the call returns, and
    /// the operating system decides when it reaches the disk.
    #[inline]
    pub fn force_sync(&mut self, flag: bool) -> &mut Self {
        self.force_sync = flag;
        self
    }

    /// Decide whether an oversized VARCHAR value is rejected instead of truncated.
    #[inline]
    pub fn strict_varchar(&mut self, flag: bool) -> &mut Self {
        self.strict_varchar = flag;
        self
    }

    /// Set how many overflow entries, relative to the live entries, a sequential
    /// file tolerates before it is rebuilt. By default, it is 0.5.
    #[inline]
    pub fn seq_overflow_ratio(&mut self, ratio: f64) -> &mut Self {
        self.seq_overflow_ratio = ratio;
        self
    }

    /// Set how many tombstones, relative to the live entries, a sequential file
    /// tolerates before it is rebuilt. By default, it is 1/3.
    #[inline]
    pub fn seq_tombstone_ratio(&mut self, ratio: f64) -> &mut Self {
        self.seq_tombstone_ratio = ratio;
        self
    }

    /// Set how many buried records, relative to the live ones, an ISAM index
    /// tolerates before it is rebuilt. By default, it is 0.5.
    #[inline]
    pub fn isam_tombstone_ratio(&mut self, ratio: f64) -> &mut Self {
        self.isam_tombstone_ratio = ratio;
        self
    }

    /// Set the global depth beyond which an extendible hash chains overflow buckets
    /// instead of doubling its directory. By default, it is 10.
    #[inline]
    pub fn hash_max_depth(&mut self, depth: u32) -> &mut Self {
        self.hash_max_depth = depth;
        self
    }

    /// Create a table with the current options, replacing any table of the same name.
    #[inline]
    pub fn create(
        &self,
        dir: impl AsRef<Path>,
        name: &str,
        columns: Vec<Column>,
        primary_key: &str,
        kind: IndexKind,
    ) -> Result<Table> {
        Table::create_with_options(dir, name, columns, primary_key, kind, self.clone())
    }

    /// Load an existing table with the current options.
    #[inline]
    pub fn load(&self, dir: impl AsRef<Path>, name: &str) -> Result<Table> {
        Table::load_with_options(dir, name, self.clone())
    }
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Self {
            page_size: None,
            force_sync: false,
            strict_varchar: false,
            seq_overflow_ratio: 0.5,
            seq_tombstone_ratio: 1.0 / 3.0,
            isam_tombstone_ratio: 0.5,
            hash_max_depth: 10,
        }
    }
}

/// The persisted description of a table, kept in `‹name›.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    name: String,
    columns: Vec<Column>,
    primary_key: String,
    index_kind: IndexKind,
    record_count: usize,
    record_size: usize,
    layout: Vec<Field>,
    page_size: u32,
    version: u32,
}

/// A table of fixed-size records, organized by one primary index.
///
/// Records live in `‹dir›/‹name›.dat`, the table description in `‹dir›/‹name›.json`,
/// and the index in files named after the table and its primary key.
pub struct Table {
    dir: PathBuf,
    schema: Arc<Schema>,
    options: Options,
    meta: TableMeta,
    index: Box<dyn Index>,
}

impl Table {
    /// Create a table with default options and the given page size.
    #[inline]
    pub fn create(
        dir: impl AsRef<Path>,
        name: &str,
        columns: Vec<Column>,
        primary_key: &str,
        page_size: u32,
        kind: IndexKind,
    ) -> Result<Self> {
        Options::new()
            .page_size(Some(page_size))
            .create(dir, name, columns, primary_key, kind)
    }

    /// Load a table with default options, checking that it uses the given page size.
    #[inline]
    pub fn load(dir: impl AsRef<Path>, name: &str, page_size: u32) -> Result<Self> {
        Options::new().page_size(Some(page_size)).load(dir, name)
    }

    pub fn create_with_options(
        dir: impl AsRef<Path>,
        name: &str,
        columns: Vec<Column>,
        primary_key: &str,
        kind: IndexKind,
        options: Options,
    ) -> Result<Self> {
        check_name(name)?;
        let page_size = options
            .page_size
            .unwrap_or_else(|| medium::os_page_size() as u32);
        if page_size as usize <= Page::HEADER_SIZE {
            return Err(InputInvalid::PageSize {
                page_size,
                reason: "leaves no room after the page header",
            }
            .into());
        }

        let schema = Schema::new(columns, primary_key)?;
        let meta = TableMeta {
            name: name.to_owned(),
            columns: schema.columns().to_vec(),
            primary_key: primary_key.to_owned(),
            index_kind: kind,
            record_count: 0,
            record_size: schema.record_size(),
            layout: schema.layout().to_vec(),
            page_size,
            version: meta::VERSION,
        };

        let dir = dir.as_ref().to_owned();
        let schema = Arc::new(schema);
        let ctx = context(&dir, &meta, &schema, &options);
        ctx.data.truncate(0)?;
        let index = index::create_index(kind, ctx)?;

        let table = Self {
            dir,
            schema,
            options,
            meta,
            index,
        };
        table.save_meta()?;
        trace!("created table `{name}` with a {kind} index");
        Ok(table)
    }

    pub fn load_with_options(dir: impl AsRef<Path>, name: &str, options: Options) -> Result<Self> {
        check_name(name)?;
        let dir = dir.as_ref().to_owned();
        let path = dir.join(format!("{name}.json"));
        let meta: TableMeta = meta::load(&path)?;

        if let Some(page_size) = options.page_size {
            if page_size != meta.page_size {
                return Err(InputInvalid::PageSize {
                    page_size,
                    reason: "differs from the page size of the table",
                }
                .into());
            }
        }

        let inconsistent = |reason| ValidationError::Inconsistent {
            path: path.clone(),
            reason,
        };
        let schema = Schema::new(meta.columns.clone(), &meta.primary_key)
            .map_err(|_| inconsistent("the columns do not form a valid schema"))?;
        if schema.record_size() != meta.record_size || schema.layout() != meta.layout {
            return Err(inconsistent("the layout does not match the columns").into());
        }

        let schema = Arc::new(schema);
        let ctx = context(&dir, &meta, &schema, &options);
        let index = index::load_index(meta.index_kind, ctx)?;

        Ok(Self {
            dir,
            schema,
            options,
            meta,
            index,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn index_kind(&self) -> IndexKind {
        self.meta.index_kind
    }

    #[inline]
    pub fn page_size(&self) -> u32 {
        self.meta.page_size
    }

    /// The number of records, as persisted in the table description.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.meta.record_count
    }

    /// The number of live entries in the index.
    #[inline]
    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// Insert a record into the table.
    ///
    /// Columns may come in any order, but every column of the schema must be present.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        let record = self.schema.normalize(record)?;
        let bytes = record::encode(&self.schema, &record, self.options.strict_varchar)?;
        let key = record::decode_key(self.schema.key_type(), &bytes[self.schema.key_range()]);

        trace!("{}: add {key} through the {}", self.meta.name, self.meta.index_kind);
        self.index.add(&bytes, &key)?;

        self.meta.record_count += 1;
        self.save_meta()
    }

    /// Get the record with the given primary key.
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<Record>> {
        let key = self.key(key.into())?;
        trace!("{}: get {key} through the {}", self.meta.name, self.meta.index_kind);
        self.index.search(&key)
    }

    /// Find the records whose column equals the value.
    ///
    /// The primary key is looked up through the index, other columns are scanned.
    pub fn search(&self, column: &str, value: impl Into<Value>) -> Result<Vec<Record>> {
        let value = self.schema.coerce_to(column, &value.into())?;
        if self.is_primary_key(column) {
            return Ok(self.get(value)?.into_iter().collect());
        }

        trace!("{}: scan for {column} = {value}", self.meta.name);
        Ok(self
            .index
            .get_all()?
            .into_iter()
            .filter(|r| r.get(column) == Some(&value))
            .collect())
    }

    /// Find the records whose column lies within `begin..=end`. An absent `end` leaves
    /// the range open.
    ///
    /// Primary key ranges come out in ascending key order from every index but the
    /// extendible hash, which sorts its matches. Other columns are filtered in scan order.
    pub fn range_search(
        &self,
        column: &str,
        begin: impl Into<Value>,
        end: Option<impl Into<Value>>,
    ) -> Result<Vec<Record>> {
        let begin = self.schema.coerce_to(column, &begin.into())?;
        let end = end
            .map(|end| self.schema.coerce_to(column, &end.into()))
            .transpose()?;

        if self.is_primary_key(column) {
            trace!(
                "{}: range {begin}..={} through the {}",
                self.meta.name,
                end.as_ref().map_or("∞".into(), ToString::to_string),
                self.meta.index_kind
            );
            return self.index.range_search(&begin, end.as_ref());
        }

        trace!("{}: scan for a range of {column}", self.meta.name);
        Ok(self
            .index
            .get_all()?
            .into_iter()
            .filter(|r| {
                r.get(column)
                    .map_or(false, |v| index::in_range(v, &begin, end.as_ref()))
            })
            .collect())
    }

    /// Remove the record whose primary key equals the value.
    ///
    /// Only the primary key column is accepted. Returns whether a record was removed.
    pub fn remove(&mut self, column: &str, value: impl Into<Value>) -> Result<bool> {
        if self.schema.column(column).is_none() {
            return Err(SchemaError::UnknownColumn(column.to_owned()).into());
        }
        if !self.is_primary_key(column) {
            return Err(InputInvalid::NotPrimaryKey(column.to_owned()).into());
        }

        let key = self.key(value.into())?;
        trace!("{}: remove {key} through the {}", self.meta.name, self.meta.index_kind);
        if !self.index.remove(&key)? {
            return Ok(false);
        }

        self.meta.record_count -= 1;
        self.save_meta()?;
        Ok(true)
    }

    /// Delete the record with the given primary key, failing if there is none.
    pub fn delete(&mut self, key: impl Into<Value>) -> Result<()> {
        let key = self.key(key.into())?;
        let column = self.schema.primary_key().name.clone();
        if self.remove(&column, key.clone())? {
            Ok(())
        } else {
            Err(KeyError::NotFound(key).into())
        }
    }

    /// Get every record of the table.
    ///
    /// The order follows the index: ascending keys for the B+ tree and the sequential
    /// file, physical order for ISAM, directory order for the extendible hash.
    #[inline]
    pub fn get_all(&self) -> Result<Vec<Record>> {
        self.index.get_all()
    }

    /// Reorganize the index from its live entries.
    pub fn rebuild(&mut self) -> Result<()> {
        trace!("{}: rebuild the {}", self.meta.name, self.meta.index_kind);
        self.index.rebuild()?;
        self.meta.record_count = self.index.count();
        self.save_meta()
    }

    /// Get a debugger for the index of the table.
    #[inline]
    pub fn debugger(&self) -> Debugger {
        Debugger::new(self.index.as_ref())
    }

    #[inline]
    fn is_primary_key(&self, column: &str) -> bool {
        self.schema.primary_key().name == column
    }

    #[inline]
    fn key(&self, value: Value) -> Result<Value> {
        self.schema
            .coerce(self.schema.primary_key(), &value)
            .map_err(Into::into)
    }

    #[inline]
    fn save_meta(&self) -> Result<()> {
        meta::save(
            self.dir.join(format!("{}.json", self.meta.name)),
            &self.meta,
            self.options.force_sync,
        )
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(InputInvalid::TableName(name.to_owned()).into());
    }
    Ok(())
}

fn context(dir: &Path, meta: &TableMeta, schema: &Arc<Schema>, options: &Options) -> Context {
    Context {
        schema: schema.clone(),
        data: DataFile::new(
            dir.join(format!("{}.dat", meta.name)),
            meta.record_size,
            options.force_sync,
        ),
        dir: dir.to_owned(),
        table: meta.name.clone(),
        page_size: meta.page_size,
        options: options.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Options, Table};
    use crate::{
        error::Result,
        index::IndexKind,
        record::{Record, Value},
        schema::{Column, ColumnType},
        ErrorCode,
    };

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("name", ColumnType::Varchar(6)),
            Column::new("price", ColumnType::Float),
        ]
    }

    fn item(id: i32, name: &str, price: f64) -> Record {
        Record::new()
            .with("id", id)
            .with("name", name)
            .with("price", price)
    }

    #[test]
    fn test_create_invalid() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let create = |name: &str, pk: &str, page_size| {
            Table::create(dir.path(), name, columns(), pk, page_size, IndexKind::BPlusTree)
        };

        assert_eq!(create("items", "sku", 4096).err().map(|e| e.code()), Some(ErrorCode::InputInvalid));
        assert_eq!(create("a/b", "id", 4096).err().map(|e| e.code()), Some(ErrorCode::InputInvalid));
        assert_eq!(create("items", "id", 20).err().map(|e| e.code()), Some(ErrorCode::InputInvalid));

        let empty = Table::create(dir.path(), "empty", vec![], "id", 4096, IndexKind::IsamSparse);
        assert_eq!(empty.err().map(|e| e.code()), Some(ErrorCode::InputInvalid));

        // A page that cannot hold one `(key, position)` entry is refused by every index.
        let wide = vec![Column::new("id", ColumnType::Varchar(200))];
        for kind in [
            IndexKind::BPlusTree,
            IndexKind::ExtendibleHash,
            IndexKind::IsamSparse,
        ] {
            let table = Table::create(dir.path(), "wide", wide.clone(), "id", 128, kind);
            assert_eq!(table.err().map(|e| e.code()), Some(ErrorCode::InputInvalid));
        }
        Ok(())
    }

    #[test]
    fn test_routing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut table = Table::create(dir.path(), "items", columns(), "id", 4096, IndexKind::BPlusTree)?;

        table.add(&item(2, "pen", 1.5))?;
        table.add(&item(1, "ink", 3.0))?;
        // Integers are coerced into FLOAT columns.
        table.add(&Record::new().with("price", 3).with("name", "cap").with("id", 3))?;

        assert_eq!(table.get(3)?.and_then(|r| r.get("price").cloned()), Some(Value::Float(3.0)));
        assert_eq!(table.search("price", 3.0)?.len(), 2);
        assert_eq!(table.search("id", 2)?.len(), 1);

        let cheap = table.range_search("price", 0.0, Some(2.0))?;
        assert_eq!(cheap.len(), 1);

        let err = table.add(&item(1, "dup", 0.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
        let err = table.add(&Record::new().with("id", 9)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingColumn);
        let err = table.add(&item(9, "x", 0.0).with("color", "red")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InputInvalid);

        let err = table.remove("name", "pen").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InputInvalid);
        assert!(table.remove("id", 2)?);
        assert!(!table.remove("id", 2)?);
        assert_eq!(table.delete(2).unwrap_err().code(), ErrorCode::KeyNotFound);

        assert_eq!(table.record_count(), 2);
        assert_eq!(table.count(), 2);
        Ok(())
    }

    #[test]
    fn test_varchar_key_with_trailing_nul() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let columns = vec![Column::new("code", ColumnType::Varchar(4))];
        let mut table = Table::create(dir.path(), "codes", columns, "code", 4096, IndexKind::BPlusTree)?;

        table.add(&Record::new().with("code", "a\0"))?;
        assert!(table.get("a\0")?.is_some());
        assert!(table.get("a")?.is_some());
        assert_eq!(table.search("code", "a\0")?.len(), 1);

        let err = table.add(&Record::new().with("code", "a")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
        assert!(table.remove("code", "a\0")?);
        assert_eq!(table.count(), 0);
        Ok(())
    }

    #[test]
    fn test_strict_varchar() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut options = Options::new();
        options.page_size(Some(512)).strict_varchar(true);
        let mut table = options.create(dir.path(), "items", columns(), "id", IndexKind::SequentialFile)?;

        let err = table.add(&item(1, "fountain", 9.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordTooLarge);
        assert_eq!(table.record_count(), 0);

        options.strict_varchar(false);
        let mut table = options.load(dir.path(), "items")?;
        table.add(&item(1, "fountain", 9.0))?;
        let name = table.get(1)?.and_then(|r| r.get("name").cloned());
        assert_eq!(name, Some(Value::from("founta")));
        Ok(())
    }

    #[test]
    fn test_load_checks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        Table::create(dir.path(), "items", columns(), "id", 256, IndexKind::ExtendibleHash)?;

        let err = Table::load(dir.path(), "items", 512).err().map(|e| e.code());
        assert_eq!(err, Some(ErrorCode::InputInvalid));
        let err = Table::load(dir.path(), "missing", 256).err().map(|e| e.code());
        assert_eq!(err, Some(ErrorCode::FileUnexpected));

        let path = dir.path().join("items.json");
        let json = std::fs::read_to_string(&path)?.replace("\"record_size\": 18", "\"record_size\": 19");
        std::fs::write(&path, json)?;
        let err = Table::load(dir.path(), "items", 256).err().map(|e| e.code());
        assert_eq!(err, Some(ErrorCode::FileUnexpected));
        Ok(())
    }
}

//! An embedded storage engine for tables of fixed-size records, written in Rust.
//!
//! Every `HeiderDB` table stores its records in one data file and organizes them through
//! exactly one primary index, chosen when the table is created:
//!
//! * **B+ tree**: paged tree with linked leaves, good for point and range queries.
//! * **Extendible hash**: directory of buckets, fast point queries; ranges scan.
//! * **Sequential file**: sorted main area with overflow chains, rebuilt periodically.
//! * **Sparse ISAM**: two-level sparse directory over sorted data pages.
//!
//! Records are serialized column by column into a fixed layout, so every record of a
//! table has the same size and lives at a stable position of the data file.
//!
//! # Create Table
//!
//! Use following way to create a table in a directory. The table description goes to
//! `‹name›.json` and the records to `‹name›.dat`, next to the index files.
//!
//! ```
//! use heiderdb::{Column, ColumnType, IndexKind, Options, Result, Table};
//! # fn try_main() -> Result<()> {
//!
//! let dir = "target/heiderdb-docs";
//! let columns = vec![
//!     Column::new("id", ColumnType::Int),
//!     Column::parse("name", "VARCHAR(20)")?,
//!     Column::parse("price", "FLOAT")?,
//! ];
//!
//! // The simplest way to create with default `Options`:
//! let table = Table::create(dir, "products", columns.clone(), "id", 4096, IndexKind::BPlusTree)?;
//!
//! // Create with `Options`:
//! let table = Options::new()
//!     .page_size(Some(4096))
//!     .force_sync(true)
//!     .create(dir, "products", columns, "id", IndexKind::SequentialFile)?;
//! # Ok(())
//! # }
//!
//! # fn main() { try_main().unwrap(); }
//! ```
//! Creating a table replaces any table of the same name in the directory. An existing
//! table is opened again with `Table::load` or `Options::load`.
//!
//! # Add, Get, Search, Remove
//!
//! ```
//! # use heiderdb::{Column, ColumnType, IndexKind, Record, Result, Table, Value};
//! # fn try_main() -> Result<()> {
//! # let columns = vec![
//! #     Column::new("id", ColumnType::Int),
//! #     Column::new("name", ColumnType::Varchar(20)),
//! #     Column::new("price", ColumnType::Float),
//! # ];
//! # let mut table = Table::create("target/heiderdb-docs", "crud", columns, "id", 4096, IndexKind::ExtendibleHash)?;
//! // Insert records, columns may come in any order.
//! table.add(&Record::new().with("id", 1).with("name", "pen").with("price", 1.5))?;
//! table.add(&Record::new().with("price", 3).with("name", "ink").with("id", 2))?;
//!
//! // Get a record by its primary key.
//! let pen = table.get(1)?.unwrap();
//! assert_eq!(pen.get("name"), Some(&Value::from("pen")));
//! assert!(table.get(3)?.is_none());
//!
//! // Search by any column, the primary key goes through the index.
//! assert_eq!(table.search("price", 3.0)?.len(), 1);
//! assert_eq!(table.range_search("id", 1, Some(2))?.len(), 2);
//!
//! // Remove by primary key.
//! assert!(table.remove("id", 1)?);
//! assert!(!table.remove("id", 1)?);
//! assert_eq!(table.count(), 1);
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```
//!
//! # Debugging
//!
//! A table hands out a `Debugger` for its index, which reports statistics and draws
//! the index structure through its `Debug` output.
//!
//! ```
//! # use heiderdb::{Column, ColumnType, IndexKind, Record, Result, Table};
//! # fn try_main() -> Result<()> {
//! # let columns = vec![Column::new("id", ColumnType::Int)];
//! let mut table = Table::create("target/heiderdb-docs", "tree", columns, "id", 68, IndexKind::BPlusTree)?;
//! for id in 0..10 {
//!     table.add(&Record::new().with("id", id))?;
//! }
//!
//! let debugger = table.debugger();
//! assert_eq!(debugger.stats()?.entries, 10);
//! println!("{debugger:?}");
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```
//!
//! ## Attention
//!
//! ❗️ A table assumes it is the only writer of its files. Nothing is locked, so callers
//! sharing a table between threads or processes must serialize access themselves.
//!
//! ❗️ There are no transactions and no write-ahead log. A crash in the middle of a write
//! may leave the index inconsistent with the data file.

mod bptree;
mod debugger;
mod error;
mod freelist;
mod hash;
mod index;
mod isam;
mod medium;
mod meta;
mod record;
mod schema;
mod search;
mod sequential;
mod storage;
mod table;

pub use crate::{
    debugger::Debugger,
    error::{Error, ErrorCode, Result},
    index::{IndexKind, IndexStats},
    record::{Record, Value},
    schema::{Column, ColumnType, Field, Schema},
    table::{Options, Table},
};

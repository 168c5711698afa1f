use std::collections::BTreeMap;

use heiderdb::{Column, ColumnType, ErrorCode, IndexKind, Options, Record, Result, Table};
use rand::{seq::SliceRandom, Rng};

// Here are the highest level APIs tests.
// Some `mod`s also have their own tests inside.

const KINDS: [IndexKind; 4] = [
    IndexKind::BPlusTree,
    IndexKind::ExtendibleHash,
    IndexKind::SequentialFile,
    IndexKind::IsamSparse,
];

#[test]
fn test_crud() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 128, Options::new(), |table| {
            let items = obtain_items(300);
            for (id, name) in &items {
                table.add(&item(*id, name))?;
            }
            assert_eq!(table.count(), items.len());
            for (id, name) in &items {
                assert_eq!(name_of(table.get(*id)?), Some(name.clone()), "{kind}: get {id}");
            }

            // Remove a third of them.
            let mut ids: Vec<_> = items.keys().copied().collect();
            ids.shuffle(&mut rand::thread_rng());
            let (removed, kept) = ids.split_at(100);

            for id in removed {
                table.delete(*id)?;
            }
            for id in removed {
                assert!(table.get(*id)?.is_none(), "{kind}: {id} was removed");
            }
            for id in kept {
                assert_eq!(name_of(table.get(*id)?), Some(items[id].clone()));
            }
            assert_eq!(table.count(), kept.len());
            assert_eq!(table.record_count(), kept.len());

            // Add them back.
            for id in removed {
                table.add(&item(*id, &items[id]))?;
            }
            for (id, name) in &items {
                assert_eq!(name_of(table.get(*id)?), Some(name.clone()));
            }
            assert_eq!(sorted_ids(table.get_all()?), items.keys().copied().collect::<Vec<_>>());
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn test_range_search() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 128, Options::new(), |table| {
            let items = obtain_items(200);
            for (id, name) in &items {
                table.add(&item(*id, name))?;
            }

            let mut rng = rand::thread_rng();
            for _ in 0..20 {
                let begin = rng.gen_range(-100..1100);
                let end = begin + rng.gen_range(0..300);

                let range = ids_of(table.range_search("id", begin, Some(end))?);
                let expected: Vec<_> = items.range(begin..=end).map(|(id, _)| *id).collect();
                assert_eq!(range, expected, "{kind}: range {begin}..={end}");
            }

            let open = ids_of(table.range_search("id", 500, None::<i32>)?);
            let expected: Vec<_> = items.range(500..).map(|(id, _)| *id).collect();
            assert_eq!(open, expected, "{kind}: open range");

            let empty = table.range_search("id", 20, Some(10))?;
            assert!(empty.is_empty());
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn test_duplicate_key() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 256, Options::new(), |table| {
            table.add(&item(7, "first"))?;
            let err = table.add(&item(7, "second")).unwrap_err();
            assert_eq!(err.code(), ErrorCode::DuplicateKey, "{kind}");

            assert_eq!(table.count(), 1);
            assert_eq!(table.record_count(), 1);
            assert_eq!(name_of(table.get(7)?), Some("first".into()));
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn test_delete_consistency() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 128, Options::new(), |table| {
            for id in 0..50 {
                table.add(&item(id, "x"))?;
            }
            for id in (0..50).step_by(3) {
                assert!(table.remove("id", id)?);
            }
            assert!(!table.remove("id", 3)?);
            assert_eq!(table.delete(3).unwrap_err().code(), ErrorCode::KeyNotFound);

            let all = sorted_ids(table.get_all()?);
            let range = ids_of(table.range_search("id", 0, Some(49))?);
            let expected: Vec<_> = (0..50).filter(|id| id % 3 != 0).collect();
            assert_eq!(all, expected, "{kind}");
            assert_eq!(range, expected, "{kind}");
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn test_rebuild() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 128, Options::new(), |table| {
            let items = obtain_items(120);
            for (id, name) in &items {
                table.add(&item(*id, name))?;
            }
            let removed: Vec<_> = items.keys().copied().step_by(4).collect();
            for id in &removed {
                table.delete(*id)?;
            }

            let before = sorted_ids(table.get_all()?);
            table.rebuild()?;
            let once = sorted_ids(table.get_all()?);
            table.rebuild()?;
            let twice = sorted_ids(table.get_all()?);

            assert_eq!(before, once, "{kind}");
            assert_eq!(once, twice, "{kind}");
            assert_eq!(table.count(), items.len() - removed.len());
            assert_eq!(table.record_count(), table.count());

            for id in &once {
                assert_eq!(name_of(table.get(*id)?), Some(items[id].clone()));
            }
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn test_reload() -> Result<()> {
    for kind in KINDS {
        let dir = tempfile::tempdir()?;
        let items = obtain_items(80);
        {
            let mut table = Table::create(dir.path(), "items", columns(), "id", 128, kind)?;
            for (id, name) in &items {
                table.add(&item(*id, name))?;
            }
        }

        let table = Table::load(dir.path(), "items", 128)?;
        assert_eq!(table.index_kind(), kind);
        assert_eq!(table.record_count(), items.len());
        assert_eq!(table.count(), items.len());
        assert_eq!(table.schema().record_size(), 12);
        for (id, name) in &items {
            assert_eq!(name_of(table.get(*id)?), Some(name.clone()), "{kind}: reload {id}");
        }
    }
    Ok(())
}

#[test]
fn test_bplus_tree_splits() -> Result<()> {
    test_table(IndexKind::BPlusTree, 68, Options::new(), |table| {
        for id in [10, 20, 5, 6, 12, 30, 7, 17] {
            table.add(&item(id, "x"))?;
        }

        let range = table.range_search("id", 6, Some(17))?;
        assert_eq!(ids_of(range), [6, 7, 10, 12, 17]);

        let stats = table.debugger().stats()?;
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.height, 2);
        Ok(())
    })
}

#[test]
fn test_hash_doubling() -> Result<()> {
    // Two entries fit in a bucket.
    test_table(IndexKind::ExtendibleHash, 44, Options::new(), |table| {
        for id in [0, 4, 8] {
            table.add(&item(id, "x"))?;
        }

        let stats = table.debugger().stats()?;
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.global_depth, 3);
        assert_eq!(stats.directory_size, 8);
        assert_eq!(stats.overflow_count, 0);
        for id in [0, 4, 8] {
            assert!(table.get(id)?.is_some());
        }
        Ok(())
    })
}

#[test]
fn test_sequential_rebuilds() -> Result<()> {
    let mut options = Options::new();
    options.seq_overflow_ratio(0.0);

    test_table(IndexKind::SequentialFile, 128, options, |table| {
        let mut ids: Vec<_> = (1..=20).collect();
        ids.shuffle(&mut rand::thread_rng());
        for id in ids {
            table.add(&item(id, "x"))?;
        }

        assert_eq!(table.debugger().stats()?.overflow_count, 0);
        let range = table.range_search("id", 5, Some(10))?;
        assert_eq!(ids_of(range), [5, 6, 7, 8, 9, 10]);
        Ok(())
    })
}

#[test]
fn test_non_key_columns() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 256, Options::new(), |table| {
            table.add(&item(3, "pen"))?;
            table.add(&item(1, "ink"))?;
            table.add(&item(2, "pen"))?;

            assert_eq!(sorted_ids(table.search("name", "pen")?), [2, 3]);
            assert!(table.search("name", "cap")?.is_empty());
            let range = table.range_search("name", "a", Some("j"))?;
            assert_eq!(ids_of(range), [1]);

            assert_eq!(table.remove("name", "pen").unwrap_err().code(), ErrorCode::InputInvalid);
            assert_eq!(table.search("color", "red").unwrap_err().code(), ErrorCode::InputInvalid);
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn test_debugger() -> Result<()> {
    for kind in KINDS {
        test_table(kind, 68, Options::new(), |table| {
            for id in 0..12 {
                table.add(&item(id, "x"))?;
            }
            let debugger = table.debugger();
            assert_eq!(debugger.kind(), kind);
            assert_eq!(debugger.stats()?.entries, 12);
            assert!(!format!("{debugger:?}").is_empty());
            Ok(())
        })?;
    }
    Ok(())
}

fn test_table(
    kind: IndexKind,
    page_size: u32,
    mut options: Options,
    test: impl FnOnce(&mut Table) -> Result<()>,
) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut table = options
        .page_size(Some(page_size))
        .create(dir.path(), "items", columns(), "id", kind)?;
    test(&mut table)
}

fn columns() -> Vec<Column> {
    vec![
        Column::new("id", ColumnType::Int),
        Column::new("name", ColumnType::Varchar(8)),
    ]
}

fn item(id: i32, name: &str) -> Record {
    Record::new().with("id", id).with("name", name)
}

fn name_of(record: Option<Record>) -> Option<String> {
    record?.get("name")?.as_str().map(ToOwned::to_owned)
}

fn ids_of(records: Vec<Record>) -> Vec<i32> {
    records
        .iter()
        .filter_map(|r| r.get("id")?.as_int())
        .collect()
}

fn sorted_ids(records: Vec<Record>) -> Vec<i32> {
    let mut ids = ids_of(records);
    ids.sort();
    ids
}

/// Distinct random ids with random names of up to eight ASCII letters.
fn obtain_items(count: usize) -> BTreeMap<i32, String> {
    let mut rng = rand::thread_rng();
    let mut items = BTreeMap::new();
    while items.len() < count {
        let len = rng.gen_range(0..=8);
        let name = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
        items.insert(rng.gen_range(0..1000), name);
    }
    items
}

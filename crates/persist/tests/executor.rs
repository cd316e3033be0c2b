//! Integration tests for the statement executor.
//!
//! Runs against an in-memory `SQLite` database wrapped to count queries and checked-out
//! connections.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{cached_database, database, shop_schema};
use qwasr_persist::{Dao, Error, Record, StatementType, Value, entity};

fn account(name: &str) -> Record {
    Record::new("account").with("name", name).with("passwd", "secret")
}

#[test]
fn create_assigns_generated_id_and_version() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();

    let mut first = account("foo");
    assert_eq!(accounts.create(&mut first).unwrap(), 1);
    assert_eq!(first.get("id"), &Value::Long(1));
    assert_eq!(first.get("version"), &Value::Int(1));

    let mut second = account("bar");
    accounts.create(&mut second).unwrap();
    assert_eq!(second.get("id"), &Value::Long(2));

    let found = accounts.query_for_id(1_i64).unwrap().unwrap();
    assert_eq!(found.get("name"), &Value::Text("foo".to_string()));
    assert_eq!(found.get("version"), &Value::Int(1));
    assert!(accounts.query_for_id(99_i64).unwrap().is_none());
    assert_eq!(accounts.query_for_all().unwrap().len(), 2);
}

#[test]
fn update_bumps_version_and_rejects_stale_rows() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();

    let mut record = account("foo");
    accounts.create(&mut record).unwrap();
    let mut stale = record.clone();

    record.set("name", "renamed");
    assert_eq!(accounts.update(&mut record).unwrap(), 1);
    assert_eq!(record.get("version"), &Value::Int(2));

    // the version still reads 1, so the row no longer matches
    stale.set("name", "lost");
    assert_eq!(accounts.update(&mut stale).unwrap(), 0);
    assert_eq!(stale.get("version"), &Value::Int(1));

    let stored = accounts.query_for_id(1_i64).unwrap().unwrap();
    assert_eq!(stored.get("name"), &Value::Text("renamed".to_string()));
    assert_eq!(stored.get("version"), &Value::Int(2));
}

#[test]
fn update_id_moves_the_row() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();

    let mut record = account("foo");
    accounts.create(&mut record).unwrap();
    assert_eq!(accounts.update_id(&mut record, 10_i64).unwrap(), 1);
    assert_eq!(record.get("id"), &Value::Long(10));

    assert!(accounts.query_for_id(1_i64).unwrap().is_none());
    assert!(accounts.query_for_id(10_i64).unwrap().is_some());
}

#[test]
fn prepared_updates_and_deletes() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    for name in ["foo", "foo", "bar"] {
        accounts.create(&mut account(name)).unwrap();
    }

    let mut ub = accounts.update_builder().update_column_value("passwd", "changed").unwrap();
    ub.r#where().eq("name", "foo").unwrap();
    assert_eq!(accounts.update_prepared(&ub.prepare().unwrap()).unwrap(), 2);

    let select = accounts.query_builder().prepare().unwrap();
    let err = accounts.update_prepared(&select).unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));
    let err = accounts.delete_prepared(&ub.prepare().unwrap()).unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));

    let mut deletes = accounts.delete_builder();
    deletes.r#where().eq("passwd", "changed").unwrap();
    let delete = deletes.prepare().unwrap();
    assert_eq!(delete.statement_type(), StatementType::Delete);
    assert_eq!(accounts.delete_prepared(&delete).unwrap(), 2);
    assert_eq!(accounts.query_for_count_star().unwrap(), 1);
}

#[test]
fn refresh_reads_the_database() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();

    let mut record = account("foo");
    accounts.create(&mut record).unwrap();
    accounts.update_raw("UPDATE `account` SET `name` = ? WHERE `id` = ?", &["bar", "1"]).unwrap();

    assert_eq!(accounts.refresh(&mut record).unwrap(), 1);
    assert_eq!(record.get("name"), &Value::Text("bar".to_string()));
    assert!(record.collection("orders").is_some());

    accounts.delete(&record).unwrap();
    assert_eq!(accounts.refresh(&mut record).unwrap(), 0);
}

#[test]
fn delete_by_record_id_and_id_list() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    let mut records = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        let mut record = account(name);
        accounts.create(&mut record).unwrap();
        records.push(record);
    }

    assert_eq!(accounts.delete(&records[0]).unwrap(), 1);
    assert_eq!(accounts.delete(&records[0]).unwrap(), 0);
    assert_eq!(accounts.delete_by_id(2_i64).unwrap(), 1);
    assert_eq!(accounts.delete_ids(&[Value::Long(3), Value::Long(42)]).unwrap(), 1);
    assert_eq!(accounts.delete_ids(&[]).unwrap(), 0);
    assert_eq!(accounts.delete_objects(&records[3..]).unwrap(), 2);
    assert_eq!(accounts.query_for_count_star().unwrap(), 0);
}

#[test]
fn counting_queries() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    let orders = db.executor("order").unwrap();

    let mut owner = account("foo");
    accounts.create(&mut owner).unwrap();
    for amount in [1_i32, 5, 8, 13] {
        let mut order = Record::new("order").with("amount", amount).with("account", owner.clone());
        orders.create(&mut order).unwrap();
    }

    assert!(accounts.id_exists(1_i64).unwrap());
    assert!(!accounts.id_exists(2_i64).unwrap());
    assert_eq!(orders.query_for_count_star().unwrap(), 4);

    let mut qb = orders.query_builder();
    qb.r#where().gt("amount", 4).unwrap();
    assert_eq!(orders.count_of(&qb.prepare_count_of(None).unwrap()).unwrap(), 3);
    let err = orders.count_of(&qb.prepare().unwrap()).unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));

    let total = orders.query_builder().select_raw("SUM(`amount`)").prepare().unwrap();
    assert_eq!(orders.query_for_long(&total).unwrap(), 27);

    let mut qb = orders.query_builder().order_by("amount", false).unwrap();
    qb.r#where().lt("amount", 10).unwrap();
    let first = orders.query_for_first(&qb.prepare().unwrap()).unwrap().unwrap();
    assert_eq!(first.get("amount"), &Value::Int(8));
}

#[test]
fn raw_statements() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    accounts.create(&mut account("foo")).unwrap();
    accounts.create(&mut account("bar")).unwrap();

    let raw = accounts
        .query_raw("SELECT `name`, `version` FROM `account` WHERE `name` = ?", &["foo"])
        .unwrap();
    assert_eq!(raw.columns(), ["name", "version"]);
    assert_eq!(raw.first_result().unwrap(), [Some("foo".to_string()), Some("1".to_string())]);

    let rows = accounts.update_raw("UPDATE `account` SET `passwd` = ?", &["x"]).unwrap();
    assert_eq!(rows, 2);
    let raw = accounts.query_raw("SELECT `passwd` FROM `account`", &[]).unwrap();
    assert!(raw.into_rows().iter().all(|row| row[0].as_deref() == Some("x")));
}

#[test]
fn rows_changed_fallback() {
    let (db, stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    for name in ["foo", "foo", "bar"] {
        accounts.create(&mut account(name)).unwrap();
    }

    stats.hide_row_counts(true);
    stats.reset_queries();
    let rows = accounts.update_raw("UPDATE `account` SET `passwd` = ? WHERE `name` = ?", &["x", "foo"]).unwrap();
    assert_eq!(rows, 2);
    // the count came from the rows-changed query
    assert_eq!(stats.queries(), 1);

    let rows = accounts.update_raw("UPDATE `account` SET `passwd` = ? WHERE `name` = ?", &["x", "nobody"]).unwrap();
    assert_eq!(rows, 0);

    // without a rows-changed query the statement is assumed to have changed one row
    stats.fail_rows_changed(true);
    let rows = accounts.update_raw("UPDATE `account` SET `passwd` = ? WHERE `name` = ?", &["x", "nobody"]).unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn batch_notifies_once() {
    let (db, _stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    db.register_observer(Arc::new(move |table: &str| {
        assert_eq!(table, "account");
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    for name in ["a", "b", "c"] {
        accounts.create(&mut account(name)).unwrap();
    }
    assert_eq!(notified.load(Ordering::SeqCst), 3);

    notified.store(0, Ordering::SeqCst);
    let created = accounts
        .call_batch_tasks(|| {
            for name in ["d", "e", "f"] {
                accounts.create(&mut account(name))?;
            }
            Ok(3)
        })
        .unwrap();
    assert_eq!(created, 3);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(accounts.query_for_count_star().unwrap(), 6);

    // nothing changed, nothing to report
    accounts.query_for_all().unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_batch_keeps_its_changes() {
    let (db, stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();

    let err = accounts
        .call_batch_tasks(|| -> qwasr_persist::Result<()> {
            accounts.create(&mut account("kept"))?;
            Err(Error::NotFound("stop".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // restoring auto-commit commits what ran before the failure
    assert_eq!(accounts.query_for_count_star().unwrap(), 1);
    assert_eq!(stats.checked_out(), 0);
}

#[test]
fn iterator_holds_connection_until_closed() {
    let (db, stats) = database(shop_schema());
    let accounts = db.executor("account").unwrap();
    for name in ["a", "b", "c"] {
        accounts.create(&mut account(name)).unwrap();
    }
    let prepared = accounts.query_builder().order_by("name", true).unwrap().prepare().unwrap();

    let mut iterator = accounts.iterator(&prepared).unwrap();
    assert_eq!(stats.checked_out(), 1);
    let first = iterator.next().unwrap().unwrap();
    assert_eq!(first.get("name"), &Value::Text("a".to_string()));
    assert_eq!(stats.checked_out(), 1);
    assert_eq!(iterator.by_ref().count(), 2);
    assert_eq!(stats.checked_out(), 0);

    let mut iterator = accounts.iterator(&prepared).unwrap();
    iterator.next().unwrap().unwrap();
    iterator.remove().unwrap();
    drop(iterator);
    assert_eq!(stats.checked_out(), 0);
    assert_eq!(accounts.query_for_count_star().unwrap(), 2);

    let delete = accounts.delete_builder().prepare().unwrap();
    let err = accounts.iterator(&delete).unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));
    assert_eq!(stats.checked_out(), 0);
}

#[test]
fn object_cache_serves_lookups_by_id() {
    let (db, stats) = cached_database(shop_schema(), 100);
    let accounts = db.executor("account").unwrap();
    let cache = Arc::clone(db.object_cache().unwrap());

    let mut record = account("foo");
    accounts.create(&mut record).unwrap();
    // no collections were assigned, so the new record is not cached
    assert_eq!(cache.size("account"), 0);

    stats.reset_queries();
    let loaded = accounts.query_for_id(1_i64).unwrap().unwrap();
    assert_eq!(stats.queries(), 2);
    assert_eq!(cache.size("account"), 1);

    accounts.query_for_id(1_i64).unwrap().unwrap();
    assert_eq!(stats.queries(), 2);

    // refresh reads the row, not the cache
    accounts.update_raw("UPDATE `account` SET `name` = ? WHERE `id` = ?", &["bar", "1"]).unwrap();
    let mut refreshed = loaded.clone();
    accounts.refresh(&mut refreshed).unwrap();
    assert_eq!(refreshed.get("name"), &Value::Text("bar".to_string()));
    assert_eq!(loaded.get("name"), &Value::Text("foo".to_string()));

    let mut updated = loaded;
    updated.set("name", "baz");
    accounts.update(&mut updated).unwrap();
    let cached = cache.get("account", &Value::Long(1)).unwrap();
    assert_eq!(cached.get("name"), &Value::Text("baz".to_string()));

    accounts.delete(&updated).unwrap();
    assert!(cache.get("account", &Value::Long(1)).is_none());

    accounts.create(&mut account("qux")).unwrap();
    accounts.query_for_id(2_i64).unwrap().unwrap();
    db.clear_object_cache();
    assert!(cache.get("account", &Value::Long(2)).is_none());
}

#[test]
fn table_utilities() {
    let (db, _stats) = cached_database(shop_schema(), 100);
    let accounts = db.executor("account").unwrap();
    let cache = Arc::clone(db.object_cache().unwrap());

    // the fixture already created every table
    assert_eq!(accounts.create_table_if_not_exists().unwrap(), 1);
    assert!(matches!(accounts.create_table(), Err(Error::Driver(_))));

    accounts.create(&mut account("foo")).unwrap();
    accounts.create(&mut account("bar")).unwrap();
    accounts.query_for_id(1_i64).unwrap().unwrap();
    assert_eq!(cache.size("account"), 1);

    assert_eq!(accounts.clear_table().unwrap(), 2);
    assert_eq!(cache.size("account"), 0);
    assert!(accounts.query_for_all().unwrap().is_empty());

    assert_eq!(accounts.drop_table(false).unwrap(), 1);
    assert!(accounts.query_for_all().is_err());
    assert!(accounts.drop_table(false).is_err());
    assert_eq!(accounts.drop_table(true).unwrap(), 0);

    // recreated from the descriptor, ids restart
    accounts.create_table().unwrap();
    let mut again = account("baz");
    accounts.create(&mut again).unwrap();
    assert_eq!(again.get("id"), &Value::Long(1));
}

#[test]
fn tables_need_an_id_for_id_operations() {
    use qwasr_persist::{FieldConfig, NativeType, Schema, TableConfig};

    let schema = Schema::builder()
        .table(TableConfig::new("tag").field(FieldConfig::of("label", NativeType::String)))
        .build()
        .unwrap();
    let (db, _stats) = database(schema);
    let tags = db.executor("tag").unwrap();

    let mut tag = Record::new("tag").with("label", "red");
    assert_eq!(tags.create(&mut tag).unwrap(), 1);
    assert_eq!(tags.query_for_all().unwrap(), vec![tag.clone()]);

    let err = tags.query_for_id(1_i64).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("because it doesn't have an id field"));
    assert!(matches!(tags.update(&mut tag).unwrap_err(), Error::Config(_)));
    assert!(matches!(tags.delete(&tag).unwrap_err(), Error::Config(_)));
    assert!(matches!(tags.id_exists(1_i64).unwrap_err(), Error::BuilderState(_)));

    assert!(matches!(db.executor("missing").unwrap_err(), Error::NotFound(_)));
}

entity! {
    table = "account",
    #[derive(Debug, Clone, PartialEq)]
    pub struct Account {
        pub id: Option<i64>,
        pub name: String,
        pub passwd: String,
        pub version: Option<i32>,
    }
}

#[test]
fn typed_dao() {
    let (db, _stats) = database(shop_schema());
    let dao = Dao::<Account>::new(&db).unwrap();

    let created = dao
        .create(&Account {
            id: None,
            name: "foo".to_string(),
            passwd: "bar".to_string(),
            version: None,
        })
        .unwrap();
    assert_eq!(created.id, Some(1));
    assert_eq!(created.version, Some(1));

    let mut changed = created.clone();
    changed.passwd = "baz".to_string();
    let updated = dao.update(&changed).unwrap();
    assert_eq!(updated.version, Some(2));

    let found = dao.query_for_id(1_i64).unwrap().unwrap();
    assert_eq!(found, updated);
    assert_eq!(dao.query_for_all().unwrap(), vec![updated.clone()]);

    assert_eq!(dao.delete(&updated).unwrap(), 1);
    assert!(dao.query_for_id(1_i64).unwrap().is_none());
    assert_eq!(dao.executor().table().name(), "account");
}

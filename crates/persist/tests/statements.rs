//! Integration tests for statement builders.
//!
//! Tests the public API as users would interact with it.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{assert_sql_contains, shop_schema};
use qwasr_persist::{
    DeleteBuilder, Error, Schema, SelectArg, SelectBuilder, SqliteDialect, StatementType, UpdateBuilder, Value,
};

fn select(schema: &Schema, table: &str) -> SelectBuilder {
    SelectBuilder::new(Arc::new(SqliteDialect), Arc::clone(schema.table(table).unwrap()))
}

// SELECT tests

#[test]
fn chained_and_matches_composed_and() {
    let schema = shop_schema();

    let mut chained = select(&schema, "account");
    chained.r#where().eq("name", "foo").unwrap().and().unwrap().eq("passwd", "bar").unwrap();

    let mut composed = select(&schema, "account");
    composed.r#where().eq("name", "foo").unwrap().eq("passwd", "bar").unwrap().and_n(2).unwrap();

    let chained = chained.prepare().unwrap();
    assert_eq!(chained.statement(), "SELECT * FROM `account` WHERE (`name` = 'foo' AND `passwd` = 'bar' ) ");
    assert_eq!(chained.statement(), composed.prepare().unwrap().statement());
    assert_sql_contains(chained.statement(), &["SELECT * FROM account", "WHERE (name = 'foo' AND passwd = 'bar' )"]);
}

#[test]
fn unterminated_where_never_renders() {
    let schema = shop_schema();

    let mut qb = select(&schema, "account");
    qb.r#where();
    let err = qb.prepare().unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));

    for dangling in ["and", "or", "not"] {
        let mut qb = select(&schema, "account");
        let w = qb.r#where();
        match dangling {
            "and" => w.eq("name", "foo").unwrap().and().unwrap(),
            "or" => w.eq("name", "foo").unwrap().or().unwrap(),
            _ => w.not().unwrap(),
        };
        let err = qb.prepare().unwrap_err();
        assert!(matches!(err, Error::BuilderState(_)), "{dangling}: {err}");
    }
}

#[test]
fn argument_holder_rebinding() {
    let schema = shop_schema();
    let name = SelectArg::new();

    let mut qb = select(&schema, "account");
    qb.r#where().eq("name", &name).unwrap();
    qb.r#where().reset();
    qb.r#where().eq("name", &name).unwrap();
    let prepared = qb.prepare().unwrap();
    assert_eq!(prepared.statement(), "SELECT * FROM `account` WHERE `name` = ? ");

    // unset values fail at bind time, not at build time
    assert!(matches!(prepared.bind_args().unwrap_err(), Error::BuilderState(_)));
    name.set_value("foo");
    assert_eq!(prepared.bind_args().unwrap()[0].value, Value::Text("foo".to_string()));
    prepared.set_argument_holder_value(0, "bar").unwrap();
    assert_eq!(prepared.bind_args().unwrap()[0].value, Value::Text("bar".to_string()));

    // rebinding to another column fails once the statement is rendered
    let mut other = select(&schema, "account");
    other.r#where().eq("passwd", &name).unwrap();
    let err = other.prepare().unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));
    assert!(err.to_string().contains("Column name cannot be set twice from name to passwd"));
}

#[test]
fn count_of_and_raw_selects() {
    let schema = shop_schema();

    let mut qb = select(&schema, "order");
    qb.r#where().gt("amount", 10).unwrap();
    let counting = qb.prepare_count_of(None).unwrap();
    assert_eq!(counting.statement_type(), StatementType::SelectLong);
    assert_sql_contains(counting.statement(), &["SELECT COUNT(*) FROM order", "WHERE amount > 10"]);

    let raw = select(&schema, "order").select_raw("SUM(amount)").prepare().unwrap();
    assert_eq!(raw.statement_type(), StatementType::SelectRaw);
    assert!(raw.result_fields().is_none());
}

#[test]
fn join_through_foreign_field() {
    let schema = shop_schema();
    let mut accounts = select(&schema, "account");
    accounts.r#where().eq("name", "foo").unwrap();

    let mut orders = select(&schema, "order");
    orders.r#where().gt("amount", 3).unwrap();
    let prepared = orders.join(accounts).unwrap().prepare().unwrap();
    assert_sql_contains(
        prepared.statement(),
        &[
            "SELECT order.* FROM order",
            "INNER JOIN account ON order.account_id = account.id",
            "WHERE order.amount > 3 AND (account.name = 'foo' )",
        ],
    );
}

#[test]
fn select_reset_matches_fresh_builder() {
    let schema = shop_schema();
    let fresh = select(&schema, "order").prepare().unwrap();

    let mut used = select(&schema, "order")
        .distinct()
        .select_columns(["amount"])
        .unwrap()
        .order_by("amount", false)
        .unwrap()
        .limit(5);
    used.r#where().gt("amount", 1).unwrap();
    used.reset();

    let reset = used.prepare().unwrap();
    assert_eq!(reset.statement(), fresh.statement());
    assert_eq!(reset.args().len(), fresh.args().len());
}

// UPDATE tests

#[test]
fn update_requires_set_clause() {
    let schema = shop_schema();
    let ub = UpdateBuilder::new(Arc::new(SqliteDialect), Arc::clone(schema.table("account").unwrap()));
    let err = ub.prepare().unwrap_err();
    assert!(matches!(err, Error::BuilderState(_)));

    let mut ub = ub.update_column_value("name", "foo").unwrap();
    ub.r#where().eq("id", 1_i64).unwrap();
    let prepared = ub.prepare().unwrap();
    assert_eq!(prepared.statement_type(), StatementType::Update);
    assert_sql_contains(prepared.statement(), &["UPDATE account SET name = 'foo'", "WHERE id = 1"]);
}

#[test]
fn update_reset_matches_fresh_builder() {
    let schema = shop_schema();
    let table = Arc::clone(schema.table("account").unwrap());

    let fresh = UpdateBuilder::new(Arc::new(SqliteDialect), Arc::clone(&table))
        .update_column_value("name", "x")
        .unwrap()
        .prepare()
        .unwrap();

    let mut used = UpdateBuilder::new(Arc::new(SqliteDialect), Arc::clone(&table))
        .update_column_expression("passwd", "passwd || '1'")
        .unwrap();
    used.r#where().eq("name", "y").unwrap();
    used.reset();
    let reset = used.update_column_value("name", "x").unwrap().prepare().unwrap();
    assert_eq!(reset.statement(), fresh.statement());
}

// DELETE tests

#[test]
fn delete_reset_matches_fresh_builder() {
    let schema = shop_schema();
    let table = Arc::clone(schema.table("order").unwrap());
    let fresh = DeleteBuilder::new(Arc::new(SqliteDialect), Arc::clone(&table)).prepare().unwrap();

    let mut used = DeleteBuilder::new(Arc::new(SqliteDialect), Arc::clone(&table));
    used.r#where().lt("amount", 2).unwrap();
    assert_sql_contains(used.prepare().unwrap().statement(), &["DELETE FROM order", "WHERE amount < 2"]);
    used.reset();

    assert_eq!(used.prepare().unwrap().statement(), fresh.statement());
    assert_eq!(fresh.statement_type(), StatementType::Delete);
}

//! Resolution of foreign fields while rows are mapped.
//!
//! A foreign column holds the id of a row in another table. Depending on the field
//! configuration and on how deep the current call chain already is, the id becomes either a
//! shell record carrying only the id, or the fully fetched row. Depth is tracked by a
//! [`ResolveContext`] that is created per top-level operation and handed down the call chain,
//! so concurrent operations never share counters.

use std::sync::Arc;

use crate::error::Result;
use crate::executor::Database;
use crate::field::FieldDescriptor;
use crate::value::{Record, Value};

/// Bounded recursion counter.
///
/// The bound is taken from the field that starts the chain: entering at depth zero records
/// its maximum, and deeper fields are measured against that first maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounter {
    level: u32,
    max: u32,
}

impl LevelCounter {
    /// Current depth.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Tries to go one level deeper. `start` says whether the field may begin a new chain
    /// when none is active. Returns `false` when the caller must degrade instead.
    pub const fn try_enter(&mut self, start: bool, max: u32) -> bool {
        if self.level == 0 {
            if !start {
                return false;
            }
            self.max = max;
        }
        if self.level >= self.max {
            return false;
        }
        self.level += 1;
        true
    }

    /// Leaves a level entered with [`LevelCounter::try_enter`].
    pub const fn exit(&mut self) {
        self.level = self.level.saturating_sub(1);
    }
}

/// Depth counters of one logical operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveContext {
    /// Nested auto-refresh fetches.
    pub auto_refresh: LevelCounter,
    /// Nested eager collection loads.
    pub collections: LevelCounter,
}

impl ResolveContext {
    /// Fresh counters for a new top-level operation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The row that owns a collection being loaded, assigned to back references instead of being
/// fetched again.
#[derive(Debug, Clone)]
pub(crate) struct ParentInfo {
    pub(crate) record: Record,
    pub(crate) id: Value,
}

impl ParentInfo {
    pub(crate) fn matches(&self, field: &FieldDescriptor, id: &Value) -> bool {
        field.foreign_ref().is_some_and(|r| r.table == self.record.table()) && *id == self.id
    }
}

/// Turns the id read from a foreign column into the value assigned to the field.
///
/// `current` is the value the field already holds, as on refresh: when it refers to the same
/// id it is kept so previously hydrated data is not lost.
pub(crate) fn resolve(
    db: &Database, ctx: &mut ResolveContext, field: &Arc<FieldDescriptor>, id: Value, current: Option<&Value>,
) -> Result<Value> {
    let Some(foreign) = field.foreign_ref() else {
        return Ok(id);
    };
    if id.is_null() {
        return Ok(Value::Null);
    }
    if let Some(current) = current
        && current.as_object().is_some()
        && field.foreign_id_of(current) == id
    {
        return Ok(current.clone());
    }
    if let Some(cached) = db.object_cache().and_then(|cache| cache.get(&foreign.table, &id)) {
        return Ok(Value::from(cached));
    }

    if !ctx.auto_refresh.try_enter(field.is_foreign_auto_refresh(), field.max_foreign_auto_refresh_level()) {
        return Ok(shell(&foreign.table, &foreign.field, id));
    }
    tracing::trace!(
        field = %field,
        level = ctx.auto_refresh.level(),
        %id,
        "auto-refreshing foreign field"
    );
    let fetched = db.query_for_field_eq(&foreign.table, &foreign.field, &id, ctx);
    ctx.auto_refresh.exit();
    Ok(fetched?.map_or(Value::Null, Value::from))
}

/// A record of `table` with only its id set.
pub(crate) fn shell(table: &str, id_field: &str, id: Value) -> Value {
    Value::from(Record::new(table).with(id_field, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_needs_a_starter() {
        let mut counter = LevelCounter::default();
        assert!(!counter.try_enter(false, 2));
        assert_eq!(counter.level(), 0);

        assert!(counter.try_enter(true, 2));
        // deeper fields continue the chain even without the flag
        assert!(counter.try_enter(false, 5));
        assert!(!counter.try_enter(true, 5));
        assert_eq!(counter.level(), 2);

        counter.exit();
        counter.exit();
        counter.exit();
        assert_eq!(counter.level(), 0);
    }

    #[test]
    fn zero_bound_never_enters() {
        let mut counter = LevelCounter::default();
        assert!(!counter.try_enter(true, 0));
        assert_eq!(counter.level(), 0);
    }

    #[test]
    fn shell_has_only_id() {
        let value = shell("account", "id", Value::Long(4));
        let record = value.as_object().unwrap();
        assert_eq!(record.table(), "account");
        assert_eq!(record.values().count(), 1);
        assert_eq!(record.get("id"), &Value::Long(4));
    }
}

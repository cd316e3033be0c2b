//! Identity cache for hydrated records.

use std::fmt;

use moka::sync::Cache;

use crate::value::{Record, Value};

/// Cache of records keyed by table and id.
///
/// Implementations must allow concurrent access from any thread.
pub trait ObjectCache: Send + Sync {
    /// Returns the cached record for `id`.
    fn get(&self, table: &str, id: &Value) -> Option<Record>;

    /// Stores a record under `id`.
    fn put(&self, table: &str, id: &Value, record: Record);

    /// Drops the record cached under `id`.
    fn remove(&self, table: &str, id: &Value);

    /// Moves the record cached under `old_id` to `new_id`, returning it.
    fn update_id(&self, table: &str, old_id: &Value, new_id: &Value) -> Option<Record>;

    /// Drops every record of a table.
    fn clear(&self, table: &str);

    /// Drops every record.
    fn clear_all(&self);

    /// Number of records cached for a table.
    fn size(&self, table: &str) -> u64;
}

type TableCache = Cache<String, Record>;

/// Bounded in-memory cache, evicting the least recently used records of each table.
#[derive(Clone)]
pub struct LruObjectCache {
    capacity: u64,
    tables: Cache<String, TableCache>,
}

impl LruObjectCache {
    /// Creates a cache holding at most `capacity` records per table.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            tables: Cache::builder().build(),
        }
    }

    fn table(&self, table: &str) -> TableCache {
        let capacity = self.capacity;
        self.tables.get_with(table.to_string(), || Cache::builder().max_capacity(capacity).build())
    }
}

impl fmt::Debug for LruObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruObjectCache").field("capacity", &self.capacity).finish_non_exhaustive()
    }
}

impl ObjectCache for LruObjectCache {
    fn get(&self, table: &str, id: &Value) -> Option<Record> {
        self.tables.get(table)?.get(&id.to_string())
    }

    fn put(&self, table: &str, id: &Value, record: Record) {
        tracing::trace!(table, %id, "caching record");
        self.table(table).insert(id.to_string(), record);
    }

    fn remove(&self, table: &str, id: &Value) {
        if let Some(cache) = self.tables.get(table) {
            cache.invalidate(&id.to_string());
        }
    }

    fn update_id(&self, table: &str, old_id: &Value, new_id: &Value) -> Option<Record> {
        let cache = self.tables.get(table)?;
        let record = cache.remove(&old_id.to_string())?;
        cache.insert(new_id.to_string(), record.clone());
        Some(record)
    }

    fn clear(&self, table: &str) {
        if let Some(cache) = self.tables.get(table) {
            cache.invalidate_all();
        }
    }

    fn clear_all(&self) {
        self.tables.invalidate_all();
    }

    fn size(&self, table: &str) -> u64 {
        self.tables.get(table).map_or(0, |cache| {
            cache.run_pending_tasks();
            cache.entry_count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let cache = LruObjectCache::new(10);
        let id = Value::Long(1);
        cache.put("account", &id, Record::new("account").with("id", 1_i64));

        assert_eq!(cache.get("account", &id).unwrap().get("id"), &Value::Long(1));
        assert!(cache.get("order", &id).is_none());
        assert_eq!(cache.size("account"), 1);

        cache.remove("account", &id);
        assert!(cache.get("account", &id).is_none());
    }

    #[test]
    fn moves_ids() {
        let cache = LruObjectCache::new(10);
        cache.put("account", &Value::Long(1), Record::new("account"));
        assert!(cache.update_id("account", &Value::Long(1), &Value::Long(2)).is_some());
        assert!(cache.get("account", &Value::Long(1)).is_none());
        assert!(cache.get("account", &Value::Long(2)).is_some());

        cache.clear_all();
        assert!(cache.get("account", &Value::Long(2)).is_none());
    }
}

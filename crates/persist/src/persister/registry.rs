use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{DataType, Persister};
use crate::value::NativeType;

/// Lookup from native type to persister.
///
/// Registered persisters are consulted before the built-ins, in registration order. The
/// registry is handed to the schema builder rather than held globally, so separate schemas may
/// carry separate custom persisters.
#[derive(Debug)]
pub struct PersisterRegistry {
    builtins: HashMap<NativeType, Arc<dyn Persister>>,
    registered: RwLock<Vec<Arc<dyn Persister>>>,
}

impl Default for PersisterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PersisterRegistry {
    /// Creates a registry holding only the built-in persisters.
    #[must_use]
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        for data_type in DataType::ALL {
            let persister = data_type.persister();
            for native in persister.native_types() {
                builtins.entry(*native).or_insert_with(|| Arc::clone(&persister));
            }
        }
        Self {
            builtins,
            registered: RwLock::new(Vec::new()),
        }
    }

    /// Adds a custom persister. Earlier registrations take priority over later ones.
    pub fn register(&self, persister: Arc<dyn Persister>) {
        tracing::debug!(persister = persister.name(), "registering custom persister");
        self.registered.write().push(persister);
    }

    /// Removes every custom persister.
    pub fn clear(&self) {
        self.registered.write().clear();
    }

    /// Finds the persister for a native type.
    ///
    /// Enumerations without a dedicated persister fall back to storage by variant name.
    #[must_use]
    pub fn lookup(&self, native: NativeType) -> Option<Arc<dyn Persister>> {
        let registered = self
            .registered
            .read()
            .iter()
            .find(|p| p.native_types().contains(&native))
            .map(Arc::clone);
        registered.or_else(|| self.builtins.get(&native).map(Arc::clone)).or_else(|| {
            (native == NativeType::Enum).then(|| DataType::EnumString.persister())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::connection::DatabaseResults;
    use crate::error::Result;
    use crate::persister::SqlType;
    use crate::value::Value;

    #[derive(Debug)]
    struct Upper;

    impl Persister for Upper {
        fn name(&self) -> &'static str {
            "Upper"
        }

        fn sql_type(&self) -> SqlType {
            SqlType::String
        }

        fn native_types(&self) -> &'static [NativeType] {
            &[NativeType::String, NativeType::Custom("shout")]
        }

        fn to_arg(&self, _field: &FieldConfig, value: &Value) -> Result<Value> {
            Ok(Value::Text(value.to_string().to_uppercase()))
        }

        fn from_result(
            &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
        ) -> Result<Value> {
            Ok(results.get_string(column)?.map_or(Value::Null, Value::Text))
        }

        fn parse_default(&self, _field: &FieldConfig, default: &str) -> Result<Value> {
            Ok(Value::Text(default.to_uppercase()))
        }
    }

    #[test]
    fn builtins_by_native_type() {
        let registry = PersisterRegistry::new();
        assert_eq!(registry.lookup(NativeType::Long).unwrap().name(), "LongPersister");
        assert_eq!(registry.lookup(NativeType::Uuid).unwrap().name(), "UuidPersister");
        assert_eq!(registry.lookup(NativeType::Enum).unwrap().name(), "EnumStringPersister");
        assert!(registry.lookup(NativeType::Custom("shout")).is_none());
    }

    #[test]
    fn registered_take_priority() {
        let registry = PersisterRegistry::new();
        registry.register(Arc::new(Upper));
        assert_eq!(registry.lookup(NativeType::String).unwrap().name(), "Upper");
        assert_eq!(registry.lookup(NativeType::Custom("shout")).unwrap().name(), "Upper");

        registry.clear();
        assert_eq!(registry.lookup(NativeType::String).unwrap().name(), "StringPersister");
    }
}

use anyhow::{bail, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

type Slot = Arc<dyn Any + Send + Sync>;

/// Typed key/value store attached to a frame.
///
/// Modules use it to hang structured results on a frame without the engine
/// knowing their types.
#[derive(Default)]
pub struct Collection {
    data: RwLock<HashMap<String, Slot>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. Fails if `key` already holds one.
    pub fn add<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
        if data.contains_key(&key) {
            bail!("Collection already holds key '{}'", key);
        }
        data.insert(key, Arc::new(value));
        Ok(())
    }

    /// Insert a value unless `key` is taken. Returns true if inserted.
    pub fn add_if_absent<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> bool {
        let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
        match data.entry(key.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(Arc::new(value));
                true
            }
        }
    }

    /// Fetch a value; `None` if missing or stored with another type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let data = self.data.read().unwrap_or_else(|p| p.into_inner());
        data.get(key).cloned()?.downcast::<T>().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        let data = self.data.read().unwrap_or_else(|p| p.into_inner());
        data.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
        data.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read().unwrap_or_else(|p| p.into_inner());
        f.debug_set().entries(data.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let collection = Collection::new();
        collection.add("boxes", vec![1u32, 2, 3]).unwrap();

        assert_eq!(collection.get::<Vec<u32>>("boxes").unwrap().as_slice(), &[1, 2, 3]);
        assert!(collection.get::<String>("boxes").is_none());
        assert!(collection.get::<Vec<u32>>("missing").is_none());
    }

    #[test]
    fn test_duplicate_key_keeps_first_value() {
        let collection = Collection::new();
        collection.add("label", "person".to_string()).unwrap();

        assert!(collection.add("label", "car".to_string()).is_err());
        assert!(!collection.add_if_absent("label", "car".to_string()));
        assert_eq!(collection.get::<String>("label").unwrap().as_str(), "person");

        assert!(collection.remove("label"));
        assert!(collection.is_empty());
    }
}

pub mod registration;

pub use registration::{registrations, ModuleCreateFn, ModuleRegistration};

use crate::core::Module;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Constructor stored in a [`ModuleRegistry`]
pub type ModuleConstructor = Arc<dyn Fn(&str) -> Box<dyn Module> + Send + Sync>;

/// Maps module type names to constructors so a graph can be assembled from
/// names alone.
#[derive(Default)]
pub struct ModuleRegistry {
    constructors: RwLock<HashMap<String, ModuleConstructor>>,
}

impl ModuleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every type registered with `#[derive(RegisterModule)]`
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for registration in registrations() {
            if !registry.register(registration.type_name, registration.create) {
                warn!(
                    "module type {} is registered more than once, keeping the first",
                    registration.type_name
                );
            }
        }
        registry
    }

    /// Insert a constructor unless `type_name` is taken.
    ///
    /// Returns false and leaves the existing constructor in place on a
    /// duplicate name.
    pub fn register<F>(&self, type_name: impl Into<String>, constructor: F) -> bool
    where
        F: Fn(&str) -> Box<dyn Module> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        let mut constructors = self.constructors.write().unwrap_or_else(|p| p.into_inner());
        if constructors.contains_key(&type_name) {
            return false;
        }
        debug!("registered module type {}", type_name);
        constructors.insert(type_name, Arc::new(constructor));
        true
    }

    /// Build an instance of `type_name` called `instance_name`
    pub fn create(&self, type_name: &str, instance_name: &str) -> Option<Box<dyn Module>> {
        // release the lock before running user code
        let constructor = {
            let constructors = self.constructors.read().unwrap_or_else(|p| p.into_inner());
            constructors.get(type_name).cloned()
        }?;
        Some(constructor(instance_name))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        let constructors = self.constructors.read().unwrap_or_else(|p| p.into_inner());
        constructors.contains_key(type_name)
    }

    /// Known type names, in no particular order
    pub fn registered(&self) -> Vec<String> {
        let constructors = self.constructors.read().unwrap_or_else(|p| p.into_inner());
        constructors.keys().cloned().collect()
    }
}

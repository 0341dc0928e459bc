use crate::core::Module;

/// Constructor taking the instance name
pub type ModuleCreateFn = fn(&str) -> Box<dyn Module>;

/// Link-time registration produced by `#[derive(RegisterModule)]`
pub struct ModuleRegistration {
    pub type_name: &'static str,
    pub description: &'static str,
    pub create: ModuleCreateFn,
}

inventory::collect!(ModuleRegistration);

/// Every registration linked into the binary
pub fn registrations() -> impl Iterator<Item = &'static ModuleRegistration> {
    inventory::iter::<ModuleRegistration>.into_iter()
}

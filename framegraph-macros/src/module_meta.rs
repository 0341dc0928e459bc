use darling::FromAttributes;
use syn::DeriveInput;

/// Parsed attributes from #[module_meta(...)]
#[derive(Debug, Default, FromAttributes)]
#[darling(attributes(module_meta))]
pub struct ModuleMetaArgs {
    /// Registry key; defaults to the struct name
    #[darling(default)]
    pub type_name: Option<String>,

    #[darling(default)]
    pub description: Option<String>,
}

pub fn parse_module_meta(input: &DeriveInput) -> darling::Result<ModuleMetaArgs> {
    ModuleMetaArgs::from_attributes(&input.attrs)
}

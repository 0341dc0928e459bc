use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod module_meta;
use module_meta::parse_module_meta;

/// Registers a module type with the link-time module registry.
///
/// The struct must provide an inherent `fn new(name: &str) -> Self`; the
/// generated constructor calls it with the instance name.
#[proc_macro_derive(RegisterModule, attributes(module_meta))]
pub fn derive_register_module(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let meta = match parse_module_meta(&input) {
        Ok(meta) => meta,
        Err(e) => return e.write_errors().into(),
    };

    let struct_name = &input.ident;
    let type_name = meta
        .type_name
        .unwrap_or_else(|| struct_name.to_string());
    let description = meta.description.unwrap_or_default();

    let mod_name = syn::Ident::new(
        &format!("__module_registration_{}", struct_name.to_string().to_lowercase()),
        struct_name.span(),
    );

    let create_fn_name = syn::Ident::new(
        &format!("create_{}", struct_name.to_string().to_lowercase()),
        struct_name.span(),
    );

    let expanded = quote! {
        mod #mod_name {
            use super::*;

            fn #create_fn_name(name: &str) -> Box<dyn crate::core::Module> {
                Box::new(#struct_name::new(name))
            }

            ::inventory::submit! {
                crate::registry::ModuleRegistration {
                    type_name: #type_name,
                    description: #description,
                    create: #create_fn_name,
                }
            }
        }
    };

    TokenStream::from(expanded)
}

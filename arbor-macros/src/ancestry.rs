//! Shared parsing of `extends(..)` lists.

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Path, meta::ParseNestedMeta};

/// Collects the paths of an `extends(A, b::B)` list.
pub(crate) fn parse_extends(
    meta: &ParseNestedMeta<'_>,
    parents: &mut Vec<Path>,
) -> syn::Result<()> {
    meta.parse_nested_meta(|parent| {
        if parent.input.peek(syn::token::Paren) || parent.input.peek(syn::Token![=]) {
            return Err(parent.error("expected a type path"));
        }
        parents.push(parent.path);
        Ok(())
    })
}

/// Body of an `ancestors()` function: each parent followed by its own
/// ancestors, resolved through `trait_path`.
pub(crate) fn ancestors_body(parents: &[Path], trait_path: TokenStream2) -> TokenStream2 {
    quote! {
        #[allow(unused_mut)]
        let mut ancestors = ::std::vec::Vec::new();
        #(
            ancestors.push(::arbor::TypeKey::of::<#parents>());
            ancestors.extend(<#parents as #trait_path>::ancestors());
        )*
        ancestors
    }
}

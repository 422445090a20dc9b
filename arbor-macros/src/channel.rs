//! `#[derive(ChannelType)]`.

use crate::ancestry::{ancestors_body, parse_extends};
use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Path, parse_macro_input};

fn parse_parents(input: &DeriveInput) -> syn::Result<Vec<Path>> {
    let mut parents = Vec::new();
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("channel")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("extends") {
                parse_extends(&meta, &mut parents)
            } else {
                Err(meta.error("unknown channel attribute, expected `extends`"))
            }
        })?;
    }
    Ok(parents)
}

pub fn derive_channel_type_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let parents = match parse_parents(&input) {
        Ok(parents) => parents,
        Err(err) => return err.to_compile_error().into(),
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let body = ancestors_body(&parents, quote! { ::arbor::ChannelType });

    let expanded = quote! {
        impl #impl_generics ::arbor::ChannelType for #name #ty_generics #where_clause {
            fn ancestors() -> ::std::vec::Vec<::arbor::TypeKey> {
                #body
            }
        }
    };

    TokenStream::from(expanded)
}

//! `#[derive(Event)]`.

use crate::ancestry::{ancestors_body, parse_extends};
use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Path, Type, parse_macro_input};

#[derive(Default)]
struct EventArgs {
    result: Option<Type>,
    extends: Vec<Path>,
}

impl EventArgs {
    fn from_input(input: &DeriveInput) -> syn::Result<Self> {
        let mut args = EventArgs::default();
        for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("event")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("result") {
                    args.result = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("extends") {
                    parse_extends(&meta, &mut args.extends)
                } else {
                    Err(meta.error("unknown event attribute, expected `result` or `extends`"))
                }
            })?;
        }
        Ok(args)
    }
}

pub fn derive_event_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let args = match EventArgs::from_input(&input) {
        Ok(args) => args,
        Err(err) => return err.to_compile_error().into(),
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let result = args
        .result
        .map(|ty| quote! { #ty })
        .unwrap_or_else(|| quote! { () });
    let ancestors = (!args.extends.is_empty()).then(|| {
        let body = ancestors_body(&args.extends, quote! { ::arbor::Event });
        quote! {
            fn ancestors() -> ::std::vec::Vec<::arbor::TypeKey> {
                #body
            }
        }
    });

    let expanded = quote! {
        impl #impl_generics ::arbor::Event for #name #ty_generics #where_clause {
            type Result = #result;

            #ancestors
        }
    };

    TokenStream::from(expanded)
}

//! Derive macros for the composable effects runtime
//!
//! This crate provides procedural macros that remove the boilerplate of
//! declaring an action vocabulary.
//!
//! # Available Macros
//!
//! - `#[derive(Action)]` - Implements `composable_effects_core::Action` for an enum
//!
//! # Example
//!
//! ```ignore
//! use composable_effects_core::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum TodoAction {
//!     #[kind = "todos/page/opened"]
//!     PageOpened,
//!
//!     #[kind = "todos/api/loaded"]
//!     Loaded { titles: Vec<String> },
//! }
//!
//! // Generated items:
//! assert_eq!(TodoAction::PageOpened.kind(), "todos/page/opened");
//! assert_eq!(TodoAction::PAGE_OPENED, "todos/page/opened");
//! assert_eq!(TodoAction::kinds().len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use std::collections::HashMap;
use syn::{Attribute, Data, DeriveInput, Expr, ExprLit, Fields, Ident, Lit, Meta, parse_macro_input};

/// Derive macro for action enums
///
/// Generates:
/// - `impl Action` with `kind()` (exhaustive match) and `kinds()` (the whole vocabulary)
/// - one associated `&'static str` constant per variant, named in
///   `SCREAMING_SNAKE_CASE` after the variant (`QueryChanged` → `QUERY_CHANGED`)
///
/// # Attributes
///
/// - `#[kind = "..."]` - Override the kind string (defaults to the variant name)
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - Applied to a non-enum type
/// - The enum has no variants
/// - Two variants resolve to the same kind string
/// - A `#[kind]` attribute is not a string literal
///
/// # Example
///
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// enum OrderAction {
///     #[kind = "orders/page/opened"]
///     PageOpened,
///
///     OrderPlaced { order_id: String },
/// }
///
/// assert_eq!(OrderAction::OrderPlaced { order_id: "o-1".into() }.kind(), "OrderPlaced");
/// ```
#[proc_macro_derive(Action, attributes(kind))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(&input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    if data_enum.variants.is_empty() {
        return syn::Error::new_spanned(&input, "#[derive(Action)] requires at least one variant")
            .to_compile_error()
            .into();
    }

    let mut seen: HashMap<String, &Ident> = HashMap::new();
    let mut kind_arms = Vec::new();
    let mut constants = Vec::new();
    let mut kind_values = Vec::new();

    for variant in &data_enum.variants {
        let variant_name = &variant.ident;

        let kind = match kind_attribute(&variant.attrs) {
            Ok(Some(kind)) => kind,
            Ok(None) => variant_name.to_string(),
            Err(error) => return error.to_compile_error().into(),
        };

        if let Some(previous) = seen.insert(kind.clone(), variant_name) {
            return syn::Error::new_spanned(
                variant,
                format!("duplicate action kind \"{kind}\" (already used by `{previous}`)"),
            )
            .to_compile_error()
            .into();
        }

        let constant = Ident::new(&screaming_snake_case(&variant_name.to_string()), Span::call_site());
        let doc = format!("Kind string of [`{name}::{variant_name}`]");
        constants.push(quote! {
            #[doc = #doc]
            pub const #constant: &'static str = #kind;
        });

        kind_arms.push(match &variant.fields {
            Fields::Named(_) => quote! { Self::#variant_name { .. } => #kind, },
            Fields::Unnamed(_) => quote! { Self::#variant_name(..) => #kind, },
            Fields::Unit => quote! { Self::#variant_name => #kind, },
        });

        kind_values.push(kind);
    }

    let expanded = quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            #(#constants)*
        }

        impl #impl_generics ::composable_effects_core::action::Action for #name #ty_generics #where_clause {
            fn kind(&self) -> &'static str {
                match self {
                    #(#kind_arms)*
                }
            }

            fn kinds() -> &'static [&'static str] {
                &[#(#kind_values),*]
            }
        }
    };

    TokenStream::from(expanded)
}

/// Extract the string value of a `#[kind = "..."]` attribute, if present
fn kind_attribute(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    for attr in attrs {
        if !attr.path().is_ident("kind") {
            continue;
        }

        let Meta::NameValue(meta) = &attr.meta else {
            return Err(syn::Error::new_spanned(attr, "expected `#[kind = \"...\"]`"));
        };

        let Expr::Lit(ExprLit { lit: Lit::Str(value), .. }) = &meta.value else {
            return Err(syn::Error::new_spanned(&meta.value, "action kind must be a string literal"));
        };

        let kind = value.value();
        if kind.is_empty() {
            return Err(syn::Error::new_spanned(value, "action kind must not be empty"));
        }

        return Ok(Some(kind));
    }

    Ok(None)
}

/// Convert a `CamelCase` identifier into `SCREAMING_SNAKE_CASE`
fn screaming_snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let chars: Vec<char> = ident.chars().collect();

    for (index, ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && index > 0 {
            let prev = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.extend(ch.to_uppercase());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::screaming_snake_case;

    #[test]
    fn test_screaming_snake_case() {
        assert_eq!(screaming_snake_case("PageOpened"), "PAGE_OPENED");
        assert_eq!(screaming_snake_case("QueryChanged"), "QUERY_CHANGED");
        assert_eq!(screaming_snake_case("Loaded"), "LOADED");
        assert_eq!(screaming_snake_case("HTTPFailed"), "HTTP_FAILED");
        assert_eq!(screaming_snake_case("Step2Done"), "STEP2_DONE");
    }
}

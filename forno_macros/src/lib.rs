//! Attribute macros backing forno's measurement types.
//!
//! Metric and aggregate structs share a pile of derives (serde round-trips,
//! comparison, debug printing, cloning). These attributes stamp that pile on
//! so call sites stay focused on the fields that matter.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

extern crate proc_macro;

fn measurement_derives() -> TokenStream2 {
    quote! {
        #[derive(
            serde::Serialize,
            serde::Deserialize,
            std::cmp::PartialOrd,
            std::cmp::PartialEq,
            std::fmt::Debug,
            std::clone::Clone
        )]
    }
}

/// Marks a struct as a metric: one observation emitted by a single iteration.
///
/// Expands to the measurement derives plus a marker `impl Metric` for the
/// struct. The `Metric` trait must be in scope at the use site.
#[proc_macro_attribute]
pub fn metric(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let ident = &ast.ident;
    let derives = measurement_derives();
    let expanded = quote! {
        #derives
        #ast

        impl Metric for #ident {}
    };

    TokenStream::from(expanded)
}

/// Marks a struct as an aggregate: the worker-local rollup of many metrics.
///
/// Only stamps the measurement derives. The `Aggregate` trait carries real
/// behavior (consume, merge, fault) so that impl stays hand-written.
#[proc_macro_attribute]
pub fn aggregate(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let derives = measurement_derives();
    let expanded = quote! {
        #derives
        #ast
    };

    TokenStream::from(expanded)
}

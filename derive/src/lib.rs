//! Derive macros for the record receiver traits of `cassette::avec`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod from_record;
mod from_records;

/// Implements `FromRecord` for a struct with named fields.
///
/// - `#[field(N)]` stores field `N` into an `Option<T>` of the field's base type.
/// - `#[field(time)]` stores the absolute time of a compressed timestamp header.
/// - `#[developer(I, N)]` stores developer field `N` of developer `I` as an
///   `Option<f64>`, with its description's scale and offset applied.
/// - A trailing closure, as in `#[field(N, |acc, x: T| ...)]`, replaces the
///   default assignment.
#[proc_macro_derive(FromRecord, attributes(field, developer))]
pub fn derive_from_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_record::expand_from_record(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Implements `FromRecords` for a struct with named fields.
///
/// `#[record(N, ...)]` routes messages with any of the listed global numbers
/// to an `Option<T>` or `Vec<T>` of `FromRecord` receivers.
#[proc_macro_derive(FromRecords, attributes(record))]
pub fn derive_from_records(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_records::expand_from_records(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

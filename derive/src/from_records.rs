use std::collections::BTreeMap;

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, LitInt, PathArguments,
    Result, Token, Type, parse::Parser, punctuated::Punctuated,
};

/// Expands `#[derive(FromRecords)]`.
///
/// Every field tagged `#[record(N, ...)]` receives the messages with those
/// global numbers. `Option<T>` keeps the last one, `Vec<T>` keeps them all.
pub(crate) fn expand_from_records(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new_spanned(
            input,
            "`FromRecords` may only be derived on structs.",
        ))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new_spanned(
            input,
            "`FromRecords` may only be derived on structs with named fields.",
        ))?
    };

    let mut receivers: BTreeMap<u16, TokenStream> = BTreeMap::new();

    for field in &fields.named {
        let Some(receiver) = Receiver::parse(field)? else {
            continue;
        };

        let target = receiver.target();
        for (global, span) in receiver.globals {
            if receivers.insert(global, target.clone()).is_some() {
                Err(Error::new(span, "Message numbers must be unique."))?;
            }
        }
    }

    let cases = receivers.iter().map(|(global, target)| {
        quote! { #global => { #target } }
    });

    let name = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::cassette::avec::FromRecords for #name #type_generics #where_clause {
            fn add_record(&mut self, id: u16) -> Option<&mut dyn ::cassette::avec::FromRecord> {
                match id {
                    #(#cases)*
                    _ => None,
                }
            }
        }
    })
}

#[derive(Debug, Clone, Copy)]
enum Container {
    Option,
    Vec,
}

#[derive(Debug)]
struct Receiver {
    name: Ident,
    container: Container,
    globals: Vec<(u16, Span)>,
}

impl Receiver {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("record")) else {
            return Ok(None);
        };

        let Some(name) = field.ident.clone() else {
            Err(Error::new_spanned(field, "Field must be named."))?
        };

        let numbers = Punctuated::<LitInt, Token![,]>::parse_terminated
            .parse2(attr.meta.require_list()?.tokens.clone())?;

        if numbers.is_empty() {
            Err(Error::new_spanned(attr, "Expected at least one message number."))?;
        }

        let globals = numbers
            .iter()
            .map(|n| Ok((n.base10_parse::<u16>()?, n.span())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self {
            name,
            container: container(&field.ty)?,
            globals,
        }))
    }

    fn target(&self) -> TokenStream {
        let name = &self.name;
        match self.container {
            Container::Option => quote! {
                Some(self.#name.insert(Default::default()))
            },
            Container::Vec => quote! {
                self.#name.push(Default::default());
                self.#name.last_mut().map(|r| r as _)
            },
        }
    }
}

/// Classifies `Option<T>` and `Vec<T>`, by their last path segment.
fn container(ty: &Type) -> Result<Container> {
    let invalid = || Error::new_spanned(ty, "Field must have an `Option<T>` or `Vec<T>` type.");

    let Type::Path(path) = ty else {
        return Err(invalid());
    };
    let segment = path.path.segments.last().ok_or_else(invalid)?;

    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return Err(invalid());
    };
    if !matches!(arguments.args.first(), Some(GenericArgument::Type(_))) {
        return Err(invalid());
    }

    match segment.ident.to_string().as_str() {
        "Option" => Ok(Container::Option),
        "Vec" => Ok(Container::Vec),
        _ => Err(invalid()),
    }
}

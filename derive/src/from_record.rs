use std::collections::HashMap;

use proc_macro2::{Span, TokenStream};
use quote::{ToTokens, format_ident, quote};
use syn::{
    Data, DeriveInput, Error, Expr, Field, Fields, GenericArgument, Ident, LitInt, Pat,
    PathArguments, Result, Token, Type,
    parse::{Parse, ParseStream},
    spanned::Spanned,
};

pub(crate) fn expand_from_record(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new(
            input.span(),
            "`FromRecord` may only be derived on structs.",
        ))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new(
            input.span(),
            "`FromRecord` may only be derived on structs with named fields.",
        ))?
    };

    let fields = fields
        .named
        .iter()
        .map(FieldMetadata::parse)
        .map(Result::transpose)
        .flatten() // Skip fields without an attribute.
        .collect::<Result<Vec<_>>>()?;

    let mut field_methods: HashMap<Type, HashMap<LitInt, Assignment>> = HashMap::new();
    let mut time_method: Option<Assignment> = None;
    let mut developer_cases: HashMap<(LitInt, LitInt), Assignment> = HashMap::new();

    for field in fields {
        let duplicate = match field.identifier {
            FieldIdentifier::Number(number) => field_methods
                .entry(field.primitive)
                .or_default()
                .insert(number, field.assignment)
                .is_some(),
            FieldIdentifier::Time => time_method.replace(field.assignment).is_some(),
            FieldIdentifier::Developer(index, number) => developer_cases
                .insert((index, number), field.assignment)
                .is_some(),
        };

        if duplicate {
            Err(Error::new(field.span, "Field identifiers must be unique."))?;
        }
    }

    let field_methods = field_methods.into_iter().map(|(primitive, fields)| {
        let cases = fields.into_iter().map(|(number, assignment)| {
            let assignment = assignment.apply(quote! { value }, quote! { Some(value) });
            quote! { #number => { #assignment } }
        });

        let primitive = format_ident!("{}", primitive.to_token_stream().to_string());
        let method = format_ident!("add_{}", primitive);

        quote! {
            fn #method(&mut self, field: u8, value: #primitive) {
                match field {
                    #(#cases)*
                    _ => {}
                };
            }
        }
    });

    let time_method = time_method.map(|assignment| {
        let assignment = assignment.apply(quote! { timestamp }, quote! { Some(timestamp) });

        quote! {
            fn add_timestamp(&mut self, timestamp: u32) {
                #assignment;
            }
        }
    });

    let developer_method = (!developer_cases.is_empty()).then(|| {
        let cases = developer_cases.into_iter().map(|((index, number), assignment)| {
            let assignment = assignment.apply(quote! { field }, quote! { field.as_f64() });
            quote! { (#index, #number) => { #assignment } }
        });

        quote! {
            fn add_developer_field(&mut self, field: &::cassette::avec::DeveloperValue<'_>) {
                match (field.developer_index, field.number) {
                    #(#cases)*
                    _ => {}
                };
            }
        }
    });

    let name = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::cassette::avec::FromRecord for #name #type_generics #where_clause {
            #(#field_methods)*
            #time_method
            #developer_method
        }
    })
}

/// How a received value is stored into a struct field.
#[derive(Debug)]
struct Assignment {
    name: Ident,
    handler: Option<Handler>,
}

#[derive(Debug)]
struct Handler {
    field_type: Type,
    accumulator: Pat,
    value: Pat,
    body: Expr,
}

impl Assignment {
    fn apply(self, value: TokenStream, default: TokenStream) -> TokenStream {
        let name = self.name;

        match self.handler {
            Some(Handler {
                field_type,
                accumulator,
                value: parameter,
                body,
            }) => quote! {
                (|#accumulator: &mut #field_type, #parameter| { #body })(&mut self.#name, #value)
            },
            None => quote! { self.#name = #default },
        }
    }
}

#[derive(Debug)]
struct FieldMetadata {
    primitive: Type,
    identifier: FieldIdentifier,
    assignment: Assignment,
    span: Span,
}

#[derive(Debug)]
enum FieldIdentifier {
    Number(LitInt),
    Time,
    Developer(LitInt, LitInt),
}

impl FieldMetadata {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(name) = field.ident.clone() else {
            Err(Error::new_spanned(field, "Field must be named."))?
        };

        let attr = field
            .attrs
            .iter()
            .find(|a| a.path().is_ident("field") || a.path().is_ident("developer"));

        let Some(attr) = attr else {
            return Ok(None);
        };

        let span = attr.span();

        let FieldAttribute {
            identifier,
            handler,
        } = if attr.path().is_ident("developer") {
            attr.meta
                .require_list()?
                .parse_args_with(FieldAttribute::parse_developer)?
        } else {
            attr.meta.require_list()?.parse_args()?
        };

        let (primitive, handler) = if let Some(handler) = handler {
            let mut inputs = handler.inputs.iter();

            let (Some(accumulator), Some(parameter), None) =
                (inputs.next(), inputs.next(), inputs.next())
            else {
                Err(Error::new_spanned(
                    &handler,
                    "Handler closure must have two parameters.",
                ))?
            };

            let Pat::Type(pat_type) = parameter else {
                Err(Error::new_spanned(
                    parameter,
                    "Handler closure's second parameter must be annotated with the expected primitive type.",
                ))?
            };

            let handler = Handler {
                field_type: field.ty.clone(),
                accumulator: accumulator.clone(),
                value: parameter.clone(),
                body: (*handler.body).clone(),
            };

            ((*pat_type.ty).clone(), Some(handler))
        } else {
            (option_argument(&field.ty)?, None)
        };

        if let (FieldIdentifier::Time, None) = (&identifier, &handler) {
            if primitive.to_token_stream().to_string() != "u32" {
                Err(Error::new_spanned(
                    &field.ty,
                    "Timestamp field must have type `Option<u32>`.",
                ))?
            }
        }

        if let (FieldIdentifier::Developer(..), None) = (&identifier, &handler) {
            if primitive.to_token_stream().to_string() != "f64" {
                Err(Error::new_spanned(
                    &field.ty,
                    "Developer field without a handler must have type `Option<f64>`.",
                ))?
            }
        }

        Ok(Some(Self {
            primitive,
            identifier,
            assignment: Assignment { name, handler },
            span,
        }))
    }
}

/// The type `T` of a field of type `Option<T>`.
fn option_argument(ty: &Type) -> Result<Type> {
    let Type::Path(path) = ty else {
        Err(Error::new_spanned(ty, "Field must have a type annotation."))?
    };

    let Some(segment) = path.path.segments.last() else {
        Err(Error::new_spanned(
            &path.path.segments,
            "Field must have a type annotation.",
        ))?
    };

    if segment.ident != "Option" {
        Err(Error::new_spanned(
            &segment.ident,
            "Field without a handler must have type `Option<T>`.",
        ))?
    }

    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        Err(Error::new_spanned(
            &segment.arguments,
            "Field of type `Option<T>` must have a generic parameter.",
        ))?
    };

    let Some(argument) = arguments.args.first() else {
        Err(Error::new_spanned(
            &arguments.args,
            "Field of type `Option<T>` must have a generic parameter.",
        ))?
    };

    let GenericArgument::Type(inner_type) = argument else {
        Err(Error::new_spanned(
            argument,
            "Generic argument of a field of type `Option<T>` must be a type.",
        ))?
    };

    Ok(inner_type.clone())
}

#[derive(Debug)]
struct FieldAttribute {
    identifier: FieldIdentifier,
    handler: Option<syn::ExprClosure>,
}

impl FieldAttribute {
    fn parse_handler(input: ParseStream) -> Result<Option<syn::ExprClosure>> {
        if input.is_empty() {
            return Ok(None);
        }

        input.parse::<Token![,]>()?;
        Ok(Some(input.parse()?))
    }

    /// Parse the arguments of a `developer(I, N)` attribute.
    fn parse_developer(input: ParseStream) -> Result<Self> {
        let index = input.parse::<LitInt>()?;
        input.parse::<Token![,]>()?;
        let number = input.parse::<LitInt>()?;

        Ok(Self {
            identifier: FieldIdentifier::Developer(index, number),
            handler: Self::parse_handler(input)?,
        })
    }
}

impl Parse for FieldAttribute {
    fn parse(input: ParseStream) -> Result<Self> {
        let identifier = if input.peek(Ident) {
            let ident = input.parse::<Ident>()?;

            if ident != "time" {
                Err(Error::new_spanned(
                    ident,
                    "Field identifier must be an integer literal or `time`.",
                ))?
            }

            FieldIdentifier::Time
        } else {
            FieldIdentifier::Number(input.parse::<LitInt>()?)
        };

        Ok(Self {
            identifier,
            handler: Self::parse_handler(input)?,
        })
    }
}

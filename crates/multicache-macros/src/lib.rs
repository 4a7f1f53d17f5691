//! Procedural macros for multicache.
//!
//! Provides `#[derive(CacheKeyed)]`, which marks the member a loaded value is
//! cached under:
//! - `#[cache_key]` on a field
//! - `#[cache_key(accessor = method)]` on the type, naming a `fn(&self) -> K`
//!
//! A tagged field takes priority over an accessor. On generic types the
//! derive bounds the key's type parameters by `Send + 'static`;
//! `#[cache_key(bound = "T: Clone + Send + 'static")]` replaces that guess.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{quote, quote_spanned};
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Fields, Ident, Index, LitStr,
    Member, Token, Type, WherePredicate,
};

const TAG: &str = "cache_key";

/// Derive `multicache::CacheKeyed`.
///
/// # Example
///
/// ```rust,ignore
/// use multicache::CacheKeyed;
///
/// #[derive(CacheKeyed)]
/// struct Product {
///     #[cache_key]
///     id: u64,
///     name: String,
/// }
///
/// #[derive(CacheKeyed)]
/// #[cache_key(accessor = sku)]
/// struct Variant {
///     product: u64,
///     size: String,
/// }
///
/// impl Variant {
///     fn sku(&self) -> String {
///         format!("{}-{}", self.product, self.size)
///     }
/// }
/// ```
///
/// An accessor whose key type depends on a type parameter usually needs
/// more than the default bounds:
///
/// ```rust,ignore
/// #[derive(CacheKeyed)]
/// #[cache_key(accessor = key, bound = "T: Clone + Send + 'static")]
/// struct Keyed<T> {
///     inner: T,
/// }
///
/// impl<T: Clone> Keyed<T> {
///     fn key(&self) -> T {
///         self.inner.clone()
///     }
/// }
/// ```
///
/// Deriving without any tag compiles; extraction then fails at runtime with
/// `CacheError::MissingCacheKeyTag`.
#[proc_macro_derive(CacheKeyed, attributes(cache_key))]
pub fn derive_cache_keyed(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Member selected by the tags.
enum Tagged {
    Field { member: Member, name: String, ty: Type },
    Accessor { method: Ident },
    Nothing,
}

fn expand(mut input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let args = container_args(&input.attrs)?;
    let field = tagged_field(&input.data)?;

    let tagged = match (field, args.accessor) {
        (Some((member, name, ty)), _) => Tagged::Field { member, name, ty },
        (None, Some(method)) => Tagged::Accessor { method },
        (None, None) => Tagged::Nothing,
    };

    let predicates: Vec<WherePredicate> = match (args.bound, &tagged) {
        (Some(explicit), _) => explicit,
        (None, _) if input.generics.params.is_empty() => Vec::new(),
        (None, Tagged::Field { ty, .. }) => {
            vec![parse_quote!(#ty: ::core::clone::Clone + ::core::marker::Send + 'static)]
        }
        (None, Tagged::Accessor { .. }) => input
            .generics
            .type_params()
            .map(|param| {
                let ident = &param.ident;
                parse_quote!(#ident: ::core::marker::Send + 'static)
            })
            .collect(),
        (None, Tagged::Nothing) => Vec::new(),
    };
    if !predicates.is_empty() {
        input
            .generics
            .make_where_clause()
            .predicates
            .extend(predicates);
    }

    let (member_body, read_body) = match &tagged {
        Tagged::Field { member, name, ty } => (
            quote! {
                ::core::option::Option::Some(::multicache::KeyMember::field::<#ty>(#name))
            },
            quote! {
                ::core::option::Option::Some(::std::boxed::Box::new(
                    ::core::clone::Clone::clone(&self.#member),
                ))
            },
        ),
        Tagged::Accessor { method } => {
            let name = method.unraw().to_string();
            // Bound errors on the key type point at the accessor name.
            (
                quote_spanned! {method.span()=>
                    ::core::option::Option::Some(
                        ::multicache::KeyMember::accessor::<Self, _>(#name, Self::#method),
                    )
                },
                quote_spanned! {method.span()=>
                    ::core::option::Option::Some(::std::boxed::Box::new(Self::#method(self)))
                },
            )
        }
        Tagged::Nothing => (
            quote! { ::core::option::Option::None },
            quote! { ::core::option::Option::None },
        ),
    };

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::multicache::CacheKeyed for #ident #ty_generics #where_clause {
            fn cache_key_member() -> ::core::option::Option<::multicache::KeyMember> {
                #member_body
            }

            fn read_cache_key(&self) -> ::core::option::Option<::multicache::RawKey> {
                #read_body
            }
        }
    })
}

fn is_tag(attr: &Attribute) -> bool {
    attr.path().is_ident(TAG)
}

/// Arguments of `#[cache_key(...)]` on the type itself.
#[derive(Default)]
struct ContainerArgs {
    accessor: Option<Ident>,
    bound: Option<Vec<WherePredicate>>,
}

/// Parse `#[cache_key(accessor = method, bound = "...")]` on the type.
fn container_args(attrs: &[Attribute]) -> syn::Result<ContainerArgs> {
    let mut args = ContainerArgs::default();

    for attr in attrs.iter().filter(|attr| is_tag(attr)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("accessor") {
                let value = meta.value()?;
                let method = if value.peek(LitStr) {
                    let lit: LitStr = value.parse()?;
                    lit.parse::<Ident>()?
                } else {
                    value.call(Ident::parse_any)?
                };
                if args.accessor.is_some() {
                    return Err(syn::Error::new(
                        method.span(),
                        "only one cache key accessor may be declared",
                    ));
                }
                args.accessor = Some(method);
                Ok(())
            } else if meta.path.is_ident("bound") {
                let lit: LitStr = meta.value()?.parse()?;
                let predicates = lit.parse_with(
                    Punctuated::<WherePredicate, Token![,]>::parse_terminated,
                )?;
                if args.bound.is_some() {
                    return Err(syn::Error::new(
                        lit.span(),
                        "only one cache key bound may be declared",
                    ));
                }
                args.bound = Some(predicates.into_iter().collect());
                Ok(())
            } else {
                Err(meta.error("unsupported cache_key argument, expected `accessor` or `bound`"))
            }
        })?;
    }

    Ok(args)
}

/// Find the single field carrying a bare `#[cache_key]`.
fn tagged_field(data: &Data) -> syn::Result<Option<(Member, String, Type)>> {
    let fields = match data {
        Data::Struct(data) => &data.fields,
        Data::Enum(data) => {
            for variant in &data.variants {
                if let Some(attr) = variant
                    .fields
                    .iter()
                    .flat_map(|field| field.attrs.iter())
                    .find(|attr| is_tag(attr))
                {
                    return Err(syn::Error::new_spanned(
                        attr,
                        "enum fields cannot be tagged; use #[cache_key(accessor = ...)] on the enum",
                    ));
                }
            }
            return Ok(None);
        }
        Data::Union(data) => {
            return Err(syn::Error::new(
                data.union_token.span,
                "CacheKeyed cannot be derived for unions",
            ));
        }
    };

    let mut found = None;
    for (index, field) in fields.iter().enumerate() {
        for attr in field.attrs.iter().filter(|attr| is_tag(attr)) {
            attr.meta.require_path_only()?;
            if found.is_some() {
                return Err(syn::Error::new_spanned(
                    attr,
                    "only one field may be tagged `#[cache_key]`",
                ));
            }
            let (member, name) = match (&field.ident, fields) {
                (Some(ident), Fields::Named(_)) => {
                    (Member::Named(ident.clone()), ident.unraw().to_string())
                }
                _ => (
                    Member::Unnamed(Index {
                        index: index as u32,
                        span: Span::call_site(),
                    }),
                    index.to_string(),
                ),
            };
            found = Some((member, name, field.ty.clone()));
        }
    }

    Ok(found)
}

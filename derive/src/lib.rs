extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Fields, Ident, Index, Lit,
    LitStr, Type,
};

/// Container attributes parsed from `#[msgpack(...)]` on the struct or enum
#[derive(Debug, Default)]
struct ContainerAttributes {
    method: Option<Method>,
    default: bool,
    custom: bool,
    by_value: bool,
    type_tag: Option<String>,
    constructors: Vec<Constructor>,
}

/// An associated function from `#[msgpack(constructor(name(param, ...)))]`
#[derive(Debug)]
struct Constructor {
    function: Ident,
    params: Vec<Ident>,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Array,
    Map,
}

/// An explicit member key from `#[msgpack(key = ...)]`
#[derive(Debug, Clone)]
enum Key {
    Index(u32),
    Name(String),
}

/// Field attributes parsed from `#[msgpack(...)]` annotations
///
/// # Fields
///
/// * `key` - Explicit array position or map key
/// * `ignore` - Never written; filled with `Default::default()` on read
/// * `nil` - Explicit nil implication (`member_default`, `null` or `prohibit`)
/// * `known_types` - Accepted type tags of a polymorphic member
/// * `runtime_type` - A polymorphic member that accepts any registered type tag
/// * `extension_data` - The field capturing unknown members
/// * `read_only` - Set only through a constructor
#[derive(Debug, Default)]
struct FieldAttributes {
    key: Option<Key>,
    ignore: bool,
    read_only: bool,
    nil: Option<String>,
    known_types: Vec<String>,
    runtime_type: bool,
    extension_data: bool,
}

/// Extract `#[msgpack(...)]` container attributes
///
/// # Supported Attributes
///
/// * `#[msgpack(array)]` / `#[msgpack(map)]` - Wire shape when no member has a key
/// * `#[msgpack(default)]` - The type implements `Default`
/// * `#[msgpack(custom)]` - The type implements the pack/unpack traits itself
/// * `#[msgpack(by_value)]` - Unit enums are written as their variant index
/// * `#[msgpack(type_tag = "name")]` - Implement `TypeTagged` with this tag
/// * `#[msgpack(constructor(new(a, b)))]` - Rebuild through `Self::new(a, b)`; repeatable
fn get_container_attributes(attrs: &[Attribute], type_name: &str) -> ContainerAttributes {
    let mut parsed = ContainerAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("msgpack") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("array") {
                parsed.method = Some(Method::Array);
            } else if meta.path.is_ident("map") {
                parsed.method = Some(Method::Map);
            } else if meta.path.is_ident("default") {
                parsed.default = true;
            } else if meta.path.is_ident("custom") {
                parsed.custom = true;
            } else if meta.path.is_ident("by_value") {
                parsed.by_value = true;
            } else if meta.path.is_ident("type_tag") {
                let tag: LitStr = meta.value()?.parse()?;
                parsed.type_tag = Some(tag.value());
            } else if meta.path.is_ident("constructor") {
                meta.parse_nested_meta(|function| {
                    let ident = function
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| function.error("expected a function name"))?;
                    let mut params = Vec::new();
                    if function.input.peek(syn::token::Paren) {
                        function.parse_nested_meta(|param| {
                            let param = param
                                .path
                                .get_ident()
                                .cloned()
                                .ok_or_else(|| param.error("expected a member name"))?;
                            params.push(param);
                            Ok(())
                        })?;
                    }
                    parsed.constructors.push(Constructor {
                        function: ident,
                        params,
                    });
                    Ok(())
                })?;
            } else {
                return Err(meta.error("unknown container attribute"));
            }
            Ok(())
        });
        if let Err(e) = result {
            panic!("Invalid #[msgpack] attribute on '{}': {}", type_name, e);
        }
    }
    parsed
}

/// Extract `#[msgpack(...)]` field attributes
///
/// Multiple attributes can be combined: `#[msgpack(key = 2, nil = "prohibit")]`
fn get_field_attributes(attrs: &[Attribute], field_name: &str) -> FieldAttributes {
    let mut parsed = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("msgpack") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                let lit: Lit = meta.value()?.parse()?;
                parsed.key = Some(match lit {
                    Lit::Int(i) => Key::Index(i.base10_parse()?),
                    Lit::Str(s) => Key::Name(s.value()),
                    _ => return Err(meta.error("key must be an integer or a string")),
                });
            } else if meta.path.is_ident("ignore") {
                parsed.ignore = true;
            } else if meta.path.is_ident("read_only") {
                parsed.read_only = true;
            } else if meta.path.is_ident("nil") {
                let nil: LitStr = meta.value()?.parse()?;
                match nil.value().as_str() {
                    "member_default" | "null" | "prohibit" => parsed.nil = Some(nil.value()),
                    _ => {
                        return Err(meta.error(
                            "nil must be \"member_default\", \"null\" or \"prohibit\"",
                        ))
                    }
                }
            } else if meta.path.is_ident("known_types") {
                let content;
                syn::parenthesized!(content in meta.input);
                let tags = content.parse_terminated(<LitStr as syn::parse::Parse>::parse, syn::Token![,])?;
                parsed.known_types = tags.iter().map(LitStr::value).collect();
            } else if meta.path.is_ident("runtime_type") {
                parsed.runtime_type = true;
            } else if meta.path.is_ident("extension_data") {
                parsed.extension_data = true;
            } else {
                return Err(meta.error("unknown field attribute"));
            }
            Ok(())
        });
        if let Err(e) = result {
            panic!("Invalid #[msgpack] attribute on field '{}': {}", field_name, e);
        }
    }
    parsed
}

/// How generated code refers to a field: by name, or by position for tuple structs
enum Access {
    Named(Ident),
    Positional(Index),
}

impl Access {
    fn tokens(&self) -> TokenStream2 {
        match self {
            Access::Named(ident) => quote! { #ident },
            Access::Positional(index) => quote! { #index },
        }
    }
}

/// Builds the `MemberInfo` expression of one member
fn member_info(name: &str, ty: &Type, attrs: &FieldAttributes) -> TokenStream2 {
    let facts = if attrs.ignore {
        quote! { senax_msgpack::TypeFacts::value(stringify!(#ty)) }
    } else {
        quote! { <#ty as senax_msgpack::MessagePackSerialize>::type_facts() }
    };
    let mut info = quote! { senax_msgpack::MemberInfo::new(#name, #facts) };
    match &attrs.key {
        Some(Key::Index(i)) => {
            info = quote! { #info.with_key(senax_msgpack::MemberKey::Index(#i)) };
        }
        Some(Key::Name(n)) => {
            info = quote! { #info.with_key(senax_msgpack::MemberKey::Name(#n)) };
        }
        None => {}
    }
    if attrs.ignore {
        info = quote! { #info.ignored() };
    }
    if attrs.read_only {
        info = quote! { #info.read_only() };
    }
    if let Some(nil) = &attrs.nil {
        let variant = match nil.as_str() {
            "null" => quote! { Null },
            "prohibit" => quote! { Prohibit },
            _ => quote! { MemberDefault },
        };
        info = quote! { #info.with_nil(senax_msgpack::NilImplication::#variant) };
    }
    if !attrs.known_types.is_empty() {
        let tags = &attrs.known_types;
        info = quote! { #info.with_known_types(&[#(#tags),*]) };
    }
    if attrs.runtime_type {
        info = quote! { #info.with_runtime_type() };
    }
    info
}

/// Derive macro for implementing `MessagePackObject`
///
/// For structs this generates the type description (`MessagePackObject`) and, unless
/// `#[msgpack(custom)]` is given, `MessagePackSerialize` and `MessagePackDeserialize`
/// driven by the resolved descriptor. Unit-only enums are written as their variant name,
/// or as their variant index with `#[msgpack(by_value)]`.
///
/// Decoding rebuilds the struct the way the descriptor chose. Without
/// `#[msgpack(constructor(...))]` the struct literal takes every member. With it, the
/// matching associated function is called with the member values it names, in order, and
/// the remaining members are assigned afterwards unless they are `read_only`. A
/// `#[msgpack(default)]` type falls back to `Default::default()` followed by assignment.
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(MessagePackObject)]
/// #[msgpack(map)]
/// struct User {
///     name: String,
///     #[msgpack(nil = "prohibit")]
///     email: Option<String>,
///     #[msgpack(ignore)]
///     session: u64,
/// }
///
/// #[derive(MessagePackObject)]
/// #[msgpack(constructor(new(id)))]
/// struct Account {
///     #[msgpack(read_only)]
///     id: u64,
///     label: String,
/// }
///
/// impl Account {
///     fn new(id: u64) -> Self {
///         Account { id, label: String::new() }
///     }
/// }
/// ```
#[proc_macro_derive(MessagePackObject, attributes(msgpack))]
pub fn derive_message_pack_object(input: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(input as DeriveInput);
    let name = input.ident.clone();
    let name_str = name.to_string();
    let container = get_container_attributes(&input.attrs, &name_str);

    let type_params: Vec<Ident> = input.generics.type_params().map(|p| p.ident.clone()).collect();
    {
        let where_clause = input.generics.make_where_clause();
        for param in &type_params {
            where_clause.predicates.push(parse_quote! {
                #param: senax_msgpack::MessagePackSerialize + senax_msgpack::MessagePackDeserialize + 'static
            });
        }
    }
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let type_tag_impl = container.type_tag.as_ref().map(|tag| {
        quote! {
            impl #impl_generics senax_msgpack::TypeTagged for #name #ty_generics #where_clause {
                fn type_tag(&self) -> &'static str {
                    #tag
                }

                fn pack_body(
                    &self,
                    packer: &mut senax_msgpack::Packer,
                    ctx: &senax_msgpack::SerializationContext,
                ) -> senax_msgpack::Result<()> {
                    senax_msgpack::MessagePackSerialize::pack_to(self, packer, ctx)
                }
            }
        }
    });

    let body = match &input.data {
        Data::Struct(s) => derive_struct(&name, &name_str, &container, &s.fields),
        Data::Enum(e) => {
            for v in &e.variants {
                if !matches!(v.fields, Fields::Unit) {
                    panic!(
                        "MessagePackObject on enum '{}' supports unit variants only; variant '{}' has fields. Use #[msgpack(custom)] instead.",
                        name_str, v.ident
                    );
                }
            }
            let variants: Vec<&Ident> = e.variants.iter().map(|v| &v.ident).collect();
            derive_unit_enum(&name_str, &container, &variants)
        }
        Data::Union(_) => panic!("MessagePackObject cannot be derived for union '{}'", name_str),
    };
    let DerivedParts {
        shape,
        serialize,
        deserialize,
    } = body;

    let codec_impls = if container.custom {
        quote! {}
    } else {
        let member_default = container.default.then(|| {
            quote! {
                fn member_default() -> Option<Self> {
                    Some(Default::default())
                }
            }
        });
        let type_facts = if matches!(input.data, Data::Enum(_)) {
            quote! { senax_msgpack::TypeFacts::value(#name_str) }
        } else {
            quote! { senax_msgpack::TypeFacts::object::<Self>() }
        };
        quote! {
            impl #impl_generics senax_msgpack::MessagePackSerialize for #name #ty_generics #where_clause {
                fn pack_to(
                    &self,
                    packer: &mut senax_msgpack::Packer,
                    ctx: &senax_msgpack::SerializationContext,
                ) -> senax_msgpack::Result<()> {
                    #serialize
                }

                fn type_facts() -> senax_msgpack::TypeFacts {
                    #type_facts
                }
            }

            impl #impl_generics senax_msgpack::MessagePackDeserialize for #name #ty_generics #where_clause {
                fn unpack_from(
                    unpacker: &mut senax_msgpack::Unpacker,
                    ctx: &senax_msgpack::SerializationContext,
                ) -> senax_msgpack::Result<Self> {
                    #deserialize
                }

                #member_default
            }
        }
    };

    quote! {
        impl #impl_generics senax_msgpack::MessagePackObject for #name #ty_generics #where_clause {
            fn shape() -> senax_msgpack::TypeShape {
                #shape
            }
        }

        #codec_impls

        #type_tag_impl
    }
    .into()
}

/// A member that travels on the wire, as the construction code sees it
struct IncludedMember {
    name: String,
    field: TokenStream2,
    finish: TokenStream2,
    read_only: bool,
}

/// The three generated function bodies
struct DerivedParts {
    shape: TokenStream2,
    serialize: TokenStream2,
    deserialize: TokenStream2,
}

fn derive_struct(
    name: &Ident,
    name_str: &str,
    container: &ContainerAttributes,
    fields: &Fields,
) -> DerivedParts {
    let (accesses, types, field_attrs): (Vec<Access>, Vec<Type>, Vec<FieldAttributes>) = match fields {
        Fields::Named(named) => {
            let mut accesses = Vec::new();
            let mut types = Vec::new();
            let mut attrs = Vec::new();
            for f in &named.named {
                let ident = f.ident.clone().unwrap_or_else(|| Ident::new("_", Span::call_site()));
                attrs.push(get_field_attributes(&f.attrs, &ident.to_string()));
                accesses.push(Access::Named(ident));
                types.push(f.ty.clone());
            }
            (accesses, types, attrs)
        }
        Fields::Unnamed(unnamed) => {
            let mut accesses = Vec::new();
            let mut types = Vec::new();
            let mut attrs = Vec::new();
            for (i, f) in unnamed.unnamed.iter().enumerate() {
                attrs.push(get_field_attributes(&f.attrs, &i.to_string()));
                accesses.push(Access::Positional(Index::from(i)));
                types.push(f.ty.clone());
            }
            (accesses, types, attrs)
        }
        Fields::Unit => (Vec::new(), Vec::new(), Vec::new()),
    };

    if field_attrs.iter().filter(|a| a.extension_data).count() > 1 {
        panic!("Only one field of '{}' can be #[msgpack(extension_data)]", name_str);
    }

    if !container.constructors.is_empty() && !matches!(fields, Fields::Named(_)) {
        panic!(
            "#[msgpack(constructor(...))] on '{}' needs named fields",
            name_str
        );
    }

    let mut members = Vec::new();
    let mut included = Vec::new();
    let mut pack_arms = Vec::new();
    let mut slot_definitions = Vec::new();
    let mut unpack_arms = Vec::new();
    let mut initializers = Vec::new();
    let mut extension_access = None;
    let mut member_index = 0usize;

    for (access, ty, attrs) in izip!(accesses.iter(), types.iter(), field_attrs.iter()) {
        let field = access.tokens();
        let member_name = match access {
            Access::Named(ident) => ident.to_string(),
            Access::Positional(index) => index.index.to_string(),
        };

        if attrs.extension_data {
            extension_access = Some(field.clone());
            initializers.push((access, quote! { __extension }));
            continue;
        }

        members.push(member_info(&member_name, ty, attrs));
        let index = member_index;
        member_index += 1;

        if attrs.ignore {
            initializers.push((access, quote! { Default::default() }));
            continue;
        }

        let slot = Ident::new(&format!("__m{}", index), Span::call_site());
        pack_arms.push(quote! {
            #index => senax_msgpack::object::pack_member(&self.#field, binding, packer, ctx),
        });
        slot_definitions.push(quote! {
            let mut #slot: Option<#ty> = None;
        });
        unpack_arms.push(quote! {
            #index => senax_msgpack::object::unpack_member(&mut #slot, binding, unpacker, ctx),
        });
        let finish = quote! { senax_msgpack::object::finish_member(#slot, &descriptor, #index)? };
        initializers.push((access, finish.clone()));
        included.push(IncludedMember {
            name: member_name,
            field,
            finish,
            read_only: attrs.read_only,
        });
    }

    let (extension_ref, extension_mut, extension_slot, extension_assign) = match &extension_access {
        Some(field) => (
            quote! { Some(&self.#field) },
            quote! { Some(&mut __extension) },
            quote! { let mut __extension = senax_msgpack::ExtensionData::default(); },
            quote! { __value.#field = __extension; },
        ),
        None => (quote! { None }, quote! { None }, quote! {}, quote! {}),
    };

    // Without explicit constructors the struct literal is the one constructor, taking every
    // included member.
    let mut constructor_infos = Vec::new();
    let mut construction_arms = Vec::new();
    if container.constructors.is_empty() {
        let params: Vec<&String> = included.iter().map(|m| &m.name).collect();
        constructor_infos.push(quote! { senax_msgpack::ConstructorInfo::new(&[#(#params),*]) });
        let construct = match fields {
            Fields::Named(_) => {
                let assignments = initializers.iter().map(|(access, value)| {
                    let field = access.tokens();
                    quote! { #field: #value, }
                });
                quote! { #name { #(#assignments)* } }
            }
            Fields::Unnamed(_) => {
                let values = initializers.iter().map(|(_, value)| value);
                quote! { #name ( #(#values),* ) }
            }
            Fields::Unit => quote! { #name },
        };
        construction_arms.push(quote! {
            Some(senax_msgpack::Construction::Constructor { index: 0usize, .. }) => Ok(#construct),
        });
    }
    for (index, constructor) in container.constructors.iter().enumerate() {
        let names: Vec<String> = constructor.params.iter().map(Ident::to_string).collect();
        constructor_infos.push(quote! { senax_msgpack::ConstructorInfo::new(&[#(#names),*]) });

        // A parameter naming no included member keeps the resolver from choosing this
        // constructor, so no arm is generated for it.
        let params: Option<Vec<usize>> = names
            .iter()
            .map(|param| included.iter().position(|m| m.name.eq_ignore_ascii_case(param)))
            .collect();
        let Some(params) = params else { continue };
        let function = &constructor.function;
        let arguments = params.iter().map(|&i| &included[i].finish);
        let assignments = included
            .iter()
            .enumerate()
            .filter(|(i, m)| !m.read_only && !params.contains(i))
            .map(|(_, m)| {
                let field = &m.field;
                let finish = &m.finish;
                quote! { __value.#field = #finish; }
            });
        construction_arms.push(quote! {
            Some(senax_msgpack::Construction::Constructor { index: #index, .. }) => {
                #[allow(unused_mut)]
                let mut __value = Self::#function(#(#arguments),*);
                #(#assignments)*
                #extension_assign
                Ok(__value)
            }
        });
    }
    if container.default {
        let assignments = included.iter().filter(|m| !m.read_only).map(|m| {
            let field = &m.field;
            let finish = &m.finish;
            quote! { __value.#field = #finish; }
        });
        construction_arms.push(quote! {
            Some(senax_msgpack::Construction::DefaultThenSet) => {
                #[allow(unused_mut)]
                let mut __value: Self = Default::default();
                #(#assignments)*
                #extension_assign
                Ok(__value)
            }
        });
    }

    let mut shape = quote! {
        senax_msgpack::TypeShape::object(#name_str)
            #(.with_member(#members))*
            #(.with_constructor(#constructor_infos))*
    };
    if container.default {
        shape = quote! { #shape.with_default_constructor() };
    }
    if container.custom {
        shape = quote! { #shape.with_custom_hook() };
    }
    if extension_access.is_some() {
        shape = quote! { #shape.with_extension_data() };
    }
    match container.method {
        Some(Method::Array) => {
            shape = quote! { #shape.with_method(senax_msgpack::SerializationMethod::Array) };
        }
        Some(Method::Map) => {
            shape = quote! { #shape.with_method(senax_msgpack::SerializationMethod::Map) };
        }
        None => {}
    }

    let serialize = quote! {
        let descriptor = ctx.descriptor::<Self>()?;
        senax_msgpack::object::pack_members(packer, &descriptor, #extension_ref, |binding, packer| {
            match binding.member_index {
                #(#pack_arms)*
                _ => packer.pack_nil().map(|_| ()),
            }
        })
    };

    let deserialize = quote! {
        let descriptor = ctx.descriptor::<Self>()?;
        #(#slot_definitions)*
        #extension_slot
        senax_msgpack::object::unpack_members(unpacker, &descriptor, #extension_mut, |binding, unpacker| {
            match binding.member_index {
                #(#unpack_arms)*
                _ => unpacker.skip_value(),
            }
        })?;
        match descriptor.construction() {
            #(#construction_arms)*
            other => Err(senax_msgpack::DecodeError::Malformed(format!(
                "{} has no generated construction for {:?}",
                #name_str, other
            ))
            .into()),
        }
    };

    DerivedParts {
        shape,
        serialize,
        deserialize,
    }
}

fn derive_unit_enum(name_str: &str, container: &ContainerAttributes, variants: &[&Ident]) -> DerivedParts {
    let shape = quote! {
        senax_msgpack::TypeShape::new(#name_str, senax_msgpack::ShapeKind::Scalar)
    };
    let indices: Vec<u64> = (0..variants.len() as u64).collect();
    let names: Vec<String> = variants.iter().map(|v| v.to_string()).collect();

    let (serialize, deserialize) = if container.by_value {
        (
            quote! {
                let _ = ctx;
                let index: u64 = match self {
                    #(Self::#variants => #indices,)*
                };
                packer.pack_u64(index)?;
                Ok(())
            },
            quote! {
                let _ = ctx;
                let index: u64 = unpacker.read_int()?;
                match index {
                    #(#indices => Ok(Self::#variants),)*
                    other => Err(senax_msgpack::DecodeError::Malformed(format!(
                        "unknown variant index {} of {}",
                        other, #name_str
                    ))
                    .into()),
                }
            },
        )
    } else {
        (
            quote! {
                let _ = ctx;
                let name: &str = match self {
                    #(Self::#variants => #names,)*
                };
                packer.pack_str(name)?;
                Ok(())
            },
            quote! {
                let _ = ctx;
                let name = unpacker.read_str()?;
                match name.as_str() {
                    #(#names => Ok(Self::#variants),)*
                    other => Err(senax_msgpack::DecodeError::Malformed(format!(
                        "unknown variant '{}' of {}",
                        other, #name_str
                    ))
                    .into()),
                }
            },
        )
    };

    DerivedParts {
        shape,
        serialize,
        deserialize,
    }
}

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitInt, LitStr, Type, parse_macro_input};

/// Derive `Serializable`, `SerializableType` and `Field` for a named struct,
/// generating its field descriptor table.
///
/// The struct must also implement `Default`; the reader creates instances
/// through it unless a custom factory is registered.
///
/// # Type attributes
///
/// - `#[serialize(tag = "game.Material")]`: long-form type tag (defaults to
///   the struct name)
/// - `#[serialize(id = 12)]`: short numeric id
/// - `#[serialize(alias = "OldMaterial")]`: legacy name, may repeat
/// - `#[serialize(always_tag)]`: always write the type tag
///
/// # Field attributes
///
/// - `#[serialize(rename = "name")]`: serialized name
/// - `#[serialize(skip)]`: not serialized
/// - `#[serialize(read_only)]`: written but never assigned on read
/// - `#[serialize(value)]`: any serde type, stored as a primitive value
/// - `#[serialize(part)]`: shared objects in this field are parts of the
///   object, used to narrow mistyped references
///
/// ```ignore
/// #[derive(Default, Serializable)]
/// #[serialize(tag = "game.Mesh", id = 3)]
/// struct Mesh {
///     name: String,
///     #[serialize(value)]
///     bounds: Aabb,
///     #[serialize(part)]
///     material: Option<Ref<Material>>,
///     #[serialize(skip)]
///     gpu_handle: Option<u64>,
/// }
/// ```
#[proc_macro_derive(Serializable, attributes(serialize))]
pub fn derive_serializable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct TypeAttrs {
    tag: Option<String>,
    id: Option<u32>,
    aliases: Vec<String>,
    always_tag: bool,
}

struct FieldSpec<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    serialized: String,
    read_only: bool,
    value: bool,
    part: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Serializable cannot be derived for generic types",
        ));
    }

    let attrs = type_attrs(input)?;
    let tag = attrs.tag.unwrap_or_else(|| name.to_string());
    let short_id = match attrs.id {
        Some(id) => quote! { ::core::option::Option::Some(#id) },
        None => quote! { ::core::option::Option::None },
    };
    let aliases = &attrs.aliases;
    let always_tag = attrs.always_tag;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => {
                let mut specs = Vec::new();
                for field in &named.named {
                    if let Some(spec) = field_spec(field)? {
                        specs.push(spec);
                    }
                }
                specs
            }
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Serializable can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Serializable can only be derived for structs",
            ));
        }
    };

    let decls = fields.iter().map(|f| {
        let fname = f.ident.to_string();
        let serialized = &f.serialized;
        let shape = shape_expr(f);
        let writable = !f.read_only;
        quote! {
            ::redlilium_content::FieldDecl {
                name: #fname,
                serialized_name: #serialized,
                shape: #shape,
                writable: #writable,
            }
        }
    });

    let get_arms = fields.iter().map(|f| {
        let ident = f.ident;
        let fname = ident.to_string();
        let ty = f.ty;
        if f.value {
            quote! { #fname => ::redlilium_content::field::value_to_field(&self.#ident) }
        } else {
            quote! { #fname => <#ty as ::redlilium_content::Field>::to_field(&self.#ident) }
        }
    });

    let set_arms = fields.iter().map(|f| {
        let ident = f.ident;
        let fname = ident.to_string();
        let ty = f.ty;
        let convert = if f.value {
            quote! { ::redlilium_content::field::value_from_field::<#ty>(value)? }
        } else {
            quote! { <#ty as ::redlilium_content::Field>::from_field(value)? }
        };
        quote! {
            #fname => {
                self.#ident = #convert;
                ::core::result::Result::Ok(())
            }
        }
    });

    let embedded_arms = fields.iter().filter(|f| !f.value).map(|f| {
        let ident = f.ident;
        let fname = ident.to_string();
        let ty = f.ty;
        quote! {
            #fname => <#ty as ::redlilium_content::Field>::embedded_mut(&mut self.#ident, indices)
        }
    });

    let part_fields = fields.iter().filter(|f| f.part).map(|f| {
        let ident = f.ident;
        let ty = f.ty;
        quote! {
            <#ty as ::redlilium_content::Field>::collect_refs(&self.#ident, &mut parts);
        }
    });

    let unknown_field = quote! {
        ::core::result::Result::Err(::redlilium_content::FieldError::UnknownField {
            type_tag: #tag,
            field: ::std::string::ToString::to_string(name),
        })
    };

    Ok(quote! {
        impl ::redlilium_content::Serializable for #name {
            fn type_tag(&self) -> &'static str {
                #tag
            }

            fn field(
                &self,
                name: &str,
            ) -> ::core::result::Result<::redlilium_content::FieldRef<'_>, ::redlilium_content::FieldError> {
                match name {
                    #(#get_arms,)*
                    _ => #unknown_field,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: ::redlilium_content::FieldValue,
            ) -> ::core::result::Result<(), ::redlilium_content::FieldError> {
                match name {
                    #(#set_arms)*
                    _ => {
                        let _ = value;
                        #unknown_field
                    }
                }
            }

            fn embedded_mut(
                &mut self,
                name: &str,
                indices: &[usize],
            ) -> ::core::option::Option<&mut (dyn ::redlilium_content::Serializable + 'static)> {
                match name {
                    #(#embedded_arms,)*
                    _ => {
                        let _ = indices;
                        ::core::option::Option::None
                    }
                }
            }

            fn parts(&self) -> ::std::vec::Vec<::redlilium_content::ObjectRef> {
                #[allow(unused_mut)]
                let mut parts = ::std::vec::Vec::new();
                #(#part_fields)*
                parts
            }
        }

        impl ::redlilium_content::SerializableType for #name {
            const TYPE_TAG: &'static str = #tag;
            const SHORT_ID: ::core::option::Option<u32> = #short_id;
            const ALIASES: &'static [&'static str] = &[#(#aliases),*];
            const ALWAYS_EMIT_TYPE_TAG: bool = #always_tag;

            fn field_decls() -> ::std::vec::Vec<::redlilium_content::FieldDecl> {
                ::std::vec![#(#decls),*]
            }
        }

        impl ::redlilium_content::Field for #name {
            fn shape() -> ::redlilium_content::FieldShape {
                ::redlilium_content::FieldShape::Embedded(
                    ::redlilium_content::DeclaredType::of::<Self>(),
                )
            }

            fn to_field(
                &self,
            ) -> ::core::result::Result<::redlilium_content::FieldRef<'_>, ::redlilium_content::FieldError> {
                ::core::result::Result::Ok(::redlilium_content::FieldRef::Embedded(
                    ::core::option::Option::Some(self),
                ))
            }

            fn from_field(
                value: ::redlilium_content::FieldValue,
            ) -> ::core::result::Result<Self, ::redlilium_content::FieldError> {
                ::redlilium_content::field::embedded_from_field::<Self>(value)
            }

            fn embedded_mut(
                &mut self,
                indices: &[usize],
            ) -> ::core::option::Option<&mut (dyn ::redlilium_content::Serializable + 'static)> {
                if indices.is_empty() {
                    ::core::option::Option::Some(self)
                } else {
                    ::core::option::Option::None
                }
            }

            fn collect_refs(&self, out: &mut ::std::vec::Vec<::redlilium_content::ObjectRef>) {
                out.extend(<Self as ::redlilium_content::Serializable>::parts(self));
            }
        }
    })
}

/// Field shape expression. `value` fields are primitives regardless of type.
fn shape_expr(field: &FieldSpec<'_>) -> proc_macro2::TokenStream {
    let ty = field.ty;
    if field.value {
        quote! { ::redlilium_content::FieldShape::Primitive }
    } else {
        quote! { <#ty as ::redlilium_content::Field>::shape() }
    }
}

fn type_attrs(input: &DeriveInput) -> syn::Result<TypeAttrs> {
    let mut attrs = TypeAttrs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("serialize")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let tag: LitStr = meta.value()?.parse()?;
                if tag.value().is_empty() {
                    return Err(meta.error("type tag must not be empty"));
                }
                attrs.tag = Some(tag.value());
            } else if meta.path.is_ident("id") {
                let id: LitInt = meta.value()?.parse()?;
                attrs.id = Some(id.base10_parse()?);
            } else if meta.path.is_ident("alias") {
                let alias: LitStr = meta.value()?.parse()?;
                attrs.aliases.push(alias.value());
            } else if meta.path.is_ident("always_tag") {
                attrs.always_tag = true;
            } else {
                return Err(meta.error("expected `tag`, `id`, `alias` or `always_tag`"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

/// Parse one field's attributes. Returns `None` for skipped fields.
fn field_spec(field: &syn::Field) -> syn::Result<Option<FieldSpec<'_>>> {
    let Some(ident) = field.ident.as_ref() else {
        return Err(syn::Error::new_spanned(field, "expected a named field"));
    };
    let mut spec = FieldSpec {
        ident,
        ty: &field.ty,
        serialized: ident.to_string(),
        read_only: false,
        value: false,
        part: false,
    };
    let mut skip = false;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("serialize")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let name: LitStr = meta.value()?.parse()?;
                spec.serialized = name.value();
            } else if meta.path.is_ident("skip") {
                skip = true;
            } else if meta.path.is_ident("read_only") {
                spec.read_only = true;
            } else if meta.path.is_ident("value") {
                spec.value = true;
            } else if meta.path.is_ident("part") {
                spec.part = true;
            } else {
                return Err(meta.error(
                    "expected `rename`, `skip`, `read_only`, `value` or `part`",
                ));
            }
            Ok(())
        })?;
    }

    if spec.value && spec.part {
        return Err(syn::Error::new_spanned(
            ident,
            "`value` fields cannot hold parts",
        ));
    }
    Ok((!skip).then_some(spec))
}

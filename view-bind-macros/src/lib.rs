//! Procedural macros for view-bind

use darling::util::PathList;
use darling::{FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Bindable)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(bindable), supports(struct_named))]
struct BindableOpts {
    ident: syn::Ident,
    generics: syn::Generics,
    data: darling::ast::Data<(), BindableField>,

    /// Registered name; defaults to the struct name
    #[darling(default)]
    name: Option<String>,

    /// Describe as a view-model (the default)
    #[darling(default)]
    view_model: bool,

    /// Describe as a view component
    #[darling(default)]
    component: bool,

    /// Base type, for template matching and inherited members
    #[darling(default)]
    base: Option<syn::Path>,

    /// Interface marker traits, recorded as `dyn Trait`
    #[darling(default)]
    implements: PathList,

    /// Zero-argument `&mut self` methods exposed as commands
    #[darling(default)]
    methods: PathList,

    /// The type implements `ViewModelProvider` itself
    #[darling(default)]
    provider: bool,
}

/// Field-level attributes
#[derive(Debug, FromField)]
#[darling(attributes(bindable))]
struct BindableField {
    ident: Option<syn::Ident>,
    ty: syn::Type,

    /// Bindable property
    #[darling(default)]
    binding: bool,

    /// Reflected property that is not a binding target
    #[darling(default)]
    property: bool,

    /// Member name override
    #[darling(default)]
    name: Option<String>,

    /// Omit the setter
    #[darling(default)]
    read_only: bool,

    /// The object's `PropertyNotifier`
    #[darling(default)]
    notifier: bool,

    /// A `NativeEvent` exposed under the field name
    #[darling(default)]
    event: bool,
}

impl BindableField {
    fn member_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.ident.as_ref().map(|i| i.to_string()))
            .unwrap_or_default()
    }

    fn role_count(&self) -> usize {
        [self.binding, self.property, self.notifier, self.event]
            .iter()
            .filter(|set| **set)
            .count()
    }
}

fn method_ident(path: &syn::Path) -> syn::Result<&syn::Ident> {
    path.get_ident().ok_or_else(|| {
        syn::Error::new_spanned(path, "Bindable: methods are listed by name, e.g. `methods(reset)`")
    })
}

/// Derive macro for the `Bindable` and `Describe` traits
///
/// Implements `Bindable` (type key, `Any` access, notifier, events) and
/// generates a `Describe` impl building the type's `TypeDescriptor`.
///
/// Container options (`#[bindable(...)]` on the struct):
/// - `view_model` (default) or `component`
/// - `name = "..."`: registered type name
/// - `base = "path::Base"`: base type
/// - `implements(IFoo, IBar)`: interface marker traits
/// - `methods(reset, save)`: `fn(&mut self)` commands
/// - `provider`: forward `as_view_model_provider` to the type's own
///   `ViewModelProvider` impl
///
/// Field options:
/// - `binding` / `property`, with `name = "..."` and `read_only`
/// - `notifier`: the field holding the `PropertyNotifier`
/// - `event`: a `NativeEvent`, exposed under the field name or `name`
///
/// # Example
/// ```ignore
/// use view_bind::prelude::*;
///
/// #[derive(Bindable, Default)]
/// #[bindable(view_model, name = "Player", methods(heal))]
/// struct Player {
///     #[bindable(notifier)]
///     notifier: PropertyNotifier,
///     #[bindable(binding)]
///     health: f64,
///     #[bindable(binding, read_only)]
///     name: String,
/// }
///
/// impl Player {
///     fn heal(&mut self) {
///         self.health = 100.0;
///         self.notifier.raise("health");
///     }
/// }
/// ```
#[proc_macro_derive(Bindable, attributes(bindable))]
pub fn derive_bindable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match BindableOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    if !opts.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &opts.generics,
            "Bindable cannot be derived for generic types",
        )
        .to_compile_error()
        .into();
    }
    if opts.view_model && opts.component {
        return syn::Error::new_spanned(
            &input.ident,
            "Bindable: `view_model` and `component` are mutually exclusive",
        )
        .to_compile_error()
        .into();
    }

    let fields = match &opts.data {
        darling::ast::Data::Struct(fields) => fields,
        _ => {
            return syn::Error::new_spanned(&input, "Bindable can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    match expand(&opts, fields.iter().collect()) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(opts: &BindableOpts, fields: Vec<&BindableField>) -> syn::Result<TokenStream2> {
    let name = &opts.ident;
    let type_name = opts.name.clone().unwrap_or_else(|| name.to_string());

    let mut notifier = None;
    let mut event_arms = Vec::new();
    let mut members = Vec::new();

    for field in &fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        if field.role_count() > 1 {
            return Err(syn::Error::new_spanned(
                ident,
                "Bindable: a field takes one of `binding`, `property`, `notifier` or `event`",
            ));
        }
        if field.read_only && !(field.binding || field.property) {
            return Err(syn::Error::new_spanned(
                ident,
                "Bindable: `read_only` applies to `binding` or `property` fields",
            ));
        }

        let member = field.member_name();
        let ty = &field.ty;

        if field.notifier {
            if notifier.is_some() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Bindable: only one field can be the notifier",
                ));
            }
            notifier = Some(ident.clone());
        } else if field.event {
            event_arms.push(quote! {
                #member => ::core::option::Option::Some(::core::clone::Clone::clone(&self.#ident))
            });
            members.push(quote! { .event(#member) });
        } else if field.binding || field.property {
            let register = if field.binding {
                quote! { binding }
            } else {
                quote! { property }
            };
            let setter = if field.read_only {
                quote! { ::core::option::Option::None }
            } else {
                quote! {
                    ::core::option::Option::Some(|this: &mut Self, value: #ty| this.#ident = value)
                }
            };
            members.push(quote! {
                .#register(
                    #member,
                    |this: &Self| -> #ty { ::core::clone::Clone::clone(&this.#ident) },
                    #setter,
                )
            });
        }
    }

    for method in opts.methods.iter() {
        let method = method_ident(method)?;
        let method_name = method.to_string();
        members.push(quote! { .method(#method_name, Self::#method) });
    }

    let kind = if opts.component {
        quote! { ::view_bind::reflect::TypeKind::Component }
    } else {
        quote! { ::view_bind::reflect::TypeKind::ViewModel }
    };
    let base = opts.base.as_ref().map(|base| quote! { .base::<#base>() });
    let interfaces = opts
        .implements
        .iter()
        .map(|iface| quote! { .implements::<dyn #iface>() });

    let notifier_fn = notifier.map(|field| {
        quote! {
            fn notifier(&self) -> ::core::option::Option<::view_bind::notify::PropertyNotifier> {
                ::core::option::Option::Some(::core::clone::Clone::clone(&self.#field))
            }
        }
    });

    let event_fn = (!event_arms.is_empty()).then(|| {
        quote! {
            fn event(&self, name: &str) -> ::core::option::Option<::view_bind::event::NativeEvent> {
                match name {
                    #(#event_arms,)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    });

    let provider_fn = opts.provider.then(|| {
        quote! {
            fn as_view_model_provider(
                &self,
            ) -> ::core::option::Option<&dyn ::view_bind::reflect::ViewModelProvider> {
                ::core::option::Option::Some(self)
            }
        }
    });

    Ok(quote! {
        impl ::view_bind::reflect::Bindable for #name {
            fn type_key(&self) -> ::view_bind::reflect::TypeKey {
                ::view_bind::reflect::TypeKey::of::<Self>()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            #notifier_fn
            #event_fn
            #provider_fn
        }

        impl ::view_bind::reflect::Describe for #name {
            fn describe() -> ::view_bind::reflect::TypeDescriptor {
                ::view_bind::reflect::TypeDescriptor::builder::<Self>(#type_name)
                    .kind(#kind)
                    #base
                    #(#interfaces)*
                    #(#members)*
                    .build()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(src: &str) -> syn::Result<String> {
        let input: DeriveInput = syn::parse_str(src)?;
        let opts = BindableOpts::from_derive_input(&input)
            .map_err(|e| syn::Error::new(proc_macro2::Span::call_site(), e.to_string()))?;
        let fields = match &opts.data {
            darling::ast::Data::Struct(fields) => fields.iter().collect(),
            _ => Vec::new(),
        };
        expand(&opts, fields).map(|tokens| tokens.to_string())
    }

    #[test]
    fn test_expands_members() {
        let out = expand_str(
            r#"
            #[bindable(name = "Player", methods(heal))]
            struct Player {
                #[bindable(notifier)]
                notifier: PropertyNotifier,
                #[bindable(binding)]
                health: f64,
                #[bindable(property, name = "title", read_only)]
                label: String,
                #[bindable(event)]
                clicked: NativeEvent,
                ignored: u8,
            }
            "#,
        )
        .unwrap();
        assert!(out.contains("builder :: < Self > (\"Player\")"));
        assert!(out.contains(". binding (\"health\""));
        assert!(out.contains(". property (\"title\""));
        assert!(out.contains(". method (\"heal\" , Self :: heal)"));
        assert!(out.contains(". event (\"clicked\")"));
        assert!(out.contains("fn notifier"));
        assert!(!out.contains("ignored"));
    }

    #[test]
    fn test_rejects_conflicting_roles() {
        let err = expand_str(
            r#"
            struct Broken {
                #[bindable(binding, event)]
                value: f64,
            }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("one of"));
    }

    #[test]
    fn test_rejects_two_notifiers() {
        let err = expand_str(
            r#"
            struct Broken {
                #[bindable(notifier)]
                a: PropertyNotifier,
                #[bindable(notifier)]
                b: PropertyNotifier,
            }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("notifier"));
    }
}

use proc_macro::TokenStream;
use proc_macro_error::abort;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::{parse_macro_input, Data, DeriveInput};

use crate::bean_attr::parse_bean_attrs;
use crate::field_attr::{parse_field, FieldMarker};

pub(crate) fn derive_bean_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        abort!(
            input.generics.span(),
            "#[derive(Bean)] does not support generic types";
            help = "wrap the generic type in a concrete struct"
        );
    }
    let Data::Struct(data) = &input.data else {
        abort!(name.span(), "#[derive(Bean)] can only be used on structs");
    };

    let attrs = parse_bean_attrs(&input.attrs);

    let mut accessors = Vec::new();
    let mut injections = Vec::new();
    let mut properties = Vec::new();

    for field in &data.fields {
        let Some(marker) = parse_field(field) else {
            continue;
        };
        let Some(ident) = &field.ident else {
            abort!(field.span(), "#[inject] and #[value] require named fields");
        };

        let ty = &field.ty;
        let field_name = ident.unraw().to_string();
        let accessor = format_ident!("__trellis_field_{}", ident.unraw());
        accessors.push(quote! {
            fn #accessor(bean: &#name) -> &#ty {
                &bean.#ident
            }
        });

        match marker {
            FieldMarker::Inject(inject) => {
                let mut spec = quote! {
                    ::trellis_core::InjectionSpec::field(#field_name, #accessor)
                };
                if let Some(qualifier) = inject.qualifier {
                    spec = quote! { #spec.qualifier(#qualifier) };
                }
                if inject.optional {
                    spec = quote! { #spec.optional() };
                }
                if inject.lazy {
                    spec = quote! { #spec.lazy() };
                }
                if let Some(level) = inject.level {
                    spec = quote! { #spec.level(#level) };
                }
                injections.push(quote! { .inject(#spec) });
            }
            FieldMarker::Value(value) => {
                let key = value.key;
                let mut spec = quote! {
                    ::trellis_core::PropertySpec::field(#field_name, #key, #accessor)
                };
                if let Some(default) = value.default {
                    spec = quote! { #spec.default_value(#default) };
                }
                if let Some(layout) = value.layout {
                    spec = quote! { #spec.layout(#layout) };
                }
                properties.push(quote! { .property(#spec) });
            }
        }
    }

    let mut casters = Vec::new();
    let mut views = Vec::new();
    for (i, ty) in attrs.provides.iter().enumerate() {
        let caster = format_ident!("__trellis_view_{}", i);
        casters.push(quote! {
            fn #caster(
                instance: &::std::sync::Arc<dyn ::std::any::Any + ::std::marker::Send + ::std::marker::Sync>,
            ) -> ::std::option::Option<::trellis_core::BoxedRef> {
                let bean = ::std::sync::Arc::clone(instance).downcast::<#name>().ok()?;
                let view: ::std::sync::Arc<#ty> = bean;
                ::std::option::Option::Some(::std::boxed::Box::new(view) as ::trellis_core::BoxedRef)
            }
        });
        views.push(quote! {
            .provides(::trellis_core::TypeKey::of::<#ty>(), #caster)
        });
    }

    let capabilities = capabilities(&attrs, name);
    let component = if attrs.component {
        let name_str = name.unraw().to_string();
        quote! {
            ::trellis_core::inventory::submit! {
                ::trellis_core::ComponentRegistry {
                    name: ::std::concat!(::std::module_path!(), "::", #name_str),
                    create: || ::trellis_core::Scan::bean(<#name as ::std::default::Default>::default()),
                }
            }
        }
    } else {
        quote! {}
    };

    let expanded = quote! {
        impl ::trellis_core::Bean for #name {
            fn definition() -> ::trellis_core::BeanDef {
                #(#accessors)*
                #(#casters)*

                ::trellis_core::BeanDef::of::<Self>()
                    #(#injections)*
                    #(#properties)*
                    #(#views)*
            }

            #capabilities
        }

        #component
    };

    TokenStream::from(expanded)
}

fn capabilities(attrs: &crate::bean_attr::BeanAttrs, name: &syn::Ident) -> proc_macro2::TokenStream {
    if !attrs.has_capabilities() {
        return quote! {};
    }

    let arc = |capability: proc_macro2::TokenStream| {
        quote! {
            ::std::option::Option::Some(
                ::std::sync::Arc::clone(this) as ::std::sync::Arc<dyn #capability>
            )
        }
    };

    let mut fields = Vec::new();
    if attrs.named {
        let value = arc(quote! { ::trellis_core::NamedBean });
        fields.push(quote! { named: #value, });
    }
    if attrs.ordered {
        let value = arc(quote! { ::trellis_core::OrderedBean });
        fields.push(quote! { ordered: #value, });
    }
    if attrs.initializing {
        let value = arc(quote! { ::trellis_core::InitializingBean });
        fields.push(quote! { initializing: #value, });
    }
    if attrs.disposable {
        let value = arc(quote! { ::trellis_core::DisposableBean });
        fields.push(quote! { disposable: #value, });
    }
    if attrs.factory {
        let value = arc(quote! { ::trellis_core::FactoryBean });
        fields.push(quote! { factory: #value, });
    }
    if attrs.resolver {
        let value = arc(quote! { ::trellis_core::PropertyResolver });
        fields.push(quote! { resolver: #value, });
    }

    quote! {
        fn capabilities(this: &::std::sync::Arc<#name>) -> ::trellis_core::Capabilities {
            ::trellis_core::Capabilities {
                #(#fields)*
                ..::std::default::Default::default()
            }
        }
    }
}

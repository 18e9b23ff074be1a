//! `#[bean(...)]` 结构体属性解析

use proc_macro_error::abort;
use syn::punctuated::Punctuated;
use syn::{Attribute, Token, Type};

/// 结构体上声明的能力与视图
#[derive(Default)]
pub(crate) struct BeanAttrs {
    pub named: bool,
    pub ordered: bool,
    pub initializing: bool,
    pub disposable: bool,
    pub factory: bool,
    pub resolver: bool,
    pub component: bool,
    pub provides: Vec<Type>,
}

impl BeanAttrs {
    pub(crate) fn has_capabilities(&self) -> bool {
        self.named
            || self.ordered
            || self.initializing
            || self.disposable
            || self.factory
            || self.resolver
    }
}

/// 合并所有 `#[bean(...)]`，可以分多次书写
pub(crate) fn parse_bean_attrs(attrs: &[Attribute]) -> BeanAttrs {
    let mut out = BeanAttrs::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("bean")) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("provides") {
                let content;
                syn::parenthesized!(content in meta.input);
                let types = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
                for ty in types {
                    if !matches!(ty, Type::TraitObject(_)) {
                        return Err(syn::Error::new_spanned(
                            &ty,
                            "provides(...) expects trait object types, e.g. provides(dyn Service)",
                        ));
                    }
                    out.provides.push(ty);
                }
                return Ok(());
            }

            let flag = if meta.path.is_ident("named") {
                &mut out.named
            } else if meta.path.is_ident("ordered") {
                &mut out.ordered
            } else if meta.path.is_ident("initializing") {
                &mut out.initializing
            } else if meta.path.is_ident("disposable") {
                &mut out.disposable
            } else if meta.path.is_ident("factory") {
                &mut out.factory
            } else if meta.path.is_ident("resolver") {
                &mut out.resolver
            } else if meta.path.is_ident("component") {
                &mut out.component
            } else {
                return Err(meta.error(
                    "unknown bean modifier, expected one of: named, ordered, initializing, \
                     disposable, factory, resolver, component, provides(..)",
                ));
            };
            *flag = true;
            Ok(())
        });

        if let Err(e) = result {
            abort!(e.span(), "{}", e);
        }
    }

    out
}

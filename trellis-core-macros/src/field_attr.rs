//! 字段标记解析：`#[inject(...)]` 与 `#[value(...)]`

use proc_macro_error::abort;
use syn::parse::ParseStream;
use syn::spanned::Spanned;
use syn::{Attribute, Expr, ExprLit, ExprUnary, Field, Ident, Lit, LitStr, Meta, Token, UnOp};

#[derive(Default)]
pub(crate) struct InjectAttr {
    pub qualifier: Option<LitStr>,
    pub optional: bool,
    pub lazy: bool,
    pub level: Option<i32>,
}

pub(crate) struct ValueAttr {
    pub key: LitStr,
    pub default: Option<String>,
    pub layout: Option<LitStr>,
}

pub(crate) enum FieldMarker {
    Inject(InjectAttr),
    Value(ValueAttr),
}

/// 解析字段上的标记；未标记返回 `None`
pub(crate) fn parse_field(field: &Field) -> Option<FieldMarker> {
    let mut marker = None;

    for attr in &field.attrs {
        let parsed = if attr.path().is_ident("inject") {
            FieldMarker::Inject(parse_inject(attr))
        } else if attr.path().is_ident("value") {
            FieldMarker::Value(parse_value(attr))
        } else {
            continue;
        };
        if marker.is_some() {
            abort!(
                attr.span(),
                "a field can carry only one #[inject] or #[value] marker"
            );
        }
        marker = Some(parsed);
    }

    marker
}

fn parse_inject(attr: &Attribute) -> InjectAttr {
    let mut out = InjectAttr::default();
    if let Meta::Path(_) = attr.meta {
        return out;
    }

    let result = attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("bean") {
            let name: LitStr = meta.value()?.parse()?;
            if name.value().trim().is_empty() {
                return Err(syn::Error::new(name.span(), "bean name must not be empty"));
            }
            out.qualifier = Some(name);
        } else if meta.path.is_ident("optional") {
            out.optional = true;
        } else if meta.path.is_ident("lazy") {
            out.lazy = true;
        } else if meta.path.is_ident("level") {
            let expr: Expr = meta.value()?.parse()?;
            let level = literal_int(&expr).ok_or_else(|| {
                syn::Error::new_spanned(&expr, "level must be an integer literal")
            })?;
            if level < -1 {
                return Err(syn::Error::new_spanned(
                    &expr,
                    "level must be -1 (all ancestors), 0 (nearest) or a positive depth",
                ));
            }
            out.level = Some(level);
        } else {
            return Err(meta.error(
                "unknown inject modifier, expected `bean = \"..\"`, `optional`, `lazy` or `level = n`",
            ));
        }
        Ok(())
    });

    if let Err(e) = result {
        abort!(e.span(), "{}", e);
    }
    out
}

fn parse_value(attr: &Attribute) -> ValueAttr {
    let result = attr.parse_args_with(|input: ParseStream| {
        let key: LitStr = input.parse()?;
        if key.value().trim().is_empty() {
            return Err(syn::Error::new(key.span(), "property key must not be empty"));
        }

        let mut default = None;
        let mut layout = None;
        while input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            if ident == "default" {
                let expr: Expr = input.parse()?;
                default = Some(literal_text(&expr).ok_or_else(|| {
                    syn::Error::new_spanned(&expr, "default must be a literal")
                })?);
            } else if ident == "layout" {
                layout = Some(input.parse::<LitStr>()?);
            } else {
                return Err(syn::Error::new(
                    ident.span(),
                    "unknown value modifier, expected `default` or `layout`",
                ));
            }
        }

        Ok(ValueAttr {
            key,
            default,
            layout,
        })
    });

    match result {
        Ok(value) => value,
        Err(e) => abort!(e.span(), "{}", e),
    }
}

fn literal_int(expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(int), ..
        }) => int.base10_parse().ok(),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => literal_int(expr).map(|v| -v),
        Expr::Group(group) => literal_int(&group.expr),
        _ => None,
    }
}

/// 默认值统一转成文本，再由 `FromProperty` 解析
fn literal_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Str(s) => Some(s.value()),
            Lit::Int(i) => Some(i.base10_digits().to_string()),
            Lit::Float(f) => Some(f.base10_digits().to_string()),
            Lit::Bool(b) => Some(b.value.to_string()),
            Lit::Char(c) => Some(c.value().to_string()),
            _ => None,
        },
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => literal_text(expr).map(|text| format!("-{}", text)),
        Expr::Group(group) => literal_text(&group.expr),
        _ => None,
    }
}

//! 扫描输入
//!
//! 上下文接收一组 [`Scan`]，扫描阶段把嵌套列表和 [`Scanner`] 展开成扁平序列，
//! 属性源、资源包、属性解析器作为旁路输入单独处理，不注册为 bean。

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::bean::{Bean, Candidate, Object};
use crate::context::ChildContext;
use crate::error::{panic_message, Error, Result};
use crate::properties::{PropertyResolver, PropertySource};
use crate::resource::ResourceSource;

/// 惰性的 bean 提供者
pub trait Scanner: Send + Sync {
    fn beans(&self) -> Vec<Scan>;
}

/// 一个扫描输入
#[derive(Clone)]
pub enum Scan {
    /// 派生了 `Bean` 的实例
    Bean(Candidate),
    /// 函数或其他共享值，以 `T` 类型注册
    Function(Object),
    Properties(PropertySource),
    Resources(ResourceSource),
    Resolver(Arc<dyn PropertyResolver>),
    Child(Arc<ChildContext>),
    Scanner(Arc<dyn Scanner>),
    List(Vec<Scan>),
    /// 空输入，直接跳过
    Nothing,
}

impl Scan {
    pub fn bean<B: Bean>(bean: B) -> Self {
        Scan::Bean(Candidate::new(Arc::new(bean)))
    }

    /// 已经共享的 bean，调用方可以保留同一个 `Arc`
    pub fn shared<B: Bean>(bean: Arc<B>) -> Self {
        Scan::Bean(Candidate::new(bean))
    }

    /// 以 `T` 类型注册一个共享值，例如 `Arc<dyn Fn() -> String + Send + Sync>`
    pub fn function<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Scan::Function(Object::shared(value))
    }

    pub fn resolver(resolver: Arc<dyn PropertyResolver>) -> Self {
        Scan::Resolver(resolver)
    }

    pub fn scanner(scanner: impl Scanner + 'static) -> Self {
        Scan::Scanner(Arc::new(scanner))
    }

    pub fn child(child: ChildContext) -> Self {
        Scan::Child(Arc::new(child))
    }
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scan::Bean(c) => write!(f, "Bean({})", c.class()),
            Scan::Function(o) => write!(f, "Function({})", o.class()),
            Scan::Properties(p) => write!(f, "Properties({:?})", p.path),
            Scan::Resources(r) => write!(f, "Resources({})", r.name),
            Scan::Resolver(r) => write!(f, "Resolver(priority={})", r.priority()),
            Scan::Child(c) => write!(f, "Child({})", c.role()),
            Scan::Scanner(_) => f.write_str("Scanner"),
            Scan::List(list) => f.debug_list().entries(list).finish(),
            Scan::Nothing => f.write_str("Nothing"),
        }
    }
}

/// 可以作为扫描输入的值
pub trait IntoScan {
    fn into_scan(self) -> Scan;
}

impl<T: Bean> IntoScan for T {
    fn into_scan(self) -> Scan {
        Scan::bean(self)
    }
}

impl IntoScan for Scan {
    fn into_scan(self) -> Scan {
        self
    }
}

impl IntoScan for PropertySource {
    fn into_scan(self) -> Scan {
        Scan::Properties(self)
    }
}

impl IntoScan for ResourceSource {
    fn into_scan(self) -> Scan {
        Scan::Resources(self)
    }
}

/// 构造扫描输入列表
///
/// ```ignore
/// let ctx = Context::new(beans![
///     UserRepository::default(),
///     Scan::shared(service.clone()),
///     PropertySource::file("config:application.properties"),
/// ])?;
/// ```
#[macro_export]
macro_rules! beans {
    ($($item:expr),* $(,)?) => {
        vec![$($crate::IntoScan::into_scan($item)),*]
    };
}

/// 展开后的单个输入
pub(crate) enum Item {
    Bean(Candidate),
    Function(Object),
    Properties(PropertySource),
    Resources(ResourceSource),
    Resolver(Arc<dyn PropertyResolver>),
}

/// 展开嵌套输入，每个元素附带位置（如 `"2.0.1"`）
pub(crate) fn flatten(items: Vec<Scan>) -> Result<Vec<(String, Item)>> {
    let mut out = Vec::new();
    flatten_into("", items, &mut out)?;
    Ok(out)
}

fn flatten_into(prefix: &str, items: Vec<Scan>, out: &mut Vec<(String, Item)>) -> Result<()> {
    for (i, scan) in items.into_iter().enumerate() {
        let pos = if prefix.is_empty() {
            i.to_string()
        } else {
            format!("{}.{}", prefix, i)
        };
        match scan {
            Scan::Nothing => {}
            Scan::Bean(candidate) => out.push((pos, Item::Bean(candidate))),
            Scan::Child(child) => out.push((pos, Item::Bean(Candidate::new(child)))),
            Scan::Function(object) => out.push((pos, Item::Function(object))),
            Scan::Properties(source) => out.push((pos, Item::Properties(source))),
            Scan::Resources(source) => out.push((pos, Item::Resources(source))),
            Scan::Resolver(resolver) => out.push((pos, Item::Resolver(resolver))),
            Scan::List(list) => flatten_into(&pos, list, out)?,
            Scan::Scanner(scanner) => {
                let nested = catch_unwind(AssertUnwindSafe(|| scanner.beans())).map_err(
                    |payload| Error::Panic {
                        bean: format!("scanner at position {}", pos),
                        phase: "scan",
                        message: panic_message(payload),
                    },
                )?;
                flatten_into(&pos, nested, out)?;
            }
        }
    }
    Ok(())
}

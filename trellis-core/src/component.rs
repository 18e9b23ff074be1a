use crate::scan::{Scan, Scanner};
use std::fmt;
use std::sync::Arc;

/// 组件注册表，由 `#[bean(component)]` 通过 inventory 提交
pub struct ComponentRegistry {
    pub name: &'static str,
    pub create: fn() -> Scan,
}

inventory::collect!(ComponentRegistry);

type ComponentFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 组件扫描器
///
/// 为每个注册的组件生成一个默认实例，按组件名排序。
///
/// ```ignore
/// #[derive(Bean, Default)]
/// #[bean(component)]
/// struct AuditLog { /* ... */ }
///
/// let ctx = Context::new(vec![Scan::scanner(ComponentScanner::new())])?;
/// ```
#[derive(Clone, Default)]
pub struct ComponentScanner {
    filter: Option<ComponentFilter>,
}

impl ComponentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只生成名称满足条件的组件
    pub fn filtered(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            filter: Some(Arc::new(predicate)),
        }
    }

    /// 满足过滤条件的组件名
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = inventory::iter::<ComponentRegistry>()
            .map(|c| c.name)
            .filter(|name| self.accepts(name))
            .collect();
        names.sort_unstable();
        names
    }

    fn accepts(&self, name: &str) -> bool {
        self.filter.as_ref().map_or(true, |f| f(name))
    }
}

impl Scanner for ComponentScanner {
    fn beans(&self) -> Vec<Scan> {
        let mut components: Vec<_> = inventory::iter::<ComponentRegistry>()
            .filter(|c| self.accepts(c.name))
            .collect();
        components.sort_by_key(|c| c.name);

        tracing::debug!("Component scan found {} component(s)", components.len());
        components.into_iter().map(|c| (c.create)()).collect()
    }
}

impl fmt::Debug for ComponentScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentScanner")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

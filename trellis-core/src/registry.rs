//! Bean 注册表
//!
//! 按类型与名称索引当前上下文可见的 bean，并缓存查询结果。
//! 写入只追加：一旦某个类型被记录（即使为空列表），后续查询直接命中缓存。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::BeanHandle;
use crate::error::Result;
use crate::resource::{Resource, ResourceBundle, ResourceSource};
use crate::types::TypeKey;

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<TypeKey, Vec<Arc<BeanHandle>>>,
    by_name: HashMap<String, Vec<Arc<BeanHandle>>>,
    resources: HashMap<String, ResourceBundle>,
}

#[derive(Default)]
pub(crate) struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `Some(空列表)` 表示该类型已查询过且没有实现
    pub(crate) fn find_by_type(&self, key: TypeKey) -> Option<Vec<Arc<BeanHandle>>> {
        self.inner.read().by_type.get(&key).cloned()
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<Vec<Arc<BeanHandle>>> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// 记录一个类型的候选列表；空列表同样记录为哨兵
    pub(crate) fn add_bean_list(&self, key: TypeKey, list: &[Arc<BeanHandle>]) {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let entry = inner.by_type.entry(key).or_default();
        for handle in list {
            if entry.iter().any(|h| Arc::ptr_eq(h, handle)) {
                continue;
            }
            entry.push(handle.clone());
            add_name(&mut inner.by_name, handle);
        }
    }

    /// 仅加入名称索引（工厂产出物化或改名之后）
    pub(crate) fn add_named(&self, handle: &Arc<BeanHandle>) {
        add_name(&mut self.inner.write().by_name, handle);
    }

    pub(crate) fn add_resource_source(&self, source: &ResourceSource) -> Result<()> {
        self.inner
            .write()
            .resources
            .entry(source.name.clone())
            .or_default()
            .merge(source)
    }

    pub(crate) fn find_resource(&self, bundle: &str, path: &str) -> Option<Resource> {
        self.inner
            .read()
            .resources
            .get(bundle)
            .and_then(|b| b.get(path))
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_type.clear();
        inner.by_name.clear();
        inner.resources.clear();
    }
}

fn add_name(by_name: &mut HashMap<String, Vec<Arc<BeanHandle>>>, handle: &Arc<BeanHandle>) {
    let list = by_name.entry(handle.name()).or_default();
    if !list.iter().any(|h| Arc::ptr_eq(h, handle)) {
        list.push(handle.clone());
    }
}

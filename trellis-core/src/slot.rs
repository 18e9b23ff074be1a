//! 注入槽
//!
//! bean 以 `Arc<T>` 共享，所以注入目标使用内部可变的容器：
//! [`Inject`]（单个）、[`InjectList`]（有序列表）、[`InjectMap`]（按名称的映射）
//! 以及属性注入用的 [`Value`]。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::convert::FromProperty;
use crate::types::TypeKey;

/// 类型擦除后的 `Arc<T>`，由 bean 的视图转换函数生成
pub type BoxedRef = Box<dyn Any + Send>;

/// 字段形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    List,
    Map,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::List => write!(f, "list"),
            Shape::Map => write!(f, "map"),
        }
    }
}

/// 注入槽写入失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// 传入的值不是槽的目标类型
    Mismatch(&'static str),
    /// 单值槽已经被写入
    AlreadySet,
    /// map 槽中名称重复
    DuplicateKey(String),
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::Mismatch(target) => write!(f, "value is not an Arc<{}>", target),
            SlotError::AlreadySet => write!(f, "field is already injected"),
            SlotError::DuplicateKey(key) => write!(f, "duplicate key '{}'", key),
        }
    }
}

/// 依赖注入槽
pub trait Slot: Send + Sync + 'static {
    /// 字段形态
    fn shape() -> Shape
    where
        Self: Sized;

    /// 依赖类型（集合字段为元素类型）
    fn target() -> TypeKey
    where
        Self: Sized;

    /// 写入一个候选；`position` 是排序后的位置，`name` 是候选的逻辑名
    fn put(&self, position: usize, name: &str, value: BoxedRef) -> Result<(), SlotError>;
}

/// 属性注入槽
pub trait PropertySlot: Send + Sync + 'static {
    fn assign(&self, raw: &str, layout: Option<&str>) -> Result<(), String>;

    fn is_assigned(&self) -> bool;
}

fn unbox<T: ?Sized + Send + Sync + 'static>(value: BoxedRef) -> Result<Arc<T>, SlotError> {
    value
        .downcast::<Arc<T>>()
        .map(|boxed| *boxed)
        .map_err(|_| SlotError::Mismatch(std::any::type_name::<T>()))
}

/// 单个依赖
///
/// 解引用一个尚未注入的 `Inject` 会 panic；可选字段请使用 [`Inject::get`]。
pub struct Inject<T: ?Sized + Send + Sync + 'static> {
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Inject<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    pub fn is_injected(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for Inject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.cell.get() {
            Some(value) => value,
            None => panic!(
                "Inject<{}> dereferenced before injection",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("target", &std::any::type_name::<T>())
            .field("injected", &self.is_injected())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Slot for Inject<T> {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn target() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn put(&self, _position: usize, _name: &str, value: BoxedRef) -> Result<(), SlotError> {
        let value = unbox::<T>(value)?;
        self.cell.set(value).map_err(|_| SlotError::AlreadySet)
    }
}

/// 有序的依赖列表
pub struct InjectList<T: ?Sized + Send + Sync + 'static> {
    items: RwLock<Vec<(usize, Arc<T>)>>,
}

impl<T: ?Sized + Send + Sync + 'static> InjectList<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    /// 当前注入的元素快照
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.read().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.read().get(index).map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for InjectList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for InjectList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectList")
            .field("target", &std::any::type_name::<T>())
            .field("len", &self.len())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Slot for InjectList<T> {
    fn shape() -> Shape {
        Shape::List
    }

    fn target() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn put(&self, position: usize, _name: &str, value: BoxedRef) -> Result<(), SlotError> {
        let value = unbox::<T>(value)?;
        let mut items = self.items.write();
        // 工厂产出的元素稍后才到达，按位置插入保持顺序
        let at = items.partition_point(|(p, _)| *p <= position);
        items.insert(at, (position, value));
        Ok(())
    }
}

/// 以 bean 名称为键的依赖映射
pub struct InjectMap<T: ?Sized + Send + Sync + 'static> {
    entries: RwLock<BTreeMap<String, Arc<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> InjectMap<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> BTreeMap<String, Arc<T>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for InjectMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for InjectMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectMap")
            .field("target", &std::any::type_name::<T>())
            .field("keys", &self.keys())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Slot for InjectMap<T> {
    fn shape() -> Shape {
        Shape::Map
    }

    fn target() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn put(&self, _position: usize, name: &str, value: BoxedRef) -> Result<(), SlotError> {
        let value = unbox::<T>(value)?;
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(SlotError::DuplicateKey(name.to_string()));
        }
        entries.insert(name.to_string(), value);
        Ok(())
    }
}

/// 属性值
///
/// 构造期间从 `Properties` 读取并转换一次。
pub struct Value<T: FromProperty> {
    cell: OnceLock<T>,
}

impl<T: FromProperty> Value<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T: FromProperty> Default for Value<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FromProperty> Deref for Value<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.cell.get() {
            Some(value) => value,
            None => panic!(
                "Value<{}> read before property injection",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T: FromProperty + fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.cell.get()).finish()
    }
}

impl<T: FromProperty> PropertySlot for Value<T> {
    fn assign(&self, raw: &str, layout: Option<&str>) -> Result<(), String> {
        let value = T::from_property(raw, layout)?;
        self.cell
            .set(value)
            .map_err(|_| "property is already assigned".to_string())
    }

    fn is_assigned(&self) -> bool {
        self.cell.get().is_some()
    }
}

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型标识
///
/// 对应 bean 的声明类型。`sized` 为 true 表示具体类型（按类型直接匹配），
/// 否则是 `dyn Trait` / `dyn Fn(..)` 这样的接口类型（按候选搜索匹配）。
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    sized: bool,
}

impl TypeKey {
    /// 获取类型 `T` 的标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            // 接口类型的引用是胖指针
            sized: std::mem::size_of::<&T>() == std::mem::size_of::<&()>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 是否为接口（trait object）类型
    pub fn is_interface(&self) -> bool {
        !self.sized
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Service: Send + Sync {}
    struct Impl;

    #[test]
    fn test_type_key_kind() {
        assert!(!TypeKey::of::<Impl>().is_interface());
        assert!(TypeKey::of::<dyn Service>().is_interface());
        assert!(TypeKey::of::<dyn Fn() -> i32 + Send + Sync>().is_interface());
        assert_eq!(TypeKey::of::<Impl>(), TypeKey::of::<Impl>());
        assert_ne!(TypeKey::of::<Impl>(), TypeKey::of::<dyn Service>());
        assert!(TypeKey::of::<Impl>().name().ends_with("Impl"));
    }
}

use anyhow::anyhow;

/// 具名 bean
///
/// 未覆盖 `bean_name` 时使用类型名。
pub trait NamedBean: Send + Sync {
    fn bean_name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// 有序 bean，数值越小越靠前
pub trait OrderedBean: Send + Sync {
    fn bean_order(&self) -> i32 {
        0
    }
}

/// 初始化回调（类似 @PostConstruct）
///
/// 在所有非 lazy 依赖初始化之后调用。声明了能力却没有实现方法时返回错误。
pub trait InitializingBean: Send + Sync {
    fn post_construct(&self) -> anyhow::Result<()> {
        Err(anyhow!(
            "bean '{}' does not implement post_construct, but declares the initializing capability",
            std::any::type_name::<Self>()
        ))
    }
}

/// 销毁回调（类似 @PreDestroy）
///
/// close 时按构造顺序的逆序调用。
pub trait DisposableBean: Send + Sync {
    fn destroy(&self) -> anyhow::Result<()> {
        Err(anyhow!(
            "bean '{}' does not implement destroy, but declares the disposable capability",
            std::any::type_name::<Self>()
        ))
    }
}

/// Bean 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// 已分配占位，尚无实例（工厂产出）
    Allocated,
    /// 实例已就绪，尚未装配
    Created,
    /// 正在解析依赖
    Constructing,
    /// 可用
    Initialized,
    Destroying,
    Destroyed,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifecycle::Allocated => "allocated",
            Lifecycle::Created => "created",
            Lifecycle::Constructing => "constructing",
            Lifecycle::Initialized => "initialized",
            Lifecycle::Destroying => "destroying",
            Lifecycle::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

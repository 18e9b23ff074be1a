// trellis-core: 基于字段注入的依赖注入运行时
//
// 提供：
// - 按类型、trait object、名称解析依赖，支持列表与映射注入
// - 父子上下文与按层级查找
// - FactoryBean、lazy 依赖、循环检测
// - post_construct / destroy 生命周期与 reload
// - 属性注入（.properties / TOML）与资源包

extern crate self as trellis_core;

pub mod bean;
pub mod component;
pub mod context;
pub mod convert;
pub mod error;
pub mod factory;
mod injection;
mod lexer;
pub mod lifecycle;
pub mod logging;
pub mod properties;
mod registry;
pub mod resource;
pub mod scan;
pub mod slot;
pub mod types;

// 重新导出常用类型
pub use bean::{Bean, BeanDef, BeanHandle, Candidate, Capabilities, Caster, InjectionSpec, Object, PropertySpec};
pub use component::{ComponentRegistry, ComponentScanner};
pub use context::{ChildContext, Context, ContextBuilder, ContextConfig, DEFAULT_CLOSE_TIMEOUT};
pub use convert::{FileMode, FromProperty};
pub use error::{Error, HookError, Result};
pub use factory::{FactoryBean, Product};
pub use lifecycle::{DisposableBean, InitializingBean, Lifecycle, NamedBean, OrderedBean};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use properties::{
    Properties, PropertyErrorHandler, PropertyResolver, PropertySource,
    DEFAULT_PROPERTY_RESOLVER_PRIORITY,
};
pub use resource::{AssetFiles, DirAssets, MemoryAssets, Resource, ResourceSource};
pub use scan::{IntoScan, Scan, Scanner};
pub use slot::{BoxedRef, Inject, InjectList, InjectMap, PropertySlot, Shape, Slot, SlotError, Value};
pub use types::TypeKey;

pub use trellis_core_macros::Bean;

// 导出 inventory，供 #[bean(component)] 使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::BeanHandle;
    pub use crate::component::ComponentScanner;
    pub use crate::context::{ChildContext, Context, ContextBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::factory::{FactoryBean, Product};
    pub use crate::lifecycle::{DisposableBean, InitializingBean, Lifecycle, NamedBean, OrderedBean};
    pub use crate::logging::LoggingConfig;
    pub use crate::properties::{Properties, PropertyResolver, PropertySource};
    pub use crate::resource::{MemoryAssets, ResourceSource};
    pub use crate::scan::{IntoScan, Scan, Scanner};
    pub use crate::slot::{Inject, InjectList, InjectMap, Value};
    pub use crate::types::TypeKey;
    pub use crate::{beans, Bean};
}

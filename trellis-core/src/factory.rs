//! 工厂 bean
//!
//! 实现 [`FactoryBean`] 的 bean 会在注册阶段额外分配一个输出类型的占位句柄，
//! 其他 bean 可以在实例生成之前依赖该类型。占位在构造阶段由 [`FactoryNode`] 物化。

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;

use crate::bean::{call_hook, definition_of, BeanHandle, HookFailure, Object};
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::types::TypeKey;
use crate::Bean;

/// 工厂 bean
pub trait FactoryBean: Send + Sync {
    /// 生产一个实例
    fn object(&self) -> anyhow::Result<Product> {
        Err(anyhow!(
            "factory '{}' does not implement object, but declares the factory capability",
            std::any::type_name::<Self>()
        ))
    }

    /// 产出的类型
    fn object_type(&self) -> TypeKey;

    /// 产出类型还能作为哪些接口注入
    ///
    /// 实例生成之前，占位只凭这里声明的接口参与 trait object 字段的候选匹配。
    /// 产出为派生了 `Bean` 的类型时通常返回 `V::definition().interfaces()`。
    fn object_interfaces(&self) -> Vec<TypeKey> {
        Vec::new()
    }

    /// 产出 bean 的逻辑名，默认使用类型名
    fn object_name(&self) -> Option<String> {
        None
    }

    fn singleton(&self) -> bool {
        true
    }
}

/// 工厂生产的实例
pub struct Product {
    object: Object,
    name: Option<String>,
}

impl Product {
    /// 以类型 `T` 提供的共享值
    pub fn shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            object: Object::shared(value),
            name: None,
        }
    }

    /// 派生了 `Bean` 的实例，接口视图与命名能力随定义一起生效
    pub fn bean<B: Bean>(bean: B) -> Result<Self> {
        Self::from_arc(Arc::new(bean))
    }

    pub fn from_arc<B: Bean>(bean: Arc<B>) -> Result<Self> {
        let def = definition_of::<B>()?;
        Ok(Self {
            object: Object::from_bean(bean, &def),
            name: None,
        })
    }

    /// 指定产出句柄的逻辑名
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn resolved_name(&self) -> Option<String> {
        self.name.clone().or_else(|| {
            self.object
                .capabilities()
                .named
                .as_ref()
                .map(|named| named.bean_name())
        })
    }
}

impl fmt::Debug for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Product")
            .field("object", &self.object)
            .field("name", &self.name)
            .finish()
    }
}

/// 尚未到达的工厂产出，产出后写入 `handle` 的第 `field` 个注入字段
#[derive(Clone)]
pub(crate) struct PendingAssignment {
    pub(crate) factory: Arc<FactoryNode>,
    pub(crate) field: usize,
    pub(crate) position: usize,
}

/// 工厂节点：工厂 bean 自身的句柄、生产者以及已物化的产出
pub(crate) struct FactoryNode {
    pub(crate) bean: Arc<BeanHandle>,
    producer: Arc<dyn FactoryBean>,
    pub(crate) output: TypeKey,
    interfaces: Arc<[TypeKey]>,
    singleton: bool,
    instances: Mutex<Vec<Arc<BeanHandle>>>,
}

impl FactoryNode {
    /// 创建节点和它的占位句柄
    pub(crate) fn allocate(
        bean: Arc<BeanHandle>,
        producer: Arc<dyn FactoryBean>,
    ) -> (Arc<FactoryNode>, Arc<BeanHandle>) {
        let output = producer.object_type();
        let interfaces: Arc<[TypeKey]> = producer
            .object_interfaces()
            .into_iter()
            .filter(|key| *key != output)
            .collect();
        let singleton = producer.singleton();
        let name = producer
            .object_name()
            .unwrap_or_else(|| output.name().to_string());
        let node = Arc::new(FactoryNode {
            bean,
            producer,
            output,
            interfaces: interfaces.clone(),
            singleton,
            instances: Mutex::new(Vec::new()),
        });
        let placeholder = Arc::new(BeanHandle::placeholder(name, output, interfaces, node.clone()));
        node.instances.lock().push(placeholder.clone());
        (node, placeholder)
    }

    pub(crate) fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// 当前所有产出句柄（第一个为注册时的占位）
    pub(crate) fn instances(&self) -> Vec<Arc<BeanHandle>> {
        self.instances.lock().clone()
    }

    /// 生产一个实例
    ///
    /// 单例只在首次调用时生产；非单例首次物化占位，之后每次追加新句柄。
    /// 返回的布尔值表示本次是否调用了生产者。调用方负责先构造工厂 bean 自身。
    pub(crate) fn produce(node: &Arc<FactoryNode>) -> Result<(Arc<BeanHandle>, bool)> {
        let mut instances = node.instances.lock();
        let first = instances.first().cloned().ok_or_else(|| Error::Factory {
            factory: node.bean.name(),
            target: node.output.name().to_string(),
            source: Arc::new(std::io::Error::other("factory graph has been released")),
        })?;

        let (target, appended) = if !first.is_materialized() {
            (first, false)
        } else if node.singleton {
            return Ok((first, false));
        } else {
            let handle = Arc::new(BeanHandle::placeholder(
                node.producer
                    .object_name()
                    .unwrap_or_else(|| node.output.name().to_string()),
                node.output,
                node.interfaces.clone(),
                node.clone(),
            ));
            (handle, true)
        };

        let factory_name = node.bean.name();
        let producer = node.producer.clone();
        let mut product = None;
        call_hook(&factory_name, "factory", || {
            product = Some(producer.object()?);
            Ok(())
        })
        .map_err(|e| match e {
            HookFailure::Error(source) => Error::Factory {
                factory: factory_name.clone(),
                target: node.output.name().to_string(),
                source,
            },
            HookFailure::Panic(err) => err,
        })?;
        let product = product.ok_or_else(|| Error::Factory {
            factory: factory_name.clone(),
            target: node.output.name().to_string(),
            source: Arc::new(std::io::Error::other("factory returned no product")),
        })?;

        let declared = std::iter::once(&node.output).chain(node.interfaces.iter());
        if let Some(missing) = declared.copied().find(|key| !product.object.provides(*key)) {
            return Err(Error::Factory {
                factory: factory_name,
                target: node.output.name().to_string(),
                source: Arc::new(std::io::Error::other(format!(
                    "product of type '{}' can not be used as '{}'",
                    product.object.class(),
                    missing
                ))),
            });
        }

        if let Some(name) = product.resolved_name() {
            target.rename(name);
        }
        target.set_object(product.object);
        target.set_lifecycle(Lifecycle::Initialized);

        if appended {
            instances.push(target.clone());
        }
        Ok((target, true))
    }

    pub(crate) fn release(&self) {
        self.instances.lock().clear();
    }
}

impl fmt::Debug for FactoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryNode")
            .field("bean", &self.bean.name())
            .field("output", &self.output)
            .field("interfaces", &self.interfaces)
            .field("singleton", &self.singleton)
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}

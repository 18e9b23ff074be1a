//! Bean 定义与句柄
//!
//! [`Bean`] 由 `#[derive(Bean)]` 实现，描述可注入字段、属性字段和对外提供的接口视图；
//! [`BeanHandle`] 是对象图中的节点，持有实例、生命周期状态和依赖边。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use crate::error::{hook_error, panic_message, Error, Result};
use crate::factory::{FactoryBean, FactoryNode, PendingAssignment};
use crate::lifecycle::{DisposableBean, InitializingBean, Lifecycle, NamedBean, OrderedBean};
use crate::properties::PropertyResolver;
use crate::slot::{BoxedRef, PropertySlot, Shape, Slot};
use crate::types::TypeKey;

/// 把类型擦除的实例转换为某个视图类型的 `Arc`
pub type Caster = fn(&Arc<dyn Any + Send + Sync>) -> Option<BoxedRef>;

/// 可被容器管理的 bean
///
/// 通常通过 `#[derive(Bean)]` 实现：
///
/// ```ignore
/// #[derive(Bean)]
/// #[bean(initializing, provides(dyn UserService))]
/// struct UserServiceImpl {
///     #[inject]
///     repo: Inject<dyn UserRepository>,
///     #[value("user.cache.size", default = "128")]
///     cache_size: Value<usize>,
/// }
/// ```
pub trait Bean: Any + Send + Sync {
    /// 字段与接口视图描述
    fn definition() -> BeanDef
    where
        Self: Sized;

    /// 该实例具备的生命周期能力
    fn capabilities(this: &Arc<Self>) -> Capabilities
    where
        Self: Sized,
    {
        let _ = this;
        Capabilities::default()
    }
}

trait SlotAccess: Send + Sync {
    fn slot<'a>(&self, instance: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn Slot>;
}

struct FieldAccess<B, S> {
    get: fn(&B) -> &S,
}

impl<B: Bean, S: Slot> SlotAccess for FieldAccess<B, S> {
    fn slot<'a>(&self, instance: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn Slot> {
        instance
            .downcast_ref::<B>()
            .map(|bean| (self.get)(bean) as &dyn Slot)
    }
}

trait PropertyAccess: Send + Sync {
    fn slot<'a>(&self, instance: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn PropertySlot>;
}

struct PropertyFieldAccess<B, S> {
    get: fn(&B) -> &S,
}

impl<B: Bean, S: PropertySlot> PropertyAccess for PropertyFieldAccess<B, S> {
    fn slot<'a>(&self, instance: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn PropertySlot> {
        instance
            .downcast_ref::<B>()
            .map(|bean| (self.get)(bean) as &dyn PropertySlot)
    }
}

/// 一个注入字段的静态描述
#[derive(Clone)]
pub struct InjectionSpec {
    field: &'static str,
    target: TypeKey,
    shape: Shape,
    optional: bool,
    lazy: bool,
    qualifier: Option<String>,
    level: i32,
    access: Arc<dyn SlotAccess>,
}

impl InjectionSpec {
    pub fn field<B: Bean, S: Slot>(field: &'static str, access: fn(&B) -> &S) -> Self {
        Self {
            field,
            target: S::target(),
            shape: S::shape(),
            optional: false,
            lazy: false,
            qualifier: None,
            level: 0,
            access: Arc::new(FieldAccess { get: access }),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn qualifier(mut self, name: impl Into<String>) -> Self {
        self.qualifier = Some(name.into());
        self
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn field_name(&self) -> &'static str {
        self.field
    }

    pub fn target(&self) -> TypeKey {
        self.target
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn qualifier_name(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn lookup_level(&self) -> i32 {
        self.level
    }

    pub(crate) fn slot<'a>(&self, instance: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn Slot> {
        self.access.slot(instance)
    }

    /// 供日志使用的修饰符描述，例如 `[lazy,bean=main]`
    pub(crate) fn describe(&self) -> String {
        let mut attrs = Vec::new();
        if self.lazy {
            attrs.push("lazy".to_string());
        }
        if self.optional {
            attrs.push("optional".to_string());
        }
        if let Some(q) = &self.qualifier {
            attrs.push(format!("bean={}", q));
        }
        if self.level != 0 {
            attrs.push(format!("level={}", self.level));
        }
        let prefix = match self.shape {
            Shape::Scalar => "",
            Shape::List => "[]",
            Shape::Map => "map[string]",
        };
        if attrs.is_empty() {
            format!("{}{}", prefix, self.target)
        } else {
            format!("{}{} [{}]", prefix, self.target, attrs.join(","))
        }
    }
}

impl fmt::Debug for InjectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionSpec")
            .field("field", &self.field)
            .field("target", &self.target)
            .field("shape", &self.shape)
            .field("optional", &self.optional)
            .field("lazy", &self.lazy)
            .field("qualifier", &self.qualifier)
            .field("level", &self.level)
            .finish()
    }
}

/// 一个属性字段的静态描述
#[derive(Clone)]
pub struct PropertySpec {
    field: &'static str,
    key: String,
    default_value: Option<String>,
    layout: Option<String>,
    access: Arc<dyn PropertyAccess>,
}

impl PropertySpec {
    pub fn field<B: Bean, S: PropertySlot>(
        field: &'static str,
        key: impl Into<String>,
        access: fn(&B) -> &S,
    ) -> Self {
        Self {
            field,
            key: key.into(),
            default_value: None,
            layout: None,
            access: Arc::new(PropertyFieldAccess { get: access }),
        }
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn field_name(&self) -> &'static str {
        self.field
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub(crate) fn layout_str(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    pub(crate) fn slot<'a>(
        &self,
        instance: &'a (dyn Any + Send + Sync),
    ) -> Option<&'a dyn PropertySlot> {
        self.access.slot(instance)
    }
}

impl fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySpec")
            .field("field", &self.field)
            .field("key", &self.key)
            .field("default", &self.default_value)
            .field("layout", &self.layout)
            .finish()
    }
}

/// Bean 类型的定义：注入字段、属性字段、接口视图
pub struct BeanDef {
    class: TypeKey,
    fields: Vec<InjectionSpec>,
    properties: Vec<PropertySpec>,
    views: Vec<(TypeKey, Caster)>,
}

fn bean_view<B: Bean>(instance: &Arc<dyn Any + Send + Sync>) -> Option<BoxedRef> {
    Arc::clone(instance)
        .downcast::<B>()
        .ok()
        .map(|bean| Box::new(bean) as BoxedRef)
}

fn shared_view<T: ?Sized + Send + Sync + 'static>(
    instance: &Arc<dyn Any + Send + Sync>,
) -> Option<BoxedRef> {
    instance
        .downcast_ref::<Arc<T>>()
        .map(|value| Box::new(Arc::clone(value)) as BoxedRef)
}

impl BeanDef {
    /// 以 bean 自身类型作为第一个视图
    pub fn of<B: Bean>() -> Self {
        Self {
            class: TypeKey::of::<B>(),
            fields: Vec::new(),
            properties: Vec::new(),
            views: vec![(TypeKey::of::<B>(), bean_view::<B> as Caster)],
        }
    }

    pub fn inject(mut self, spec: InjectionSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// 声明该 bean 可以作为 `key` 所指的接口注入
    pub fn provides(mut self, key: TypeKey, caster: Caster) -> Self {
        if !self.views.iter().any(|(k, _)| *k == key) {
            self.views.push((key, caster));
        }
        self
    }

    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub fn fields(&self) -> &[InjectionSpec] {
        &self.fields
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn interfaces(&self) -> Vec<TypeKey> {
        self.views.iter().skip(1).map(|(k, _)| *k).collect()
    }

    /// 校验修饰符
    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            if field.level < -1 {
                return Err(Error::declaration(
                    self.class.name(),
                    format!(
                        "field '{}' has invalid level {}, expected -1 or greater",
                        field.field, field.level
                    ),
                ));
            }
            if let Some(q) = &field.qualifier {
                if q.trim().is_empty() {
                    return Err(Error::declaration(
                        self.class.name(),
                        format!("field '{}' has an empty bean qualifier", field.field),
                    ));
                }
            }
        }
        for property in &self.properties {
            if property.key.trim().is_empty() {
                return Err(Error::declaration(
                    self.class.name(),
                    format!("property field '{}' has an empty key", property.field),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BeanDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDef")
            .field("class", &self.class)
            .field("fields", &self.fields)
            .field("properties", &self.properties)
            .field("interfaces", &self.interfaces())
            .finish()
    }
}

fn definitions() -> &'static RwLock<HashMap<TypeId, Arc<BeanDef>>> {
    static DEFINITIONS: OnceLock<RwLock<HashMap<TypeId, Arc<BeanDef>>>> = OnceLock::new();
    DEFINITIONS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// 获取（并缓存）bean 类型的定义
pub(crate) fn definition_of<B: Bean>() -> Result<Arc<BeanDef>> {
    let id = TypeId::of::<B>();
    if let Some(def) = definitions().read().get(&id) {
        return Ok(def.clone());
    }

    let def = B::definition();
    def.validate()?;
    let def = Arc::new(def);
    Ok(definitions().write().entry(id).or_insert(def).clone())
}

/// bean 具备的能力，每种能力都是指向同一实例的 trait object
#[derive(Clone, Default)]
pub struct Capabilities {
    pub named: Option<Arc<dyn NamedBean>>,
    pub ordered: Option<Arc<dyn OrderedBean>>,
    pub initializing: Option<Arc<dyn InitializingBean>>,
    pub disposable: Option<Arc<dyn DisposableBean>>,
    pub factory: Option<Arc<dyn FactoryBean>>,
    pub resolver: Option<Arc<dyn PropertyResolver>>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("named", &self.named.is_some())
            .field("ordered", &self.ordered.is_some())
            .field("initializing", &self.initializing.is_some())
            .field("disposable", &self.disposable.is_some())
            .field("factory", &self.factory.is_some())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// 容器中的实例
#[derive(Clone)]
pub struct Object {
    class: TypeKey,
    instance: Arc<dyn Any + Send + Sync>,
    views: Arc<[(TypeKey, Caster)]>,
    capabilities: Capabilities,
}

impl Object {
    pub(crate) fn from_bean<B: Bean>(bean: Arc<B>, def: &BeanDef) -> Self {
        let capabilities = B::capabilities(&bean);
        Self {
            class: def.class,
            instance: bean,
            views: def.views.clone().into(),
            capabilities,
        }
    }

    /// 包装一个已共享的值，注册在类型 `T` 下（函数、trait object 等）
    pub fn shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            class: TypeKey::of::<T>(),
            instance: Arc::new(value),
            views: vec![(TypeKey::of::<T>(), shared_view::<T> as Caster)].into(),
            capabilities: Capabilities::default(),
        }
    }

    pub(crate) fn custom(
        class: TypeKey,
        instance: Arc<dyn Any + Send + Sync>,
        caster: Caster,
    ) -> Self {
        Self {
            class,
            instance,
            views: vec![(class, caster)].into(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub(crate) fn instance(&self) -> &(dyn Any + Send + Sync) {
        self.instance.as_ref()
    }

    pub(crate) fn instance_arc(&self) -> Arc<dyn Any + Send + Sync> {
        self.instance.clone()
    }

    pub(crate) fn provides(&self, key: TypeKey) -> bool {
        self.views.iter().any(|(k, _)| *k == key)
    }

    /// 以 `key` 类型取出 `Box<Arc<T>>`
    pub(crate) fn view(&self, key: TypeKey) -> Option<BoxedRef> {
        self.views
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, caster)| caster(&self.instance))
    }

    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.view(TypeKey::of::<T>())
            .and_then(|boxed| boxed.downcast::<Arc<T>>().ok())
            .map(|boxed| *boxed)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class)
            .field("views", &self.views.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// 扫描阶段传入的 bean 实例
#[derive(Clone)]
pub struct Candidate {
    instance: Arc<dyn Any + Send + Sync>,
    class: TypeKey,
    definition: fn() -> Result<Arc<BeanDef>>,
    object: fn(Arc<dyn Any + Send + Sync>, &BeanDef) -> Option<Object>,
}

fn object_of<B: Bean>(instance: Arc<dyn Any + Send + Sync>, def: &BeanDef) -> Option<Object> {
    instance
        .downcast::<B>()
        .ok()
        .map(|bean| Object::from_bean(bean, def))
}

impl Candidate {
    pub fn new<B: Bean>(bean: Arc<B>) -> Self {
        Self {
            instance: bean,
            class: TypeKey::of::<B>(),
            definition: definition_of::<B>,
            object: object_of::<B>,
        }
    }

    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub(crate) fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }

    /// 解析定义并生成实例
    pub(crate) fn introspect(&self) -> Result<(Object, Arc<BeanDef>)> {
        let def = (self.definition)()?;
        let object = (self.object)(self.instance.clone(), &def).ok_or_else(|| {
            Error::declaration(self.class.name(), "instance does not match its bean definition")
        })?;
        Ok((object, def))
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate({})", self.class)
    }
}

/// 对象图中的节点
pub struct BeanHandle {
    name: RwLock<String>,
    qualifier: Option<String>,
    class: TypeKey,
    order: Option<i32>,
    lifecycle: Mutex<Lifecycle>,
    object: OnceLock<Object>,
    interfaces: Arc<[TypeKey]>,
    def: Option<Arc<BeanDef>>,
    factory: Option<Arc<FactoryNode>>,
    pub(crate) dependencies: Mutex<Vec<Arc<BeanHandle>>>,
    pub(crate) pending: Mutex<Vec<PendingAssignment>>,
    pub(crate) ctor: Mutex<()>,
}

impl BeanHandle {
    /// 已有实例的 bean；命名、排序能力在这里读取一次并缓存
    pub(crate) fn with_object(
        object: Object,
        def: Option<Arc<BeanDef>>,
        lifecycle: Lifecycle,
    ) -> Self {
        let caps = object.capabilities();
        let qualifier = caps.named.as_ref().map(|named| named.bean_name());
        let name = qualifier
            .clone()
            .unwrap_or_else(|| object.class().name().to_string());
        let order = caps.ordered.as_ref().map(|ordered| ordered.bean_order());
        let class = object.class();
        let cell = OnceLock::new();
        let _ = cell.set(object);
        Self {
            name: RwLock::new(name),
            qualifier,
            class,
            order,
            lifecycle: Mutex::new(lifecycle),
            object: cell,
            interfaces: Arc::new([]),
            def,
            factory: None,
            dependencies: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            ctor: Mutex::new(()),
        }
    }

    /// 工厂产出的占位句柄，实例稍后由工厂生成
    pub(crate) fn placeholder(
        name: String,
        class: TypeKey,
        interfaces: Arc<[TypeKey]>,
        factory: Arc<FactoryNode>,
    ) -> Self {
        Self {
            name: RwLock::new(name),
            qualifier: None,
            class,
            order: None,
            lifecycle: Mutex::new(Lifecycle::Allocated),
            object: OnceLock::new(),
            interfaces,
            def: None,
            factory: Some(factory),
            dependencies: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            ctor: Mutex::new(()),
        }
    }

    /// 逻辑名
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// 注册时的类型（工厂产出为工厂声明的输出类型）
    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    pub fn is_factory_product(&self) -> bool {
        self.factory.is_some()
    }

    /// 以类型 `T` 取出实例
    pub fn object<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.object.get().and_then(|o| o.downcast::<T>())
    }

    /// 类型擦除的实例
    pub fn instance(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.object.get().map(|o| o.instance_arc())
    }

    /// 重新加载：先 destroy 再 post_construct，实例与句柄保持不变
    pub fn reload(&self) -> Result<()> {
        let name = self.name();
        if self.factory.is_some() {
            return Err(Error::Reload {
                bean: name,
                message: "bean produced by a factory has no construction entrypoint".to_string(),
            });
        }
        let object = self.object.get().ok_or_else(|| Error::Reload {
            bean: name.clone(),
            message: "bean has no instance".to_string(),
        })?;

        let _guard = self.ctor.lock();

        self.set_lifecycle(Lifecycle::Destroying);
        if let Some(disposable) = &object.capabilities().disposable {
            tracing::debug!("Reload: destroy bean '{}'", name);
            call_hook(&name, "destroy", || disposable.destroy()).map_err(|e| match e {
                HookFailure::Error(source) => Error::Destroy {
                    bean: name.clone(),
                    source,
                },
                HookFailure::Panic(err) => err,
            })?;
        }

        self.set_lifecycle(Lifecycle::Constructing);
        if let Some(initializing) = &object.capabilities().initializing {
            tracing::debug!("Reload: post construct bean '{}'", name);
            call_hook(&name, "post construct", || initializing.post_construct()).map_err(
                |e| match e {
                    HookFailure::Error(source) => Error::PostConstruct {
                        bean: name.clone(),
                        chain: name.clone(),
                        source,
                    },
                    HookFailure::Panic(err) => err,
                },
            )?;
        }

        self.set_lifecycle(Lifecycle::Initialized);
        Ok(())
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.lock() = lifecycle;
    }

    pub(crate) fn rename(&self, name: String) {
        *self.name.write() = name;
    }

    pub(crate) fn def(&self) -> Option<&Arc<BeanDef>> {
        self.def.as_ref()
    }

    pub(crate) fn factory(&self) -> Option<&Arc<FactoryNode>> {
        self.factory.as_ref()
    }

    pub(crate) fn object_ref(&self) -> Option<&Object> {
        self.object.get()
    }

    pub(crate) fn set_object(&self, object: Object) -> bool {
        self.object.set(object).is_ok()
    }

    pub(crate) fn is_materialized(&self) -> bool {
        self.object.get().is_some()
    }

    /// 是否可以作为 `key` 类型注入
    ///
    /// 未生成实例的占位按工厂声明的输出类型及其接口判断。
    pub fn implements(&self, key: TypeKey) -> bool {
        match self.object.get() {
            Some(object) => object.provides(key),
            None => self.class == key || self.interfaces.contains(&key),
        }
    }

    /// 以 `key` 视图取出实例
    pub(crate) fn view(&self, key: TypeKey) -> Option<BoxedRef> {
        self.object.get().and_then(|o| o.view(key))
    }

    /// 断开与其他句柄的引用，用于释放对象图
    pub(crate) fn release(&self) {
        self.dependencies.lock().clear();
        self.pending.lock().clear();
        if let Some(factory) = &self.factory {
            factory.release();
        }
    }
}

impl fmt::Debug for BeanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanHandle")
            .field("name", &self.name())
            .field("class", &self.class)
            .field("order", &self.order)
            .field("lifecycle", &self.lifecycle())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

impl fmt::Display for BeanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bean '{}' of type '{}'", self.name(), self.class)
    }
}

pub(crate) enum HookFailure {
    Error(crate::error::HookError),
    Panic(Error),
}

/// 在 bean 边界上调用用户钩子，捕获 panic
pub(crate) fn call_hook<F>(bean: &str, phase: &'static str, hook: F) -> std::result::Result<(), HookFailure>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(HookFailure::Error(hook_error(e))),
        Err(payload) => Err(HookFailure::Panic(Error::Panic {
            bean: bean.to_string(),
            phase,
            message: panic_message(payload),
        })),
    }
}

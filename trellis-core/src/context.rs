//! 上下文
//!
//! 一个上下文持有一次装配得到的对象图。装配分三步：
//!
//! 1. 扫描：展开输入，为每个 bean 建立句柄，工厂 bean 额外分配产出占位；
//! 2. 解析：先处理具体类型字段，再处理 trait object 字段，把候选写入注入槽；
//! 3. 构造：按依赖深度优先调用 `post_construct`，依次构造属性解析器、其余 bean、未物化的工厂占位。
//!
//! 子上下文通过 [`Context::extend`] 或 [`ChildContext`] 创建，查找时可以穿过父链。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::bean::{call_hook, definition_of, BeanHandle, Candidate, HookFailure, InjectionSpec, Object};
use crate::error::{panic_message, Error, Result};
use crate::factory::FactoryNode;
use crate::injection::{self, Generation};
use crate::lifecycle::Lifecycle;
use crate::logging::{event, LoggingConfig};
use crate::properties::{Properties, PropertyResolver, PropertySource};
use crate::registry::Registry;
use crate::resource::{split_resource_path, Resource};
use crate::scan::{self, IntoScan, Item, Scan};
use crate::slot::{BoxedRef, Inject};
use crate::types::TypeKey;
use crate::Bean;

/// 装配失败后等待 close 的默认时长
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// 进程级装配锁，同一线程可重入（父上下文的钩子里可以创建子上下文）
static ASSEMBLY: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// 上下文配置
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// 开启后装配事件以 info 级别输出
    pub verbose: bool,

    /// 装配失败时等待 close 的时长
    pub close_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// 上下文构建器
///
/// ```ignore
/// let ctx = Context::builder()
///     .verbose(true)
///     .logging(LoggingConfig::from_env())
///     .scan(UserService::default())
///     .scan(PropertySource::file("config:application.properties"))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    logging: Option<LoggingConfig>,
    parent: Option<Context>,
    items: Vec<Scan>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// 在装配开始前安装全局日志订阅者
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn parent(mut self, parent: Context) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn scan(mut self, item: impl IntoScan) -> Self {
        self.items.push(item.into_scan());
        self
    }

    pub fn scan_all(mut self, items: impl IntoIterator<Item = Scan>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn build(self) -> Result<Context> {
        if let Some(logging) = self.logging {
            // 已有全局订阅者时沿用现有的
            if let Err(e) = logging.init() {
                tracing::debug!("Keep the installed subscriber: {}", e);
            }
        }
        Context::assemble(self.parent, self.items, self.config)
    }
}

/// 同一类型（或工厂输出类型）下注册的句柄，保持扫描顺序
#[derive(Default)]
struct Core {
    groups: Vec<(TypeKey, Vec<Arc<BeanHandle>>)>,
    index: HashMap<TypeKey, usize>,
}

impl Core {
    fn register(&mut self, key: TypeKey, handle: Arc<BeanHandle>) {
        match self.index.get(&key) {
            Some(&i) => self.groups[i].1.push(handle),
            None => {
                self.index.insert(key, self.groups.len());
                self.groups.push((key, vec![handle]));
            }
        }
    }

    fn group(&self, key: TypeKey) -> Option<&[Arc<BeanHandle>]> {
        self.index.get(&key).map(|&i| self.groups[i].1.as_slice())
    }

    /// 本上下文中可以作为 `key` 的句柄
    ///
    /// trait object 按组匹配：组内第一个句柄提供该视图，整组都是候选。
    fn candidates(&self, key: TypeKey) -> Vec<Arc<BeanHandle>> {
        if !key.is_interface() {
            return self.group(key).map(<[_]>::to_vec).unwrap_or_default();
        }
        self.groups
            .iter()
            .filter(|(_, list)| list.first().is_some_and(|h| h.implements(key)))
            .flat_map(|(_, list)| list.iter().cloned())
            .collect()
    }

    fn keys(&self) -> Vec<TypeKey> {
        self.groups.iter().map(|(key, _)| *key).collect()
    }

    fn handles(&self) -> impl Iterator<Item = &Arc<BeanHandle>> {
        self.groups.iter().flat_map(|(_, list)| list.iter())
    }
}

/// 扫描阶段收集的待办
#[derive(Default)]
struct Plan {
    resolvers: Vec<Arc<BeanHandle>>,
    beans: Vec<Arc<BeanHandle>>,
    placeholders: Vec<Arc<BeanHandle>>,
    fields: Vec<(Arc<BeanHandle>, usize)>,
    sources: Vec<PropertySource>,
    side_resolvers: Vec<Arc<dyn PropertyResolver>>,
}

struct ContextInner {
    parent: Option<Context>,
    config: ContextConfig,
    core: RwLock<Arc<Core>>,
    registry: Registry,
    properties: Arc<Properties>,
    disposables: Mutex<Vec<Arc<BeanHandle>>>,
    children: Mutex<Vec<Arc<ChildContext>>>,
    closed: OnceLock<Result<()>>,
}

/// 上下文句柄，克隆开销很小
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// 上下文注册自身时使用的弱引用，避免上下文持有自己
struct ContextRef(Weak<ContextInner>);

fn context_view(instance: &Arc<dyn Any + Send + Sync>) -> Option<BoxedRef> {
    let inner = instance.downcast_ref::<ContextRef>()?.0.upgrade()?;
    Some(Box::new(Arc::new(Context { inner })))
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

impl Context {
    /// 用一组输入创建根上下文
    pub fn new(items: Vec<Scan>) -> Result<Context> {
        Self::builder().scan_all(items).build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// 以当前上下文为父创建子上下文，沿用当前配置
    pub fn extend(&self, items: Vec<Scan>) -> Result<Context> {
        Self::builder()
            .config(self.inner.config.clone())
            .parent(self.clone())
            .scan_all(items)
            .build()
    }

    pub fn parent(&self) -> Option<Context> {
        self.inner.parent.clone()
    }

    /// 在本上下文中扫描到的子上下文
    pub fn children(&self) -> Vec<Arc<ChildContext>> {
        self.inner.children.lock().clone()
    }

    /// 本上下文注册的所有类型，按首次注册顺序
    pub fn core(&self) -> Vec<TypeKey> {
        self.snapshot().keys()
    }

    pub fn properties(&self) -> Arc<Properties> {
        self.inner.properties.clone()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get().is_some()
    }

    /// 按类型查找
    ///
    /// `level` 的含义与 `#[inject(level = ..)]` 相同：`-1` 全部祖先，`0` 最近一代，
    /// `1` 只看本上下文，`k` 查到第 k 代为止。
    pub fn bean<T: ?Sized + 'static>(&self, level: i32) -> Vec<Arc<BeanHandle>> {
        let deep = self.generations(TypeKey::of::<T>());
        injection::order_beans(injection::level_beans(&deep, level))
    }

    /// 按名称查找
    pub fn lookup(&self, name: &str, level: i32) -> Vec<Arc<BeanHandle>> {
        let mut deep = Vec::new();
        for (i, ctx) in self.lineage().enumerate() {
            let list: Vec<_> = ctx
                .inner
                .registry
                .find_by_name(name)
                .unwrap_or_default()
                .into_iter()
                .filter(|h| h.name() == name)
                .collect();
            if !list.is_empty() {
                deep.push(Generation {
                    level: i as i32 + 1,
                    list,
                });
            }
        }
        injection::order_beans(injection::level_beans(&deep, level))
    }

    /// 向上下文之外的对象注入依赖与属性
    ///
    /// 只使用已初始化的候选，不记录依赖，也不调用钩子。
    pub fn inject<T: Bean>(&self, target: &T) -> Result<()> {
        let def = definition_of::<T>()?;
        let instance: &(dyn Any + Send + Sync) = target;
        for spec in def.fields() {
            let deep = self.generations(spec.target());
            injection::inject_runtime(instance, def.class(), spec, &deep)?;
        }
        injection::inject_properties(instance, def.class(), def.properties(), &self.inner.properties)
    }

    /// 按 `bundle:path` 查找资源，本上下文找不到时查父上下文
    pub fn resource(&self, path: &str) -> Option<Resource> {
        let (bundle, file) = split_resource_path(path)?;
        self.lineage()
            .find_map(|ctx| ctx.inner.registry.find_resource(bundle, file))
    }

    /// 关闭上下文
    ///
    /// 先关闭子上下文，再按构造的逆序调用 `destroy`，最后释放对象图。
    /// 只执行一次，之后的调用返回同一个结果。
    pub fn close(&self) -> Result<()> {
        self.inner.closed.get_or_init(|| self.shutdown()).clone()
    }

    fn lineage(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(Some(self), |ctx| ctx.inner.parent.as_ref())
    }

    fn snapshot(&self) -> Arc<Core> {
        self.inner.core.read().clone()
    }

    /// 沿父链收集 `key` 的候选，每代的结果缓存在该代的注册表中
    fn generations(&self, key: TypeKey) -> Vec<Generation> {
        let mut deep = Vec::new();
        for (i, ctx) in self.lineage().enumerate() {
            let list = match ctx.inner.registry.find_by_type(key) {
                Some(list) => list,
                None => {
                    let list = ctx.snapshot().candidates(key);
                    ctx.inner.registry.add_bean_list(key, &list);
                    list
                }
            };
            let list = expand(list);
            if !list.is_empty() {
                deep.push(Generation {
                    level: i as i32 + 1,
                    list,
                });
            }
        }
        deep
    }

    fn assemble(parent: Option<Context>, items: Vec<Scan>, config: ContextConfig) -> Result<Context> {
        let _guard = ASSEMBLY.lock();

        let properties = Arc::new(Properties::new());
        if let Some(parent) = &parent {
            properties.extend(&parent.inner.properties);
        }
        let ctx = Context {
            inner: Arc::new(ContextInner {
                parent,
                config,
                core: RwLock::new(Arc::new(Core::default())),
                registry: Registry::new(),
                properties,
                disposables: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
                closed: OnceLock::new(),
            }),
        };

        let mut core = Core::default();
        let mut plan = Plan::default();
        let scanned = ctx.scan(items, &mut core, &mut plan);
        for handle in core.handles() {
            ctx.inner.registry.add_named(handle);
        }
        *ctx.inner.core.write() = Arc::new(core);

        let result = scanned
            .and_then(|()| ctx.resolve(&plan))
            .and_then(|()| ctx.load_properties(&plan))
            .and_then(|()| ctx.construct_all(&plan));

        match result {
            Ok(()) => {
                event!(ctx.inner.config.verbose, "Context ready: {}", ctx);
                Ok(ctx)
            }
            Err(e) => {
                tracing::error!("Context assembly failed: {}", e);
                ctx.close_with_timeout();
                Err(e)
            }
        }
    }

    fn scan(&self, items: Vec<Scan>, core: &mut Core, plan: &mut Plan) -> Result<()> {
        let verbose = self.inner.config.verbose;

        let own = Object::custom(
            TypeKey::of::<Context>(),
            Arc::new(ContextRef(Arc::downgrade(&self.inner))),
            context_view,
        );
        core.register(
            TypeKey::of::<Context>(),
            Arc::new(BeanHandle::with_object(own, None, Lifecycle::Initialized)),
        );
        let props = Object::shared(self.inner.properties.clone());
        core.register(
            TypeKey::of::<Properties>(),
            Arc::new(BeanHandle::with_object(props, None, Lifecycle::Initialized)),
        );

        for (position, item) in scan::flatten(items)? {
            catch_unwind(AssertUnwindSafe(|| self.register(&position, item, core, plan)))
                .map_err(|payload| Error::Panic {
                    bean: format!("scan item at position {}", position),
                    phase: "scan",
                    message: panic_message(payload),
                })??;
        }

        check_producers(core)?;
        event!(verbose, "Scan: registered {} type(s)", core.groups.len());
        Ok(())
    }

    fn register(&self, position: &str, item: Item, core: &mut Core, plan: &mut Plan) -> Result<()> {
        let verbose = self.inner.config.verbose;
        match item {
            Item::Bean(candidate) => self.register_bean(position, candidate, core, plan)?,
            Item::Function(object) => {
                let key = object.class();
                let handle = Arc::new(BeanHandle::with_object(object, None, Lifecycle::Initialized));
                event!(verbose, "Scan: [{}] {}", position, handle);
                core.register(key, handle);
            }
            Item::Properties(source) => {
                event!(verbose, "Scan: [{}] property source {:?}", position, source.path);
                plan.sources.push(source);
            }
            Item::Resources(source) => {
                event!(verbose, "Scan: [{}] resource source '{}'", position, source.name);
                self.inner.registry.add_resource_source(&source)?;
            }
            Item::Resolver(resolver) => {
                event!(verbose, "Scan: [{}] property resolver with priority {}", position, resolver.priority());
                plan.side_resolvers.push(resolver);
            }
        }
        Ok(())
    }

    fn register_bean(
        &self,
        position: &str,
        candidate: Candidate,
        core: &mut Core,
        plan: &mut Plan,
    ) -> Result<()> {
        let verbose = self.inner.config.verbose;
        let (object, def) = candidate.introspect()?;
        let class = def.class();
        let capabilities = object.capabilities().clone();

        let handle = Arc::new(BeanHandle::with_object(object, Some(def.clone()), Lifecycle::Created));
        event!(verbose, "Scan: [{}] {}", position, handle);

        if let Some(child) = candidate.downcast::<ChildContext>() {
            self.inner.children.lock().push(child);
        }

        if let Some(producer) = capabilities.factory {
            let (node, placeholder) = FactoryNode::allocate(handle.clone(), producer);
            event!(
                verbose,
                "Scan: [{}] factory '{}' produces '{}' (singleton={})",
                position,
                handle.name(),
                node.output,
                node.is_singleton()
            );
            core.register(node.output, placeholder.clone());
            plan.placeholders.push(placeholder);
        }

        for index in 0..def.fields().len() {
            plan.fields.push((handle.clone(), index));
        }

        core.register(class, handle.clone());
        if capabilities.resolver.is_some() {
            plan.resolvers.push(handle);
        } else {
            plan.beans.push(handle);
        }
        Ok(())
    }

    /// 具体类型字段先于 trait object 字段解析，各自保持扫描顺序
    fn resolve(&self, plan: &Plan) -> Result<()> {
        let verbose = self.inner.config.verbose;
        let (direct, interfaces): (Vec<_>, Vec<_>) = plan
            .fields
            .iter()
            .partition(|(handle, index)| {
                !field_spec(handle, *index).is_some_and(|s| s.target().is_interface())
            });

        for (handle, index) in direct.into_iter().chain(interfaces) {
            let spec = field_spec(handle, *index).ok_or_else(|| {
                Error::declaration(handle.class().name(), format!("unknown field index {}", index))
            })?;
            let deep = self.generations(spec.target());
            injection::inject_field(handle, *index, spec, &deep, verbose)?;
        }
        Ok(())
    }

    fn load_properties(&self, plan: &Plan) -> Result<()> {
        let verbose = self.inner.config.verbose;
        let properties = &self.inner.properties;

        for source in &plan.sources {
            if let Some(path) = &source.path {
                let resource = self.resource(path).ok_or_else(|| {
                    Error::Properties(format!("property resource '{}' not found", path))
                })?;
                let text = resource
                    .read_to_string()
                    .map_err(|e| Error::Properties(format!("read '{}': {}", path, e)))?;
                if path.ends_with(".toml") {
                    properties.load_toml(&text)?;
                } else {
                    properties.parse(&text)?;
                }
                event!(verbose, "Properties: loaded '{}'", path);
            }
            if let Some(map) = &source.map {
                properties.load_map(map);
                event!(verbose, "Properties: loaded {} table entries", map.len());
            }
        }

        for resolver in &plan.side_resolvers {
            properties.register(resolver.clone());
        }
        for handle in &plan.resolvers {
            let resolver = handle
                .object_ref()
                .and_then(|o| o.capabilities().resolver.clone());
            if let Some(resolver) = resolver {
                properties.register(resolver);
            }
        }
        Ok(())
    }

    fn construct_all(&self, plan: &Plan) -> Result<()> {
        for handle in plan
            .resolvers
            .iter()
            .chain(&plan.beans)
            .chain(&plan.placeholders)
        {
            self.construct(handle, &[])?;
        }
        Ok(())
    }

    /// 深度优先构造，`stack` 为当前依赖链
    fn construct(&self, bean: &Arc<BeanHandle>, stack: &[Arc<BeanHandle>]) -> Result<()> {
        match catch_unwind(AssertUnwindSafe(|| self.construct_bean(bean, stack))) {
            Ok(result) => result,
            Err(payload) => Err(Error::Panic {
                bean: bean.name(),
                phase: "construct",
                message: panic_message(payload),
            }),
        }
    }

    fn construct_bean(&self, bean: &Arc<BeanHandle>, stack: &[Arc<BeanHandle>]) -> Result<()> {
        if bean.lifecycle() == Lifecycle::Initialized {
            return Ok(());
        }
        let verbose = self.inner.config.verbose;

        if bean.lifecycle() == Lifecycle::Constructing {
            if let Some(i) = stack.iter().position(|b| Arc::ptr_eq(b, bean)) {
                let mut path: Vec<String> =
                    stack[i..].iter().map(|b| b.class().name().to_string()).collect();
                path.push(bean.class().name().to_string());
                return Err(Error::Cycle { path });
            }
        }

        bean.set_lifecycle(Lifecycle::Constructing);
        let _ctor = bean.ctor.lock();
        event!(verbose, "{}Construct {}", indent(stack.len()), bean);

        let mut chain = stack.to_vec();
        chain.push(bean.clone());

        let pending = bean.pending.lock().clone();
        for assignment in &pending {
            self.construct(&assignment.factory.bean, &chain)?;
            let product = self.produce(&assignment.factory, stack.len())?;
            injection::assign_pending(bean, assignment, &product)?;
        }

        let dependencies = bean.dependencies.lock().clone();
        for dependency in &dependencies {
            self.construct(dependency, &chain)?;
        }

        if let Some(factory) = bean.factory() {
            if !bean.is_materialized() {
                self.construct(&factory.bean, &chain)?;
                self.produce(factory, stack.len())?;
            }
            return Ok(());
        }

        let object = bean.object_ref().ok_or_else(|| {
            Error::declaration(bean.class().name(), "bean has no instance to construct")
        })?;

        if let Some(def) = bean.def() {
            if !def.properties().is_empty() {
                injection::inject_properties(
                    object.instance(),
                    bean.class(),
                    def.properties(),
                    &self.inner.properties,
                )?;
            }
        }

        let capabilities = object.capabilities();
        if let Some(initializing) = &capabilities.initializing {
            let name = bean.name();
            call_hook(&name, "post construct", || initializing.post_construct()).map_err(|e| {
                match e {
                    HookFailure::Error(source) => Error::PostConstruct {
                        bean: name.clone(),
                        chain: required_by(&chain),
                        source,
                    },
                    HookFailure::Panic(err) => err,
                }
            })?;
        }

        if capabilities.disposable.is_some() {
            self.inner.disposables.lock().push(bean.clone());
        }
        bean.set_lifecycle(Lifecycle::Initialized);
        event!(verbose, "{}Initialized {}", indent(stack.len()), bean);
        Ok(())
    }

    fn produce(&self, node: &Arc<FactoryNode>, depth: usize) -> Result<Arc<BeanHandle>> {
        let (product, fresh) = FactoryNode::produce(node)?;
        if fresh {
            self.inner.registry.add_named(&product);
            event!(
                self.inner.config.verbose,
                "{}Produced {} by factory '{}'",
                indent(depth),
                product,
                node.bean.name()
            );
        }
        Ok(product)
    }

    fn shutdown(&self) -> Result<()> {
        let verbose = self.inner.config.verbose;
        let mut errors = Vec::new();

        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            if let Err(e) = child.close() {
                tracing::warn!("Close child context '{}' failed: {}", child.role(), e);
                errors.push(e);
            }
        }

        let disposables = std::mem::take(&mut *self.inner.disposables.lock());
        for handle in disposables.iter().rev() {
            if let Err(e) = destroy(handle, verbose) {
                tracing::warn!("{}", e);
                errors.push(e);
            }
        }

        let core = std::mem::take(&mut *self.inner.core.write());
        for handle in core.handles() {
            handle.release();
        }
        self.inner.registry.clear();
        event!(verbose, "Context closed with {} error(s)", errors.len());

        Error::combine(errors)
    }

    /// 装配失败时在辅助线程中关闭，最多等待 `close_timeout`
    fn close_with_timeout(&self) {
        let timeout = self.inner.config.close_timeout;
        let (tx, rx) = mpsc::channel();
        let ctx = self.clone();
        let spawned = std::thread::Builder::new()
            .name("trellis-close".to_string())
            .spawn(move || {
                let _ = tx.send(ctx.close());
            });

        let result = match spawned {
            Ok(_) => rx.recv_timeout(timeout),
            Err(e) => {
                tracing::warn!("Close context inline, helper thread failed: {}", e);
                Ok(self.close())
            }
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Close context after failure: {}", e),
            Err(_) => tracing::warn!("Close context timed out after {:?}", timeout),
        }
    }
}

fn field_spec(handle: &BeanHandle, index: usize) -> Option<&InjectionSpec> {
    handle.def().and_then(|def| def.fields().get(index))
}

/// 工厂占位展开为当前所有产出
fn expand(list: Vec<Arc<BeanHandle>>) -> Vec<Arc<BeanHandle>> {
    let mut out = Vec::with_capacity(list.len());
    for handle in list {
        match handle.factory() {
            Some(node) => out.extend(node.instances()),
            None => out.push(handle),
        }
    }
    out
}

/// 同一个具体类型不能既由工厂生产又由其他 bean 提供
fn check_producers(core: &Core) -> Result<()> {
    for (key, list) in &core.groups {
        if key.is_interface() || list.len() < 2 || !list.iter().any(|h| h.factory().is_some()) {
            continue;
        }
        let producers = list
            .iter()
            .map(|h| match h.factory() {
                Some(node) => node.bean.name(),
                None => h.name(),
            })
            .collect();
        return Err(Error::RepeatedProducer {
            target: key.name().to_string(),
            producers,
        });
    }
    Ok(())
}

/// "C required by B required by A"
fn required_by(chain: &[Arc<BeanHandle>]) -> String {
    chain
        .iter()
        .rev()
        .map(|h| h.class().name())
        .collect::<Vec<_>>()
        .join(" required by ")
}

fn destroy(handle: &BeanHandle, verbose: bool) -> Result<()> {
    if handle.lifecycle() != Lifecycle::Initialized {
        return Ok(());
    }
    let Some(disposable) = handle
        .object_ref()
        .and_then(|o| o.capabilities().disposable.clone())
    else {
        return Ok(());
    };

    let name = handle.name();
    event!(verbose, "Destroy {}", handle);
    handle.set_lifecycle(Lifecycle::Destroying);
    call_hook(&name, "destroy", || disposable.destroy()).map_err(|e| match e {
        HookFailure::Error(source) => Error::Destroy {
            bean: name.clone(),
            source,
        },
        HookFailure::Panic(err) => err,
    })?;
    handle.set_lifecycle(Lifecycle::Destroyed);
    Ok(())
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Context [has_parent={}, types={}, disposables={}]",
            self.inner.parent.is_some(),
            self.snapshot().groups.len(),
            self.inner.disposables.lock().len()
        )
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

enum ChildState {
    Pending,
    Ready(Context),
    Failed(Error),
    Closed,
}

/// 延迟创建的子上下文
///
/// 作为 bean 扫描进父上下文，首次调用 [`ChildContext::object`] 时以父上下文为父装配；
/// 父上下文关闭时先关闭它。
///
/// ```ignore
/// let ctx = Context::new(beans![ChildContext::new("worker", beans![Worker::default()])])?;
/// let worker = ctx.children()[0].object()?;
/// ```
#[derive(Bean)]
pub struct ChildContext {
    role: String,
    #[inject]
    parent: Inject<Context>,
    count: usize,
    items: Mutex<Vec<Scan>>,
    state: Mutex<ChildState>,
}

impl ChildContext {
    pub fn new(role: impl Into<String>, items: Vec<Scan>) -> Self {
        Self {
            role: role.into(),
            parent: Inject::new(),
            count: items.len(),
            items: Mutex::new(items),
            state: Mutex::new(ChildState::Pending),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn is_created(&self) -> bool {
        matches!(*self.state.lock(), ChildState::Ready(_))
    }

    /// 取得子上下文，首次调用时创建；失败时之后的调用返回同一个错误
    pub fn object(&self) -> Result<Context> {
        let mut state = self.state.lock();
        match &*state {
            ChildState::Ready(ctx) => return Ok(ctx.clone()),
            ChildState::Failed(e) => return Err(e.clone()),
            ChildState::Closed => return Err(Error::Closed(self.role.clone())),
            ChildState::Pending => {}
        }

        let parent = self.parent.get().ok_or_else(|| {
            Error::declaration(
                std::any::type_name::<Self>(),
                format!("child context '{}' is not registered in a parent context", self.role),
            )
        })?;
        let items = std::mem::take(&mut *self.items.lock());
        tracing::debug!("Create child context '{}' with {} item(s)", self.role, self.count);

        let result = parent.extend(items);
        *state = match &result {
            Ok(ctx) => ChildState::Ready(ctx.clone()),
            Err(e) => ChildState::Failed(e.clone()),
        };
        result
    }

    /// 关闭已创建的子上下文，只执行一次
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, ChildState::Closed);
        match previous {
            ChildState::Ready(ctx) => ctx.close(),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ChildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChildContext [created={}, role={}, beans={}]",
            self.is_created(),
            self.role,
            self.count
        )
    }
}

impl fmt::Debug for ChildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDef;
    use crate::lifecycle::{DisposableBean, InitializingBean};
    use crate::slot::InjectList;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        inits: AtomicUsize,
        destroys: AtomicUsize,
    }

    impl InitializingBean for Counter {
        fn post_construct(&self) -> anyhow::Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl DisposableBean for Counter {
        fn destroy(&self) -> anyhow::Result<()> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Bean for Counter {
        fn definition() -> BeanDef {
            BeanDef::of::<Self>()
        }

        fn capabilities(this: &Arc<Self>) -> crate::bean::Capabilities {
            crate::bean::Capabilities {
                initializing: Some(this.clone()),
                disposable: Some(this.clone()),
                ..Default::default()
            }
        }
    }

    #[derive(Default)]
    struct Holder {
        ctx: Inject<Context>,
        props: Inject<Properties>,
        counters: InjectList<Counter>,
    }

    fn holder_ctx(h: &Holder) -> &Inject<Context> {
        &h.ctx
    }

    fn holder_props(h: &Holder) -> &Inject<Properties> {
        &h.props
    }

    fn holder_counters(h: &Holder) -> &InjectList<Counter> {
        &h.counters
    }

    impl Bean for Holder {
        fn definition() -> BeanDef {
            BeanDef::of::<Self>()
                .inject(InjectionSpec::field("ctx", holder_ctx))
                .inject(InjectionSpec::field("props", holder_props))
                .inject(InjectionSpec::field("counters", holder_counters))
        }
    }

    #[test]
    fn test_context_and_properties_are_beans() {
        let holder = Arc::new(Holder::default());
        let ctx = Context::new(vec![Scan::shared(holder.clone()), Scan::bean(Counter::default())]).unwrap();

        assert!(holder.ctx.core().contains(&TypeKey::of::<Holder>()));
        assert!(Arc::ptr_eq(holder.props.get().unwrap(), &ctx.properties()));
        assert_eq!(holder.counters.len(), 1);
        assert_eq!(holder.counters.items()[0].inits.load(Ordering::SeqCst), 1);
        ctx.close().unwrap();
    }

    #[test]
    fn test_close_runs_once_and_releases() {
        let counter = Arc::new(Counter::default());
        let ctx = Context::new(vec![Scan::shared(counter.clone())]).unwrap();
        assert_eq!(ctx.bean::<Counter>(0).len(), 1);
        assert!(ctx.to_string().contains("disposables=1"));

        ctx.close().unwrap();
        ctx.close().unwrap();
        assert_eq!(counter.destroys.load(Ordering::SeqCst), 1);
        assert!(ctx.is_closed());
        assert!(ctx.bean::<Counter>(0).is_empty());
        assert!(ctx.core().is_empty());
    }

    #[test]
    fn test_lookup_by_name() {
        let ctx = Context::new(vec![Scan::bean(Counter::default())]).unwrap();
        let name = TypeKey::of::<Counter>().name();
        assert_eq!(ctx.lookup(name, 0).len(), 1);
        assert!(ctx.lookup("missing", -1).is_empty());
        ctx.close().unwrap();
    }

    #[test]
    fn test_child_context_lazy() {
        let ctx = Context::new(vec![Scan::child(ChildContext::new(
            "worker",
            vec![Scan::bean(Counter::default())],
        ))])
        .unwrap();

        let children = ctx.children();
        assert_eq!(children.len(), 1);
        assert!(!children[0].is_created());

        let child = children[0].object().unwrap();
        let again = children[0].object().unwrap();
        assert!(Arc::ptr_eq(&child.inner, &again.inner));
        assert!(child.parent().is_some());
        assert_eq!(child.bean::<Counter>(1).len(), 1);
        assert!(ctx.bean::<Counter>(0).is_empty());

        ctx.close().unwrap();
        assert!(child.is_closed());
        assert!(matches!(children[0].object(), Err(Error::Closed(_))));
    }

    #[test]
    fn test_builder_config_is_inherited() {
        let ctx = Context::builder()
            .verbose(true)
            .close_timeout(Duration::from_secs(5))
            .scan(Counter::default())
            .build()
            .unwrap();
        assert!(ctx.config().verbose);
        assert_eq!(ctx.config().close_timeout, Duration::from_secs(5));

        let child = ctx.extend(vec![]).unwrap();
        assert!(child.config().verbose);
        assert_eq!(child.config().close_timeout, Duration::from_secs(5));
        assert_eq!(ContextConfig::default().close_timeout, DEFAULT_CLOSE_TIMEOUT);

        child.close().unwrap();
        ctx.close().unwrap();
    }
}

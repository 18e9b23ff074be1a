//! 注入引擎
//!
//! 对单个字段：按层级收集候选、排序、按限定名过滤，然后写入注入槽。
//! 候选若仍是未物化的工厂占位，记录一个 [`PendingAssignment`]，在构造阶段由工厂产出后再写入。

use std::any::Any;
use std::sync::Arc;

use crate::bean::{BeanHandle, InjectionSpec, PropertySpec};
use crate::error::{Error, Result};
use crate::factory::PendingAssignment;
use crate::lifecycle::Lifecycle;
use crate::logging::event;
use crate::properties::Properties;
use crate::slot::{Shape, Slot, SlotError};
use crate::types::TypeKey;

/// 一代上下文中的候选，`level` 从 1（当前上下文）开始计数
#[derive(Clone)]
pub(crate) struct Generation {
    pub(crate) level: i32,
    pub(crate) list: Vec<Arc<BeanHandle>>,
}

/// 按查找层级合并候选
///
/// `deep` 只包含非空的代，按由近到远排列。
pub(crate) fn level_beans(deep: &[Generation], level: i32) -> Vec<Arc<BeanHandle>> {
    match level {
        -1 => deep.iter().flat_map(|g| g.list.iter().cloned()).collect(),
        0 => deep.first().map(|g| g.list.clone()).unwrap_or_default(),
        1 => match deep.first() {
            Some(g) if g.level == 1 => g.list.clone(),
            _ => Vec::new(),
        },
        _ => deep
            .iter()
            .take_while(|g| g.level <= level)
            .flat_map(|g| g.list.iter().cloned())
            .collect(),
    }
}

/// 有序 bean 按 order 升序排在前面，其余保持原有顺序
pub(crate) fn order_beans(candidates: Vec<Arc<BeanHandle>>) -> Vec<Arc<BeanHandle>> {
    let (mut ordered, unordered): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|h| h.order().is_some());
    ordered.sort_by_key(|h| h.order().unwrap_or_default());
    ordered.extend(unordered);
    ordered
}

pub(crate) fn filter_by_qualifier(
    candidates: Vec<Arc<BeanHandle>>,
    qualifier: Option<&str>,
) -> Vec<Arc<BeanHandle>> {
    match qualifier {
        Some(q) => candidates.into_iter().filter(|h| h.name() == q).collect(),
        None => candidates,
    }
}

/// 字段最终的候选列表
pub(crate) fn candidates(spec: &InjectionSpec, deep: &[Generation]) -> Vec<Arc<BeanHandle>> {
    filter_by_qualifier(
        order_beans(level_beans(deep, spec.lookup_level())),
        spec.qualifier_name(),
    )
}

fn missing(class: TypeKey, spec: &InjectionSpec) -> Error {
    Error::Missing {
        class: class.name().to_string(),
        field: spec.field_name().to_string(),
        target: spec.target().name().to_string(),
        qualifier: spec.qualifier_name().map(str::to_string),
    }
}

fn slot_error(class: TypeKey, spec: &InjectionSpec, err: SlotError) -> Error {
    match err {
        SlotError::DuplicateKey(key) => Error::DuplicateKey {
            class: class.name().to_string(),
            field: spec.field_name().to_string(),
            key,
        },
        other => Error::Injection {
            class: class.name().to_string(),
            field: spec.field_name().to_string(),
            message: other.to_string(),
        },
    }
}

fn field_slot<'a>(
    instance: &'a (dyn Any + Send + Sync),
    class: TypeKey,
    spec: &InjectionSpec,
) -> Result<&'a dyn Slot> {
    spec.slot(instance).ok_or_else(|| Error::Injection {
        class: class.name().to_string(),
        field: spec.field_name().to_string(),
        message: "field accessor does not match the bean instance".to_string(),
    })
}

/// 把一个候选写入槽
fn put(
    slot: &dyn Slot,
    class: TypeKey,
    spec: &InjectionSpec,
    position: usize,
    candidate: &BeanHandle,
) -> Result<()> {
    let value = candidate
        .view(spec.target())
        .ok_or_else(|| Error::Injection {
            class: class.name().to_string(),
            field: spec.field_name().to_string(),
            message: format!("{} can not be used as '{}'", candidate, spec.target()),
        })?;
    slot.put(position, &candidate.name(), value)
        .map_err(|e| slot_error(class, spec, e))
}

fn is_placeholder(handle: &BeanHandle) -> bool {
    handle.factory().is_some() && !handle.is_materialized()
}

/// 构造阶段的注入：写入槽并记录依赖边与待定赋值
pub(crate) fn inject_field(
    bean: &Arc<BeanHandle>,
    index: usize,
    spec: &InjectionSpec,
    deep: &[Generation],
    verbose: bool,
) -> Result<()> {
    let class = bean.class();
    let object = bean
        .object_ref()
        .ok_or_else(|| Error::declaration(class.name(), "bean has no instance to inject into"))?;
    let slot = field_slot(object.instance(), class, spec)?;

    let list = candidates(spec, deep);
    if list.is_empty() {
        if spec.is_optional() {
            event!(verbose, "Inject: optional field '{}' of '{}' left empty", spec.field_name(), class);
            return Ok(());
        }
        return Err(missing(class, spec));
    }

    if spec.shape() == Shape::Scalar && list.len() > 1 {
        return Err(Error::Ambiguous {
            class: class.name().to_string(),
            field: spec.field_name().to_string(),
            candidates: list.iter().map(|h| h.name()).collect(),
        });
    }

    for (position, candidate) in list.iter().enumerate() {
        if is_placeholder(candidate) {
            if spec.shape() == Shape::Scalar && spec.is_lazy() {
                return Err(Error::declaration(
                    class.name(),
                    format!(
                        "lazy injection of '{}' through a factory is not supported in field '{}'",
                        spec.target(),
                        spec.field_name()
                    ),
                ));
            }
            if let Some(factory) = candidate.factory() {
                event!(
                    verbose,
                    "Inject: field '{}' of '{}' waits for factory '{}'",
                    spec.field_name(),
                    class,
                    factory.bean.name()
                );
                bean.pending.lock().push(PendingAssignment {
                    factory: factory.clone(),
                    field: index,
                    position,
                });
            }
            continue;
        }

        put(slot, class, spec, position, candidate)?;
        if !spec.is_lazy() && !Arc::ptr_eq(bean, candidate) {
            bean.dependencies.lock().push(candidate.clone());
        }
    }

    event!(
        verbose,
        "Inject: field '{}' of '{}' <- {}",
        spec.field_name(),
        class,
        spec.describe()
    );
    Ok(())
}

/// 把工厂产出写入待定赋值记录的字段
pub(crate) fn assign_pending(
    bean: &BeanHandle,
    pending: &PendingAssignment,
    product: &BeanHandle,
) -> Result<()> {
    let class = bean.class();
    let def = bean
        .def()
        .ok_or_else(|| Error::declaration(class.name(), "bean has no definition"))?;
    let spec = def.fields().get(pending.field).ok_or_else(|| {
        Error::declaration(class.name(), format!("unknown field index {}", pending.field))
    })?;
    let object = bean
        .object_ref()
        .ok_or_else(|| Error::declaration(class.name(), "bean has no instance to inject into"))?;
    let slot = field_slot(object.instance(), class, spec)?;
    put(slot, class, spec, pending.position, product)
}

/// 运行时注入：只使用已初始化的候选，不记录依赖，不调用钩子
pub(crate) fn inject_runtime(
    instance: &(dyn Any + Send + Sync),
    class: TypeKey,
    spec: &InjectionSpec,
    deep: &[Generation],
) -> Result<()> {
    let slot = field_slot(instance, class, spec)?;

    let list: Vec<_> = candidates(spec, deep)
        .into_iter()
        .filter(|h| h.is_materialized() && h.lifecycle() == Lifecycle::Initialized)
        .collect();
    if list.is_empty() {
        return if spec.is_optional() {
            Ok(())
        } else {
            Err(missing(class, spec))
        };
    }
    if spec.shape() == Shape::Scalar && list.len() > 1 {
        return Err(Error::Ambiguous {
            class: class.name().to_string(),
            field: spec.field_name().to_string(),
            candidates: list.iter().map(|h| h.name()).collect(),
        });
    }
    for (position, candidate) in list.iter().enumerate() {
        put(slot, class, spec, position, candidate)?;
    }
    Ok(())
}

/// 属性注入：取属性值，缺失时使用默认值或空串
pub(crate) fn inject_properties(
    instance: &(dyn Any + Send + Sync),
    class: TypeKey,
    specs: &[PropertySpec],
    properties: &Properties,
) -> Result<()> {
    for spec in specs {
        let property_error = |message: String| Error::Property {
            class: class.name().to_string(),
            field: spec.field_name().to_string(),
            key: spec.key().to_string(),
            message,
        };
        let slot = spec
            .slot(instance)
            .ok_or_else(|| property_error("field accessor does not match the bean instance".into()))?;
        let raw = properties
            .get(spec.key())
            .or_else(|| spec.default().map(str::to_string))
            .unwrap_or_default();
        slot.assign(&raw, spec.layout_str()).map_err(property_error)?;
    }
    Ok(())
}

//! 统一的错误类型
//!
//! 容器内部使用 [`Error`] 传播错误；用户实现的生命周期钩子返回 `anyhow::Result`，
//! 由容器转换成带来源的 [`Error`] 变体。`Error` 实现了 `Clone`，
//! 这样一次性的 close 结果可以分发给所有并发调用者。

use std::sync::Arc;
use thiserror::Error;

/// 生命周期钩子返回的原始错误
pub type HookError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// 框架统一的 Result 类型
pub type Result<T> = std::result::Result<T, Error>;

/// 容器错误
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// 字段修饰符、字段形态或 bean 定义不合法
    #[error("declaration error in '{class}': {message}")]
    Declaration { class: String, message: String },

    /// 必需的依赖找不到候选
    #[error("can not find candidates for field '{field}' of type '{target}' in '{class}'{}", qualifier_suffix(.qualifier))]
    Missing {
        class: String,
        field: String,
        target: String,
        qualifier: Option<String>,
    },

    /// 标量字段匹配到多个候选
    #[error("field '{field}' in '{class}' can not be injected with multiple candidates [{}]", .candidates.join(", "))]
    Ambiguous {
        class: String,
        field: String,
        candidates: Vec<String>,
    },

    /// map 注入时出现重复的 bean 名称
    #[error("can not inject duplicate key '{key}' into map field '{field}' in '{class}'")]
    DuplicateKey {
        class: String,
        field: String,
        key: String,
    },

    /// 注入槽拒绝写入
    #[error("injection into field '{field}' in '{class}' failed: {message}")]
    Injection {
        class: String,
        field: String,
        message: String,
    },

    /// 非 lazy 依赖形成环
    #[error("detected cycle dependency {}", .path.join("->"))]
    Cycle { path: Vec<String> },

    /// 同一个具体类型存在多个生产者
    #[error("repeated producer for type '{target}': [{}]", .producers.join(", "))]
    RepeatedProducer { target: String, producers: Vec<String> },

    /// FactoryBean 生产失败
    #[error("factory '{factory}' failed to produce '{target}': {source}")]
    Factory {
        factory: String,
        target: String,
        #[source]
        source: HookError,
    },

    /// post_construct 失败，chain 为依赖链（被谁依赖）
    #[error("post construct failed {chain}: {source}")]
    PostConstruct {
        bean: String,
        chain: String,
        #[source]
        source: HookError,
    },

    /// destroy 失败
    #[error("destroy bean '{bean}' failed: {source}")]
    Destroy {
        bean: String,
        #[source]
        source: HookError,
    },

    /// 单个 bean 边界上捕获的 panic
    #[error("bean '{bean}' panicked during {phase}: {message}")]
    Panic {
        bean: String,
        phase: &'static str,
        message: String,
    },

    /// 属性注入失败
    #[error("property '{key}' injection into field '{field}' in '{class}' failed: {message}")]
    Property {
        class: String,
        field: String,
        key: String,
        message: String,
    },

    /// 属性源加载或解析失败
    #[error("properties error: {0}")]
    Properties(String),

    /// 资源包合并或读取失败
    #[error("resource error: {0}")]
    Resource(String),

    /// 单个 bean 重新加载失败
    #[error("reload of bean '{bean}' failed: {message}")]
    Reload { bean: String, message: String },

    /// 上下文已关闭
    #[error("context '{0}' is closed")]
    Closed(String),

    /// 日志系统初始化失败
    #[error("logging initialization failed: {0}")]
    Logging(String),

    /// 多个错误合并（close 时收集）
    #[error("multiple errors: [{}]", join_errors(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    pub(crate) fn declaration(class: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Declaration {
            class: class.into(),
            message: message.into(),
        }
    }

    /// 把收集到的错误合并为一个结果
    pub(crate) fn combine(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }

    /// 是否为循环依赖错误
    pub fn is_cycle(&self) -> bool {
        matches!(self, Error::Cycle { .. })
    }
}

/// 将钩子返回的 anyhow 错误转换为可共享的错误
pub(crate) fn hook_error(err: anyhow::Error) -> HookError {
    let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

/// 提取 panic 载荷中的消息
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn qualifier_suffix(qualifier: &Option<String>) -> String {
    match qualifier {
        Some(q) => format!(" with qualifier '{}'", q),
        None => String::new(),
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine() {
        assert!(Error::combine(vec![]).is_ok());

        let single = Error::combine(vec![Error::Resource("a".into())]).unwrap_err();
        assert!(matches!(single, Error::Resource(_)));

        let many = Error::combine(vec![
            Error::Resource("a".into()),
            Error::Properties("b".into()),
        ])
        .unwrap_err();
        match many {
            Error::Multiple(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_messages() {
        let err = Error::Cycle {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "detected cycle dependency A->B->A");
        assert!(err.is_cycle());

        let err = Error::Missing {
            class: "Holder".into(),
            field: "repo".into(),
            target: "Repo".into(),
            qualifier: Some("main".into()),
        };
        assert!(err.to_string().contains("with qualifier 'main'"));

        let err = Error::RepeatedProducer {
            target: "Foo".into(),
            producers: vec!["FooFactory".into(), "Foo".into()],
        };
        assert!(err.to_string().contains("repeated"));
    }

    #[test]
    fn test_hook_error_source() {
        let err = Error::Destroy {
            bean: "db".into(),
            source: hook_error(anyhow::anyhow!("connection reset")),
        };
        assert!(err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload), "unknown panic payload");
    }
}

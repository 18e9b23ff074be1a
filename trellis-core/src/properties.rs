//! 属性存储
//!
//! [`Properties`] 保存键值对，同时维护按优先级排序的 [`PropertyResolver`] 列表；
//! 查询时按优先级从高到低依次询问，存储本身也是其中一个解析器。

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::convert::{parse_bool, parse_duration, FileMode};
use crate::error::{Error, Result};
use crate::lexer::{escape, lex, Token};

/// 默认解析器优先级
pub const DEFAULT_PROPERTY_RESOLVER_PRIORITY: i32 = 100;

/// 类型化读取失败时的回调，参数为键和错误描述
pub type PropertyErrorHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// 属性解析器，优先级越高越先被询问
pub trait PropertyResolver: Send + Sync {
    fn priority(&self) -> i32;

    fn get_property(&self, key: &str) -> Option<String>;
}

#[derive(Clone)]
enum ResolverEntry {
    /// 本存储
    Local,
    External(Arc<dyn PropertyResolver>),
}

impl ResolverEntry {
    fn priority(&self, local: i32) -> i32 {
        match self {
            ResolverEntry::Local => local,
            ResolverEntry::External(r) => r.priority(),
        }
    }
}

struct Inner {
    priority: i32,
    store: HashMap<String, String>,
    comments: HashMap<String, Vec<String>>,
    resolvers: Vec<ResolverEntry>,
    on_error: Option<PropertyErrorHandler>,
}

impl Inner {
    fn sort(&mut self) {
        let local = self.priority;
        self.resolvers
            .sort_by_key(|entry| std::cmp::Reverse(entry.priority(local)));
    }
}

/// 属性存储
pub struct Properties {
    inner: RwLock<Inner>,
}

impl Properties {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                priority: DEFAULT_PROPERTY_RESOLVER_PRIORITY,
                store: HashMap::new(),
                comments: HashMap::new(),
                resolvers: vec![ResolverEntry::Local],
                on_error: None,
            }),
        }
    }

    /// 注册一个解析器，按优先级降序稳定排序
    pub fn register(&self, resolver: Arc<dyn PropertyResolver>) {
        let mut inner = self.inner.write();
        inner.resolvers.push(ResolverEntry::External(resolver));
        inner.sort();
    }

    /// 已注册的外部解析器（不含本存储），按查询顺序
    pub fn resolvers(&self) -> Vec<Arc<dyn PropertyResolver>> {
        self.inner
            .read()
            .resolvers
            .iter()
            .filter_map(|entry| match entry {
                ResolverEntry::External(r) => Some(r.clone()),
                ResolverEntry::Local => None,
            })
            .collect()
    }

    /// 设置类型化读取失败时的回调；未设置时记录 warn 日志
    pub fn set_error_handler(&self, handler: Option<PropertyErrorHandler>) {
        self.inner.write().on_error = handler;
    }

    pub fn error_handler(&self) -> Option<PropertyErrorHandler> {
        self.inner.read().on_error.clone()
    }

    /// 解析器数量（含本存储）
    pub fn resolver_count(&self) -> usize {
        self.inner.read().resolvers.len()
    }

    /// 继承父存储的全部解析器
    ///
    /// 本存储的优先级提升到 `max(self, parent) + 1`，父存储自身作为解析器加入。
    pub fn extend(&self, parent: &Arc<Properties>) {
        let inherited: Vec<ResolverEntry> = {
            let parent_inner = parent.inner.read();
            parent_inner
                .resolvers
                .iter()
                .map(|entry| match entry {
                    ResolverEntry::Local => {
                        ResolverEntry::External(parent.clone() as Arc<dyn PropertyResolver>)
                    }
                    external => external.clone(),
                })
                .collect()
        };
        let parent_priority = parent.priority();

        let mut inner = self.inner.write();
        inner.priority = inner.priority.max(parent_priority) + 1;
        inner.resolvers.extend(inherited);
        inner.sort();
    }

    pub fn priority(&self) -> i32 {
        self.inner.read().priority
    }

    /// 按解析器顺序查找
    pub fn get(&self, key: &str) -> Option<String> {
        let resolvers = self.inner.read().resolvers.clone();
        for entry in resolvers {
            let found = match entry {
                ResolverEntry::Local => self.inner.read().store.get(key).cloned(),
                ResolverEntry::External(r) => r.get_property(key),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.typed(key, default, parse_bool)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.typed(key, default, |s| s.trim().parse::<i64>().map_err(|e| e.to_string()))
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.typed(key, default, |s| s.trim().parse::<f32>().map_err(|e| e.to_string()))
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.typed(key, default, |s| s.trim().parse::<f64>().map_err(|e| e.to_string()))
    }

    pub fn get_duration(&self, key: &str, default: Duration) -> Duration {
        self.typed(key, default, parse_duration)
    }

    pub fn get_file_mode(&self, key: &str, default: FileMode) -> FileMode {
        self.get(key).map(|s| FileMode::parse(&s)).unwrap_or(default)
    }

    fn typed<T>(
        &self,
        key: &str,
        default: T,
        parse: impl FnOnce(&str) -> std::result::Result<T, String>,
    ) -> T {
        match self.get(key) {
            Some(raw) => match parse(&raw) {
                Ok(value) => value,
                Err(e) => {
                    match self.error_handler() {
                        Some(handler) => handler(key, e.as_str()),
                        None => {
                            tracing::warn!("Property '{}' has invalid value '{}': {}", key, raw, e)
                        }
                    }
                    default
                }
            },
            None => default,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().store.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        inner.comments.remove(key);
        inner.store.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.store.clear();
        inner.comments.clear();
    }

    /// 只检查本存储
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().store.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.read().store.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().store.is_empty()
    }

    pub fn map(&self) -> HashMap<String, String> {
        self.inner.read().store.clone()
    }

    pub fn comments(&self, key: &str) -> Vec<String> {
        self.inner
            .read()
            .comments
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_comments(&self, key: impl Into<String>, comments: Vec<String>) {
        self.inner.write().comments.insert(key.into(), comments);
    }

    pub fn clear_comments(&self) {
        self.inner.write().comments.clear();
    }

    /// 载入 TOML 表，嵌套表展开为以 `.` 连接的键
    pub fn load_map(&self, table: &toml::Table) {
        let mut inner = self.inner.write();
        let mut prefix = String::new();
        flatten(&mut inner.store, &mut prefix, table);
    }

    pub fn load_toml(&self, text: &str) -> Result<()> {
        let table: toml::Table =
            toml::from_str(text).map_err(|e| Error::Properties(e.to_string()))?;
        self.load_map(&table);
        Ok(())
    }

    pub fn load(&self, mut reader: impl Read) -> Result<()> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| Error::Properties(e.to_string()))?;
        self.parse(&content)
    }

    /// 解析 `.properties` 文本
    pub fn parse(&self, content: &str) -> Result<()> {
        let mut key: Option<String> = None;
        let mut comments = Vec::new();

        let mut inner = self.inner.write();
        for token in lex(content) {
            match token {
                Token::Eof => {
                    if let Some(key) = key.take() {
                        if !comments.is_empty() {
                            inner.comments.insert(key.clone(), std::mem::take(&mut comments));
                        }
                        inner.store.insert(key, String::new());
                    }
                    break;
                }
                Token::Comment(text) => {
                    if let Some(key) = &key {
                        return Err(Error::Properties(format!(
                            "comment is not expected inside the property on key '{}'",
                            key
                        )));
                    }
                    comments.push(text);
                }
                Token::Key(text) => {
                    if let Some(key) = &key {
                        return Err(Error::Properties(format!(
                            "key is not expected inside the property on key '{}'",
                            key
                        )));
                    }
                    key = Some(text);
                }
                Token::Value(text) => {
                    let Some(current) = key.take() else {
                        return Err(Error::Properties(
                            "value is not expected outside of the property".to_string(),
                        ));
                    };
                    if !comments.is_empty() {
                        inner
                            .comments
                            .insert(current.clone(), std::mem::take(&mut comments));
                    }
                    inner.store.insert(current, text);
                }
                Token::Error(message) => {
                    return Err(Error::Properties(match &key {
                        Some(key) => format!("property parsing error on key '{}', {}", key, message),
                        None => format!("property parsing error, {}", message),
                    }));
                }
            }
        }
        Ok(())
    }

    /// 排序后的 `.properties` 文本
    pub fn dump(&self) -> String {
        let inner = self.inner.read();
        let mut keys: Vec<&String> = inner.store.keys().collect();
        keys.sort();

        let mut out = String::new();
        for key in keys {
            if let Some(comments) = inner.comments.get(key) {
                for comment in comments.iter().filter(|c| !c.is_empty()) {
                    out.push_str("# ");
                    out.push_str(comment);
                    out.push('\n');
                }
            }
            out.push_str(&escape(key, " :"));
            out.push_str(" = ");
            out.push_str(&escape(&inner.store[key], ""));
            out.push('\n');
        }
        out
    }

    pub fn save(&self, mut writer: impl Write) -> io::Result<usize> {
        let text = self.dump();
        writer.write_all(text.as_bytes())?;
        Ok(text.len())
    }
}

impl Default for Properties {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyResolver for Properties {
    fn priority(&self) -> i32 {
        Properties::priority(self)
    }

    fn get_property(&self, key: &str) -> Option<String> {
        self.inner.read().store.get(key).cloned()
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        write!(
            f,
            "Properties{{priority={},store={},comments={},resolvers={},errorHandler={}}}",
            inner.priority,
            inner.store.len(),
            inner.comments.len(),
            inner.resolvers.len(),
            inner.on_error.is_some()
        )
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn flatten(store: &mut HashMap<String, String>, prefix: &mut String, table: &toml::Table) {
    for (k, v) in table {
        let len = prefix.len();
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(k);
        match v {
            toml::Value::Table(next) => flatten(store, prefix, next),
            other => {
                store.insert(prefix.clone(), scalar_text(other));
            }
        }
        prefix.truncate(len);
    }
}

/// 数组按 `;` 连接，与列表属性的写法一致
fn scalar_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(";"),
        other => other.to_string(),
    }
}

/// 扫描时传入的属性源
#[derive(Debug, Clone, Default)]
pub struct PropertySource {
    /// `"<资源包>:<路径>"`，`.toml` 结尾按 TOML 解析，否则按 `.properties` 解析
    pub path: Option<String>,
    pub map: Option<toml::Table>,
}

impl PropertySource {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            map: None,
        }
    }

    pub fn table(map: toml::Table) -> Self {
        Self {
            path: None,
            map: Some(map),
        }
    }

    /// 从任意可序列化的配置结构生成
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match toml::Value::try_from(value) {
            Ok(toml::Value::Table(map)) => Ok(Self::table(map)),
            Ok(other) => Err(Error::Properties(format!(
                "expected a table, got {}",
                other.type_str()
            ))),
            Err(e) => Err(Error::Properties(e.to_string())),
        }
    }
}

use crate::error::{Error, Result};
use crate::properties::Properties;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// 按上下文的 verbose 开关选择日志级别
///
/// 开启时写 `info`，否则写 `debug`。
macro_rules! event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub(crate) use event;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

static LEVELS: [(LogLevel, &str, Level); 5] = [
    (LogLevel::Trace, "trace", Level::TRACE),
    (LogLevel::Debug, "debug", Level::DEBUG),
    (LogLevel::Info, "info", Level::INFO),
    (LogLevel::Warn, "warn", Level::WARN),
    (LogLevel::Error, "error", Level::ERROR),
];

impl LogLevel {
    fn entry(self) -> &'static (LogLevel, &'static str, Level) {
        // LEVELS 按枚举顺序排列
        &LEVELS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.entry().1
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = if name == "warning" { "warn" } else { name.as_str() };
        LEVELS
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(level, _, _)| *level)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        level.entry().2
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 单行紧凑输出，默认
    Compact,
    Full,
    /// 每个事件一行 JSON
    Json,
    /// 多行输出，适合本地调试
    Pretty,
}

static FORMATS: [(LogFormat, &str); 4] = [
    (LogFormat::Compact, "compact"),
    (LogFormat::Full, "full"),
    (LogFormat::Json, "json"),
    (LogFormat::Pretty, "pretty"),
];

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        FORMATS[self as usize].1
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        FORMATS
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(format, _)| *format)
            .ok_or_else(|| format!("unknown log format '{}'", s))
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Base = Layered<EnvFilter, Registry>;

/// 订阅者配置
///
/// ```ignore
/// LoggingConfig::new().level(LogLevel::Debug).format(LogFormat::Json).init()?;
/// ```
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// 关闭后输出不带时间
    pub show_timestamp: bool,
    /// 输出事件所在模块
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_thread_names: bool,
    /// `EnvFilter` 指令，如 `trellis_core=debug,greeter=info`；设置后忽略 `level`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_timestamp: true,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_timestamp(mut self, enabled: bool) -> Self {
        self.show_timestamp = enabled;
        self
    }

    pub fn show_target(mut self, enabled: bool) -> Self {
        self.show_target = enabled;
        self
    }

    pub fn show_thread_ids(mut self, enabled: bool) -> Self {
        self.show_thread_ids = enabled;
        self
    }

    pub fn show_thread_names(mut self, enabled: bool) -> Self {
        self.show_thread_names = enabled;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取配置：`RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`
    ///
    /// 无法解析的级别或格式沿用默认值。
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        let defaults = Self::default();
        Self {
            level: var("LOG_LEVEL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.level),
            format: var("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.format),
            filter: var("RUST_LOG"),
            ..defaults
        }
    }

    /// 从属性读取配置
    ///
    /// 支持 `logging.level`、`logging.format`、`logging.filter`、
    /// `logging.timestamp` 与 `logging.target`。
    pub fn from_properties(properties: &Properties) -> Self {
        let mut config = Self::default();

        if let Some(level) = properties.get("logging.level") {
            match level.parse() {
                Ok(level) => config.level = level,
                Err(e) => tracing::warn!("{}", e),
            }
        }
        if let Some(format) = properties.get("logging.format") {
            match format.parse() {
                Ok(format) => config.format = format,
                Err(e) => tracing::warn!("{}", e),
            }
        }
        config.filter = properties.get("logging.filter").filter(|f| !f.trim().is_empty());
        config.show_timestamp = properties.get_bool("logging.timestamp", config.show_timestamp);
        config.show_target = properties.get_bool("logging.target", config.show_target);

        config
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    fn layer(&self) -> Box<dyn Layer<Base> + Send + Sync> {
        let layer = fmt::layer()
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);

        match (self.format, self.show_timestamp) {
            (LogFormat::Compact, true) => layer.compact().boxed(),
            (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
            (LogFormat::Full, true) => layer.boxed(),
            (LogFormat::Full, false) => layer.without_time().boxed(),
            (LogFormat::Json, true) => layer.json().boxed(),
            (LogFormat::Json, false) => layer.json().without_time().boxed(),
            (LogFormat::Pretty, true) => layer.pretty().boxed(),
            (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        }
    }

    /// 安装全局订阅者；已安装时返回 [`Error::Logging`]
    pub fn init(self) -> Result<()> {
        tracing_subscriber::registry()
            .with(self.env_filter())
            .with(self.layer())
            .try_init()
            .map_err(|e| Error::Logging(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" trace ".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_properties() {
        let props = Properties::new();
        props.set("logging.level", "debug");
        props.set("logging.format", "json");
        props.set("logging.filter", "trellis_core=trace");
        props.set("logging.timestamp", "off");

        let config = LoggingConfig::from_properties(&props);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("trellis_core=trace"));
        assert!(!config.show_timestamp);
        assert!(!config.show_target);
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::new()
            .level(LogLevel::Warn)
            .format(LogFormat::Full)
            .show_thread_ids(true)
            .filter("warn");
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.show_thread_ids);
        assert_eq!(config.filter.as_deref(), Some("warn"));
    }
}

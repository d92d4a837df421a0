//! Named loggers shared by the SDK modules.
//!
//! Every module keeps its own [`Logger`] (for example `@umami/analytics`). Levels can be tuned
//! per logger or globally through [`set_log_level`], and applications can observe every emitted
//! record with [`set_user_log_handler`].

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static REGISTERED: LazyLock<Mutex<Vec<Weak<LoggerState>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));
static GLOBAL_USER_CALLBACK: LazyLock<RwLock<Option<(LogCallback, Option<LogLevel>)>>> =
    LazyLock::new(|| RwLock::new(None));

type Handler = Arc<dyn Fn(&Logger, LogLevel, &str) + Send + Sync + 'static>;

/// Callback invoked for every record that passes the level filter.
pub type LogCallback = Arc<dyn Fn(LogRecord) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Logger {
    state: Arc<LoggerState>,
}

struct LoggerState {
    name: String,
    level: AtomicU8,
    handler: RwLock<Handler>,
    user_handler: RwLock<Option<Handler>>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        let state = Arc::new(LoggerState {
            name: name.into(),
            level: AtomicU8::new(GLOBAL_LOG_LEVEL.load(Ordering::SeqCst)),
            handler: RwLock::new(Arc::new(console_handler)),
            user_handler: RwLock::new(installed_user_handler()),
        });
        if let Ok(mut registered) = REGISTERED.lock() {
            registered.push(Arc::downgrade(&state));
        }
        Self { state }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.state.level.load(Ordering::SeqCst))
    }

    pub fn set_log_level<L>(&self, level: L) -> Result<(), LogError>
    where
        L: IntoLogLevel,
    {
        let level = level.into_log_level()?;
        self.state.level.store(level as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Replaces the handler that writes records out (stdout/stderr by default).
    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(&Logger, LogLevel, &str) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.state.handler.write() {
            *slot = Arc::new(handler);
        }
    }

    pub fn reset_log_handler(&self) {
        if let Ok(mut slot) = self.state.handler.write() {
            *slot = Arc::new(console_handler);
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Debug, message.as_ref());
    }

    pub fn log(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Verbose, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Error, message.as_ref());
    }

    fn emit(&self, level: LogLevel, message: &str) {
        let user = self
            .state
            .user_handler
            .read()
            .ok()
            .and_then(|slot| slot.clone());
        if let Some(user) = user {
            user(self, level, message);
        }
        let handler = self.state.handler.read().ok().map(|slot| slot.clone());
        if let Some(handler) = handler {
            handler(self, level, message);
        }
    }

    fn set_user_handler(&self, handler: Option<Handler>) {
        if let Ok(mut slot) = self.state.user_handler.write() {
            *slot = handler;
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name())
            .field("level", &self.log_level())
            .finish()
    }
}

fn console_handler(logger: &Logger, level: LogLevel, message: &str) {
    if level < logger.log_level() || level == LogLevel::Silent {
        return;
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let header = format!("[{}]  {}:", now, logger.name());
    match level {
        LogLevel::Warn | LogLevel::Error => eprintln!("{header} {message}"),
        _ => println!("{header} {message}"),
    }
}

fn for_each_logger<F>(mut f: F)
where
    F: FnMut(Logger),
{
    let Ok(mut registered) = REGISTERED.lock() else {
        return;
    };
    registered.retain(|weak| match weak.upgrade() {
        Some(state) => {
            f(Logger { state });
            true
        }
        None => false,
    });
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Silent = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Verbose,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

pub trait IntoLogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError>;
}

impl IntoLogLevel for LogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        Ok(self)
    }
}

impl IntoLogLevel for &str {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(self)
    }
}

impl IntoLogLevel for String {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(&self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Threshold for the user callback; falls back to each logger's own level.
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub logger_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => {
                write!(f, "Invalid value \"{level}\" assigned to `logLevel`")
            }
        }
    }
}

impl std::error::Error for LogError {}

/// Sets the level of every live logger and of loggers created afterwards.
pub fn set_log_level<L>(level: L) -> Result<(), LogError>
where
    L: IntoLogLevel,
{
    let level = level.into_log_level()?;
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    for_each_logger(|logger| {
        let _ = logger.set_log_level(level);
    });
    Ok(())
}

/// Installs (or clears, with `None`) a callback receiving records from every logger, including
/// loggers created after this call.
pub fn set_user_log_handler(callback: Option<LogCallback>, options: Option<LogOptions>) {
    let threshold = options.unwrap_or_default().level;
    if let Ok(mut installed) = GLOBAL_USER_CALLBACK.write() {
        *installed = callback
            .as_ref()
            .map(|callback| (Arc::clone(callback), threshold));
    }
    for_each_logger(|logger| {
        let handler = callback
            .as_ref()
            .map(|callback| user_handler(Arc::clone(callback), threshold));
        logger.set_user_handler(handler);
    });
}

fn installed_user_handler() -> Option<Handler> {
    let installed = GLOBAL_USER_CALLBACK.read().ok()?;
    let (callback, threshold) = installed.as_ref()?;
    Some(user_handler(Arc::clone(callback), *threshold))
}

fn user_handler(callback: LogCallback, threshold: Option<LogLevel>) -> Handler {
    Arc::new(move |instance: &Logger, level: LogLevel, message: &str| {
        if level < threshold.unwrap_or_else(|| instance.log_level()) {
            return;
        }
        callback(LogRecord {
            level,
            message: message.to_owned(),
            logger_name: instance.name().to_owned(),
        });
    })
}

/// Serializes tests that touch the process-wide log level or user callback.
#[cfg(test)]
pub(crate) static TEST_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

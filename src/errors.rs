use thiserror::Error;

use crate::infrastructure::module::ModuleError;

/// 处理器/工厂返回的通用错误类型
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// 依赖注入容器错误
///
/// 除 `ConstructionFailed` / `InitializationFailed` 外都属于装配期的契约违规，
/// 调用方不应重试。
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("No binding registered for '{capability}'{}", requested_by_suffix(.requested_by))]
    UnresolvedDependency {
        capability: String,
        requested_by: Option<String>,
    },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("'{capability}' is already bound; register with an explicit override to replace it")]
    DuplicateBinding { capability: String },

    #[error("Scope '{scope}' is disposed; '{operation}' is not allowed")]
    DisposedScopeAccess { scope: String, operation: &'static str },

    #[error("Type mismatch while resolving '{capability}': expected {expected} ({context})")]
    TypeMismatch {
        capability: String,
        expected: &'static str,
        context: &'static str,
    },

    #[error("Failed to construct '{capability}': {source}")]
    ConstructionFailed {
        capability: String,
        #[source]
        source: HandlerError,
    },

    #[error("Initializer of '{capability}' failed: {source}")]
    InitializationFailed {
        capability: String,
        #[source]
        source: HandlerError,
    },

    #[error("Resolution of '{capability}' exceeded the maximum depth of {limit}")]
    ResolutionDepthExceeded { capability: String, limit: usize },
}

fn requested_by_suffix(requested_by: &Option<String>) -> String {
    match requested_by {
        Some(parent) => format!(" (requested by '{}')", parent),
        None => String::new(),
    }
}

impl ContainerError {
    /// 包装工厂返回的任意错误；容器自身的错误原样透传
    pub fn construction(capability: impl Into<String>, error: HandlerError) -> Self {
        match error.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(source) => ContainerError::ConstructionFailed {
                capability: capability.into(),
                source,
            },
        }
    }

    /// 是否为装配期契约违规
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ContainerError::UnresolvedDependency { .. }
                | ContainerError::CircularDependency { .. }
                | ContainerError::DuplicateBinding { .. }
                | ContainerError::DisposedScopeAccess { .. }
        )
    }
}

/// 事件分发过程中被隔离的失败
#[derive(Debug, Error)]
pub enum DispatchFailure {
    #[error("Handler #{subscription} on topic '{topic}' failed: {source}")]
    HandlerFailed {
        topic: String,
        subscription: u64,
        #[source]
        source: HandlerError,
    },

    #[error("Handler #{subscription} on topic '{topic}' panicked: {message}")]
    HandlerPanicked {
        topic: String,
        subscription: u64,
        message: String,
    },

    #[error("Dropped event on topic '{topic}': reentrant queue is full ({limit} pending)")]
    QueueOverflow { topic: String, limit: usize },
}

impl DispatchFailure {
    pub fn topic(&self) -> &str {
        match self {
            DispatchFailure::HandlerFailed { topic, .. }
            | DispatchFailure::HandlerPanicked { topic, .. }
            | DispatchFailure::QueueOverflow { topic, .. } => topic,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for '{field}'")]
    InvalidValue { field: String, value: String },
}

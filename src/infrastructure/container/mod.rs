//! 依赖注入容器
//!
//! 提供类型安全的服务注册和解析功能，支持：
//! - 单例 / 作用域 / 瞬态三种生命周期
//! - 以 trait 对象作为能力标识（`dyn Clock` -> `SystemClock`）
//! - 具名绑定
//! - 构造 -> 初始化 -> 缓存的注入协议
//! - 循环依赖与解析深度检测

mod binding;
mod key;
mod resolver;
mod service_container;
mod stats;

pub use binding::{Binding, Factory, Initializer, ReleaseHook};
pub use key::Key;
pub(crate) use key::short_type_name;
pub use resolver::Resolver;
pub use service_container::{ContainerOptions, ServiceContainer, DEFAULT_MAX_RESOLUTION_DEPTH};
pub use stats::ContainerStats;

pub use crate::errors::ContainerError;

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    /// 单例 - 容器生命周期内只有一个实例，缓存在根作用域
    Singleton,
    /// 瞬态 - 每次请求都创建新实例
    Transient,
    /// 作用域 - 在同一作用域内共享实例
    Scoped,
}

//! 进程内装配运行时：依赖注入容器、响应式属性、事件总线与生命周期作用域。

pub mod app;
pub mod bus;
pub mod config;
pub mod demo;
pub mod errors;
pub mod infrastructure;
pub mod logging;
pub mod reactive;
pub mod scope;
pub mod subscription;

// Re-export commonly used items for convenience
pub use app::{App, AppBuilder, AppContext};
pub use bus::EventBus;
pub use config::AppConfig;
pub use errors::{ContainerError, DispatchFailure, HandlerError, WiringError};
pub use infrastructure::container::{Binding, Key, Resolver, ServiceContainer, ServiceLifetime};
pub use infrastructure::module::{Module, ModuleError};
pub use reactive::{ReactiveProperty, ReadOnlyProperty};
pub use scope::{Disposable, Disposer, Scope};
pub use subscription::Subscription;

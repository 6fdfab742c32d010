//! 基础设施层
//!
//! - 依赖注入容器
//! - 模块管理

pub mod container;
pub mod module;

// 重新导出API
pub use container::{ContainerError, ServiceContainer, ServiceLifetime};
pub use module::{Module, ModuleError, ModuleManager, ModuleStatus};

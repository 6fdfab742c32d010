//! 模块抽象层
//!
//! 定义模块的安装、启动和依赖关系管理。模块在组合根中按依赖的
//! 拓扑顺序先全部安装（注册绑定），再全部启动（解析并连线）。

use super::container::{ContainerError, ServiceContainer};
use crate::app::AppContext;
use crate::errors::HandlerError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// 模块状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// 已注册，尚未安装
    Registered,
    /// 绑定已安装
    Installed,
    /// 已启动
    Started,
    /// 安装或启动失败
    Failed,
    /// 模块被禁用
    Disabled,
}

/// 模块接口
pub trait Module: Send + Sync {
    /// 模块名称
    fn name(&self) -> &str;

    /// 模块版本
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// 依赖的模块
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// 向容器注册绑定
    fn install(&self, container: &ServiceContainer) -> Result<(), ModuleError>;

    /// 所有模块安装完成后调用，可解析服务并建立订阅
    fn start(&self, _context: &AppContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// 检查模块是否可用
    fn is_enabled(&self) -> bool {
        true
    }
}

/// 模块错误
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    DependencyNotFound { module: String, dependency: String },

    #[error("Module '{module}' depends on disabled module '{dependency}'")]
    DependencyDisabled { module: String, dependency: String },

    #[error("Circular module dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Module '{module}' failed to start: {source}")]
    StartFailed {
        module: String,
        #[source]
        source: HandlerError,
    },
}

impl ModuleError {
    pub fn start_failed(module: impl Into<String>, source: impl Into<HandlerError>) -> Self {
        ModuleError::StartFailed {
            module: module.into(),
            source: source.into(),
        }
    }
}

/// 模块管理器
#[derive(Default)]
pub struct ModuleManager {
    modules: Vec<Arc<dyn Module>>,
    status: HashMap<String, ModuleStatus>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块，名称重复时报错
    pub fn register_module(&mut self, module: Arc<dyn Module>) -> Result<(), ModuleError> {
        let name = module.name().to_string();
        if self.status.contains_key(&name) {
            return Err(ModuleError::DuplicateModule(name));
        }

        let status = if module.is_enabled() {
            ModuleStatus::Registered
        } else {
            ModuleStatus::Disabled
        };
        debug!(module = %name, version = module.version(), ?status, "Module registered");
        self.status.insert(name, status);
        self.modules.push(module);
        Ok(())
    }

    /// 按依赖关系计算启用模块的顺序（依赖在前，同级保持注册顺序）
    pub fn resolve_order(&self) -> Result<Vec<Arc<dyn Module>>, ModuleError> {
        let by_name: HashMap<&str, &Arc<dyn Module>> =
            self.modules.iter().map(|m| (m.name(), m)).collect();
        let mut visiting = Vec::new();
        let mut done = HashSet::new();
        let mut order = Vec::new();

        for module in self.modules.iter().filter(|m| m.is_enabled()) {
            Self::visit(module, &by_name, &mut visiting, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        module: &Arc<dyn Module>,
        by_name: &HashMap<&str, &Arc<dyn Module>>,
        visiting: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<Arc<dyn Module>>,
    ) -> Result<(), ModuleError> {
        let name = module.name();
        if done.contains(name) {
            return Ok(());
        }
        if let Some(position) = visiting.iter().position(|entry| entry == name) {
            let mut cycle = visiting[position..].to_vec();
            cycle.push(name.to_string());
            return Err(ModuleError::CircularDependency(cycle));
        }

        visiting.push(name.to_string());
        for dependency in module.dependencies() {
            let Some(target) = by_name.get(dependency) else {
                return Err(ModuleError::DependencyNotFound {
                    module: name.to_string(),
                    dependency: dependency.to_string(),
                });
            };
            if !target.is_enabled() {
                return Err(ModuleError::DependencyDisabled {
                    module: name.to_string(),
                    dependency: dependency.to_string(),
                });
            }
            Self::visit(target, by_name, visiting, done, order)?;
        }
        visiting.pop();

        done.insert(name.to_string());
        order.push(module.clone());
        Ok(())
    }

    /// 按顺序安装所有启用的模块
    pub fn install_all(&mut self, container: &ServiceContainer) -> Result<(), ModuleError> {
        for module in self.resolve_order()? {
            let result = module.install(container);
            self.record(module.name(), &result, ModuleStatus::Installed);
            result?;
            info!(module = module.name(), "Module installed");
        }
        Ok(())
    }

    /// 按顺序启动所有已安装的模块
    pub fn start_all(&mut self, context: &AppContext) -> Result<(), ModuleError> {
        for module in self.resolve_order()? {
            if self.module_status(module.name()) != Some(ModuleStatus::Installed) {
                continue;
            }
            let result = module.start(context);
            self.record(module.name(), &result, ModuleStatus::Started);
            result?;
            info!(module = module.name(), "Module started");
        }
        Ok(())
    }

    fn record(&mut self, name: &str, result: &Result<(), ModuleError>, success: ModuleStatus) {
        let status = if result.is_ok() {
            success
        } else {
            ModuleStatus::Failed
        };
        self.status.insert(name.to_string(), status);
    }

    /// 获取模块状态
    pub fn module_status(&self, name: &str) -> Option<ModuleStatus> {
        self.status.get(name).copied()
    }

    /// 获取所有模块状态
    pub fn all_module_statuses(&self) -> HashMap<String, ModuleStatus> {
        self.status.clone()
    }

    /// 获取已启动的模块（按注册顺序）
    pub fn started_modules(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|m| m.name().to_string())
            .filter(|name| self.module_status(name) == Some(ModuleStatus::Started))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

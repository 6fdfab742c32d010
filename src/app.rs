//! 组合根
//!
//! [`AppBuilder`] 显式创建容器与事件总线，按依赖顺序安装并启动模块。
//! 事件总线作为单例实例注册，并最先被根作用域跟踪，因此在关闭时最后释放。

use crate::bus::EventBus;
use crate::config::AppConfig;
use crate::errors::WiringError;
use crate::infrastructure::container::{ContainerError, ServiceContainer};
use crate::infrastructure::module::{Module, ModuleManager};
use crate::logging::OperationTimer;
use crate::scope::Scope;
use std::sync::Arc;
use tracing::info;

/// 模块启动时可用的运行期上下文
#[derive(Clone, Debug)]
pub struct AppContext {
    container: ServiceContainer,
    bus: EventBus,
    config: Arc<AppConfig>,
}

impl AppContext {
    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn root_scope(&self) -> &Scope {
        self.container.root_scope()
    }

    /// 在根作用域中解析服务
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve::<T>()
    }

    /// 创建根作用域的子作用域
    pub fn create_scope(&self, name: impl Into<String>) -> Result<Scope, ContainerError> {
        self.container.create_scope(self.root_scope(), name)
    }
}

#[derive(Default)]
pub struct AppBuilder {
    config: AppConfig,
    modules: Vec<Arc<dyn Module>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_module<M>(mut self, module: M) -> Self
    where
        M: Module + 'static,
    {
        self.modules.push(Arc::new(module));
        self
    }

    /// 装配应用：失败时已创建的资源会随根作用域一起释放
    pub fn build(self) -> Result<App, WiringError> {
        let timer = OperationTimer::new("bootstrap").with_metadata("modules", self.modules.len());
        let container = ServiceContainer::with_options(self.config.container_options());
        let bus = EventBus::with_options(self.config.bus_options());
        let config = Arc::new(self.config);

        match Self::assemble(&container, &bus, &config, self.modules) {
            Ok(modules) => {
                timer.finish();
                Ok(App {
                    context: AppContext {
                        container,
                        bus,
                        config,
                    },
                    modules,
                })
            }
            Err(err) => {
                container.dispose();
                Err(err)
            }
        }
    }

    fn assemble(
        container: &ServiceContainer,
        bus: &EventBus,
        config: &Arc<AppConfig>,
        pending: Vec<Arc<dyn Module>>,
    ) -> Result<ModuleManager, WiringError> {
        container.root_scope().track(bus.clone())?;
        container.register_instance(Arc::new(bus.clone()))?;
        container.register_instance(config.clone())?;

        let mut modules = ModuleManager::new();
        for module in pending {
            modules.register_module(module)?;
        }
        modules.install_all(container)?;

        let context = AppContext {
            container: container.clone(),
            bus: bus.clone(),
            config: config.clone(),
        };
        modules.start_all(&context)?;
        Ok(modules)
    }
}

/// 已装配的应用；丢弃时自动关闭
pub struct App {
    context: AppContext,
    modules: ModuleManager,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.context.container
    }

    pub fn bus(&self) -> &EventBus {
        &self.context.bus
    }

    pub fn root_scope(&self) -> &Scope {
        self.context.root_scope()
    }

    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    /// 释放根作用域（幂等）
    pub fn shutdown(&self) {
        if self.root_scope().is_disposed() {
            return;
        }
        info!(
            summary = %self.container().stats().performance_summary(),
            "Shutting down"
        );
        self.root_scope().dispose();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root_scope().is_disposed()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}

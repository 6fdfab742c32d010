use super::{Key, ServiceContainer};
use crate::errors::ContainerError;
use crate::scope::Scope;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// 传给工厂与初始化钩子的解析上下文
///
/// 携带当前解析路径，依赖通过它解析时才能做循环检测并报告请求方。
/// 不对外暴露容器本身：绕过路径的嵌套解析既无法检测循环，也不受深度上限约束。
pub struct Resolver<'a> {
    container: &'a ServiceContainer,
    scope: &'a Scope,
    path: &'a RefCell<Vec<Key>>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        container: &'a ServiceContainer,
        scope: &'a Scope,
        path: &'a RefCell<Vec<Key>>,
    ) -> Self {
        Self {
            container,
            scope,
            path,
        }
    }

    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container
            .resolve_key::<T>(Key::of::<T>(), self.scope, self.path)
    }

    pub fn resolve_named<T>(&self, name: &str) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container
            .resolve_key::<T>(Key::named::<T>(name), self.scope, self.path)
    }

    /// 实例所属的作用域（单例为根作用域）
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// 当前解析路径（最外层在前）
    pub fn path(&self) -> Vec<Key> {
        self.path.borrow().clone()
    }
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.path.borrow().iter().map(Key::to_string).collect();
        f.debug_struct("Resolver")
            .field("scope", &self.scope.name())
            .field("path", &path)
            .finish()
    }
}

use super::binding::{Binding, ErasedBinding};
use super::stats::{ContainerStats, InnerStats};
use super::{Key, Resolver, ServiceLifetime};
use crate::errors::{ContainerError, HandlerError};
use crate::scope::{Instance, Scope};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 64;

/// 容器参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerOptions {
    /// 单次解析允许的最大依赖深度
    pub max_resolution_depth: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
        }
    }
}

/// 依赖注入容器
///
/// 显式注册表：能力标识 -> 绑定。单例缓存在根作用域中，
/// scoped 实例缓存在解析时所在的作用域中，瞬态实例不缓存。
/// 克隆得到的句柄共享同一注册表与根作用域。
#[derive(Clone)]
pub struct ServiceContainer {
    /// 绑定注册表
    bindings: Arc<DashMap<Key, Arc<dyn ErasedBinding>>>,
    /// 根作用域（单例缓存）
    root: Scope,
    options: ContainerOptions,
    stats: Arc<InnerStats>,
}

impl ServiceContainer {
    /// 创建新的容器实例
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
            root: Scope::root("root"),
            options,
            stats: Arc::new(InnerStats::default()),
        }
    }

    /// 注册绑定
    ///
    /// 同一能力已绑定且未声明 `allow_override` 时返回 `DuplicateBinding`；
    /// 覆盖时丢弃根作用域中已缓存的旧实例。
    pub fn register_binding<T>(&self, binding: Binding<T>) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = binding.key().clone();
        let lifetime = binding.lifetime();
        let overridden = match self.bindings.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if !binding.is_override() {
                    return Err(ContainerError::DuplicateBinding {
                        capability: key.to_string(),
                    });
                }
                entry.insert(Arc::new(binding));
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(binding));
                false
            }
        };

        if overridden {
            warn!(capability = %key, lifetime = ?lifetime, "Binding overridden");
            self.root.evict_instance(&key);
        } else {
            debug!(capability = %key, lifetime = ?lifetime, "Binding registered");
        }
        Ok(())
    }

    /// 注册单例服务
    pub fn register_singleton<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        self.register_binding(Binding::singleton(factory))
    }

    /// 注册瞬态服务
    pub fn register_transient<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        self.register_binding(Binding::transient(factory))
    }

    /// 注册作用域服务
    pub fn register_scoped<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        self.register_binding(Binding::scoped(factory))
    }

    /// 注册已构造好的单例
    pub fn register_instance<T>(&self, instance: Arc<T>) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_binding(Binding::instance(instance))
    }

    /// 在根作用域中解析
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_in::<T>(&self.root)
    }

    pub fn resolve_named<T>(&self, name: &str) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_named_in::<T>(&self.root, name)
    }

    /// 在指定作用域中解析
    pub fn resolve_in<T>(&self, scope: &Scope) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let path = RefCell::new(Vec::new());
        self.resolve_key::<T>(Key::of::<T>(), scope, &path)
    }

    pub fn resolve_named_in<T>(&self, scope: &Scope, name: &str) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let path = RefCell::new(Vec::new());
        self.resolve_key::<T>(Key::named::<T>(name), scope, &path)
    }

    pub(crate) fn resolve_key<T>(
        &self,
        key: Key,
        scope: &Scope,
        path: &RefCell<Vec<Key>>,
    ) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = self.resolve_erased(key.clone(), scope, path)?;
        downcast::<T>(&key, instance)
    }

    fn resolve_erased(
        &self,
        key: Key,
        scope: &Scope,
        path: &RefCell<Vec<Key>>,
    ) -> Result<Instance, ContainerError> {
        self.stats.record_resolution();

        let binding = self
            .bindings
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ContainerError::UnresolvedDependency {
                capability: key.to_string(),
                requested_by: path.borrow().last().map(Key::to_string),
            })?;

        scope.ensure_active("resolve")?;
        let lifetime = binding.lifetime();
        let target = match lifetime {
            ServiceLifetime::Singleton => &self.root,
            ServiceLifetime::Scoped | ServiceLifetime::Transient => scope,
        };
        target.ensure_active("resolve")?;

        if lifetime != ServiceLifetime::Transient {
            if let Some(instance) = target.cached_instance(&key) {
                self.stats.record_cache_hit();
                return Ok(instance);
            }
        }

        self.enter(&key, path)?;
        let constructed = {
            let resolver = Resolver::new(self, target, path);
            binding.construct(&resolver)
        };
        path.borrow_mut().pop();
        let constructed = constructed?;

        self.stats.record_creation(lifetime);
        trace!(capability = %key, lifetime = ?lifetime, scope = %target.name(), "Instance constructed");

        match lifetime {
            ServiceLifetime::Transient => {
                if let Some(release) = constructed.release {
                    target.track_boxed(release)?;
                }
            }
            ServiceLifetime::Singleton | ServiceLifetime::Scoped => {
                target.cache_instance(key, constructed.instance.clone(), constructed.release)?;
            }
        }
        Ok(constructed.instance)
    }

    /// 把能力压入解析路径，检查循环与深度
    fn enter(&self, key: &Key, path: &RefCell<Vec<Key>>) -> Result<(), ContainerError> {
        let mut path = path.borrow_mut();
        if let Some(position) = path.iter().position(|entry| entry == key) {
            self.stats.record_cycle();
            let mut cycle: Vec<String> = path[position..].iter().map(Key::to_string).collect();
            cycle.push(key.to_string());
            return Err(ContainerError::CircularDependency { path: cycle });
        }
        if path.len() >= self.options.max_resolution_depth {
            return Err(ContainerError::ResolutionDepthExceeded {
                capability: key.to_string(),
                limit: self.options.max_resolution_depth,
            });
        }
        path.push(key.clone());
        Ok(())
    }

    /// 创建子作用域
    pub fn create_scope(&self, parent: &Scope, name: impl Into<String>) -> Result<Scope, ContainerError> {
        parent.create_child(name)
    }

    pub fn root_scope(&self) -> &Scope {
        &self.root
    }

    pub fn options(&self) -> ContainerOptions {
        self.options
    }

    /// 检查服务是否已注册
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.bindings.contains_key(&Key::of::<T>())
    }

    pub fn is_registered_named<T: ?Sized + 'static>(&self, name: &str) -> bool {
        self.bindings.contains_key(&Key::named::<T>(name))
    }

    /// 获取已注册的能力标识（按显示名排序）
    pub fn registered_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.bindings.iter().map(|entry| entry.key().clone()).collect();
        keys.sort_by_cached_key(Key::to_string);
        keys
    }

    /// 获取容器统计信息
    pub fn stats(&self) -> ContainerStats {
        self.stats
            .snapshot(self.bindings.len(), self.root.info().instance_count)
    }

    /// 重置统计信息
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// 释放根作用域及其中的全部实例与资源
    pub fn dispose(&self) {
        self.root.dispose();
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("bindings", &self.bindings.len())
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

fn downcast<T>(key: &Key, instance: Instance) -> Result<Arc<T>, ContainerError>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| ContainerError::TypeMismatch {
            capability: key.to_string(),
            expected: std::any::type_name::<T>(),
            context: "resolved instance",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Leaf;

    #[derive(Debug)]
    struct Branch {
        leaf: Arc<Leaf>,
    }

    #[test]
    fn test_resolves_dependency_graph() {
        let container = ServiceContainer::new();
        container
            .register_singleton(|_| Ok(Arc::new(Leaf)))
            .unwrap();
        container
            .register_transient(|r| {
                Ok(Arc::new(Branch {
                    leaf: r.resolve::<Leaf>()?,
                }))
            })
            .unwrap();

        let first = container.resolve::<Branch>().unwrap();
        let second = container.resolve::<Branch>().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.leaf, &second.leaf));
        let stats = container.stats();
        assert_eq!(stats.singleton_creations, 1);
        assert_eq!(stats.transient_creations, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.total_resolutions, 4);
    }

    #[test]
    fn test_unresolved_dependency_names_requester() {
        let container = ServiceContainer::new();
        container
            .register_singleton(|r| {
                Ok(Arc::new(Branch {
                    leaf: r.resolve::<Leaf>()?,
                }))
            })
            .unwrap();

        let err = container.resolve::<Branch>().unwrap_err();
        match err {
            ContainerError::UnresolvedDependency {
                capability,
                requested_by,
            } => {
                assert_eq!(capability, "Leaf");
                assert_eq!(requested_by.as_deref(), Some("Branch"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_initializer_runs_before_instance_is_visible() {
        let container = ServiceContainer::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_factory = order.clone();
        let order_init = order.clone();
        container
            .register_binding(
                Binding::singleton(move |_| {
                    order_factory.lock().push("construct");
                    Ok(Arc::new(Leaf))
                })
                .on_initialize(move |_, resolver| {
                    order_init.lock().push("initialize");
                    assert_eq!(resolver.path().len(), 1);
                    Ok(())
                }),
            )
            .unwrap();

        container.resolve::<Leaf>().unwrap();
        container.resolve::<Leaf>().unwrap();

        assert_eq!(*order.lock(), vec!["construct", "initialize"]);
    }

    #[test]
    fn test_initializer_failure_is_reported() {
        let container = ServiceContainer::new();
        container
            .register_binding(
                Binding::singleton(|_| Ok(Arc::new(Leaf))).on_initialize(|_, _| Err("not ready".into())),
            )
            .unwrap();

        let err = container.resolve::<Leaf>().unwrap_err();
        assert!(matches!(err, ContainerError::InitializationFailed { .. }));
        assert_eq!(container.root_scope().info().instance_count, 0);
    }

    #[test]
    fn test_depth_guard() {
        struct Level<const N: usize>;

        let container = ServiceContainer::with_options(ContainerOptions {
            max_resolution_depth: 2,
        });
        container.register_transient(|_| Ok(Arc::new(Level::<0>))).unwrap();
        container
            .register_transient(|r| {
                r.resolve::<Level<0>>()?;
                Ok(Arc::new(Level::<1>))
            })
            .unwrap();
        container
            .register_transient(|r| {
                r.resolve::<Level<1>>()?;
                Ok(Arc::new(Level::<2>))
            })
            .unwrap();

        assert!(container.resolve::<Level<1>>().is_ok());
        assert!(matches!(
            container.resolve::<Level<2>>(),
            Err(ContainerError::ResolutionDepthExceeded { limit: 2, .. })
        ));
    }

    #[test]
    fn test_self_dependency_through_resolver_is_a_cycle() {
        let container = ServiceContainer::new();
        container
            .register_transient(|r| {
                r.resolve::<Leaf>()?;
                Ok(Arc::new(Leaf))
            })
            .unwrap();

        match container.resolve::<Leaf>() {
            Err(ContainerError::CircularDependency { path }) => {
                assert_eq!(path, vec!["Leaf", "Leaf"]);
            }
            other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
        }
        assert_eq!(container.stats().circular_dependencies, 1);
    }

    #[test]
    fn test_override_replaces_cached_singleton() {
        let container = ServiceContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = built.clone();
        container
            .register_singleton(move |_| {
                built_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Leaf))
            })
            .unwrap();
        let original = container.resolve::<Leaf>().unwrap();

        let replacement = Arc::new(Leaf);
        container
            .register_binding(Binding::instance(replacement.clone()).allow_override())
            .unwrap();

        let resolved = container.resolve::<Leaf>().unwrap();
        assert!(Arc::ptr_eq(&resolved, &replacement));
        assert!(!Arc::ptr_eq(&resolved, &original));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registered_keys_are_sorted() {
        let container = ServiceContainer::new();
        container.register_singleton(|_| Ok(Arc::new(Leaf))).unwrap();
        container
            .register_binding(Binding::singleton(|_| Ok(Arc::new(Leaf))).named("spare"))
            .unwrap();
        container
            .register_singleton(|r| {
                Ok(Arc::new(Branch {
                    leaf: r.resolve::<Leaf>()?,
                }))
            })
            .unwrap();

        let keys: Vec<String> = container.registered_keys().iter().map(Key::to_string).collect();
        assert_eq!(keys, vec!["Branch", "Leaf", "Leaf#spare"]);
        assert!(container.is_registered_named::<Leaf>("spare"));
        assert!(!container.is_registered_named::<Leaf>("other"));
    }
}

use super::{Key, Resolver, ServiceLifetime};
use crate::errors::{ContainerError, HandlerError};
use crate::scope::{Disposable, Instance};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// 工厂：通过 [`Resolver`] 解析构造依赖并返回实例
pub type Factory<T> = Arc<dyn Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync>;

/// 构造后的初始化钩子，执行期间该能力仍在解析路径上
pub type Initializer<T> = Arc<dyn Fn(&Arc<T>, &Resolver<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// 实例随所属作用域释放时调用
pub type ReleaseHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// 绑定：能力标识 -> 工厂 + 生命周期
pub struct Binding<T: ?Sized> {
    key: Key,
    lifetime: ServiceLifetime,
    factory: Factory<T>,
    initializer: Option<Initializer<T>>,
    release: Option<ReleaseHook<T>>,
    allow_override: bool,
}

impl<T> Binding<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub fn new<F>(lifetime: ServiceLifetime, factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        Self {
            key: Key::of::<T>(),
            lifetime,
            factory: Arc::new(factory),
            initializer: None,
            release: None,
            allow_override: false,
        }
    }

    pub fn singleton<F>(factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        Self::new(ServiceLifetime::Singleton, factory)
    }

    pub fn transient<F>(factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        Self::new(ServiceLifetime::Transient, factory)
    }

    pub fn scoped<F>(factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, HandlerError> + Send + Sync + 'static,
    {
        Self::new(ServiceLifetime::Scoped, factory)
    }

    /// 预先构造好的单例
    pub fn instance(instance: Arc<T>) -> Self {
        Self::singleton(move |_| Ok(instance.clone()))
    }

    /// 改为具名绑定
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.key = Key::named::<T>(name);
        self
    }

    pub fn on_initialize<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&Arc<T>, &Resolver<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.release = Some(Arc::new(hook));
        self
    }

    /// 允许替换已有绑定
    pub fn allow_override(mut self) -> Self {
        self.allow_override = true;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }

    pub fn is_override(&self) -> bool {
        self.allow_override
    }
}

impl<T> Binding<T>
where
    T: ?Sized + Disposable + 'static,
{
    /// 实例释放时调用其 [`Disposable::dispose`]
    pub fn disposing(self) -> Self {
        self.on_release(|instance: &T| instance.dispose())
    }
}

impl<T: ?Sized> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("initializer", &self.initializer.is_some())
            .field("release", &self.release.is_some())
            .field("allow_override", &self.allow_override)
            .finish()
    }
}

/// 构造结果：类型擦除后的实例与可选的释放器
pub(crate) struct Constructed {
    pub instance: Instance,
    pub release: Option<Box<dyn Disposable>>,
}

/// 类型擦除的绑定
pub(crate) trait ErasedBinding: Send + Sync {
    fn key(&self) -> &Key;

    fn lifetime(&self) -> ServiceLifetime;

    fn construct(&self, resolver: &Resolver<'_>) -> Result<Constructed, ContainerError>;
}

impl<T> ErasedBinding for Binding<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn key(&self) -> &Key {
        &self.key
    }

    fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }

    fn construct(&self, resolver: &Resolver<'_>) -> Result<Constructed, ContainerError> {
        let instance = (self.factory)(resolver)
            .map_err(|e| ContainerError::construction(self.key.to_string(), e))?;

        if let Some(initializer) = &self.initializer {
            initializer(&instance, resolver).map_err(|e| match e.downcast::<ContainerError>() {
                Ok(inner) => *inner,
                Err(source) => ContainerError::InitializationFailed {
                    capability: self.key.to_string(),
                    source,
                },
            })?;
        }

        let release = self.release.as_ref().map(|hook| {
            Box::new(Release {
                instance: Mutex::new(Some(instance.clone())),
                hook: hook.clone(),
            }) as Box<dyn Disposable>
        });

        Ok(Constructed {
            instance: Arc::new(instance),
            release,
        })
    }
}

/// 把释放钩子绑定到具体实例上
struct Release<T: ?Sized> {
    instance: Mutex<Option<Arc<T>>>,
    hook: ReleaseHook<T>,
}

impl<T> Disposable for Release<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn dispose(&self) {
        let instance = self.instance.lock().take();
        if let Some(instance) = instance {
            (self.hook)(&*instance);
        }
    }
}

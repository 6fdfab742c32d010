//! 生命周期作用域
//!
//! 作用域组成一棵树，每个节点拥有：
//! - 在其中创建的订阅与其它 [`Disposable`] 资源
//! - 在其中解析出的 scoped 实例（根作用域同时缓存单例）
//!
//! 释放顺序：先按创建的逆序递归释放子作用域，再按跟踪顺序的逆序（LIFO）
//! 释放自身资源，最后按缓存顺序的逆序丢弃实例。

mod disposable;

pub use disposable::{Disposable, Disposer};

use crate::errors::ContainerError;
use crate::infrastructure::container::Key;
use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// 作用域ID
pub type ScopeId = Uuid;

pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

/// 作用域状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// 可用
    Active,
    /// 正在释放，不再接受新的资源
    Disposing,
    /// 已释放
    Disposed,
}

/// 作用域信息快照
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub id: ScopeId,
    pub name: String,
    pub state: ScopeState,
    pub parent_id: Option<ScopeId>,
    pub child_count: usize,
    /// 跟踪中的可释放资源数量
    pub tracked_count: usize,
    /// 缓存的实例数量
    pub instance_count: usize,
    pub created_at: Instant,
    pub disposed_at: Option<Instant>,
}

impl ScopeInfo {
    /// 作用域存活时长
    pub fn duration(&self) -> Duration {
        match self.disposed_at {
            Some(end) => end - self.created_at,
            None => self.created_at.elapsed(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ScopeState::Active
    }
}

struct ScopeInner {
    id: ScopeId,
    name: String,
    parent: Option<Weak<ScopeInner>>,
    parent_id: Option<ScopeId>,
    created_at: Instant,
    data: Mutex<ScopeData>,
}

struct ScopeData {
    state: ScopeState,
    children: Vec<Scope>,
    /// (跟踪令牌, 资源)，按跟踪顺序
    tracked: Vec<(u64, Box<dyn Disposable>)>,
    next_token: u64,
    instances: HashMap<Key, Instance>,
    /// 实例的缓存顺序
    instance_order: Vec<Key>,
    disposed_at: Option<Instant>,
}

/// 生命周期作用域句柄（克隆共享同一节点）
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// 创建根作用域
    pub fn root(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    fn build(name: String, parent: Option<&Scope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                name,
                parent: parent.map(|p| Arc::downgrade(&p.inner)),
                parent_id: parent.map(|p| p.id()),
                created_at: Instant::now(),
                data: Mutex::new(ScopeData {
                    state: ScopeState::Active,
                    children: Vec::new(),
                    tracked: Vec::new(),
                    next_token: 0,
                    instances: HashMap::new(),
                    instance_order: Vec::new(),
                    disposed_at: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }

    pub fn state(&self) -> ScopeState {
        self.inner.data.lock().state
    }

    pub fn is_disposed(&self) -> bool {
        self.state() != ScopeState::Active
    }

    /// 创建子作用域
    pub fn create_child(&self, name: impl Into<String>) -> Result<Scope, ContainerError> {
        let mut data = self.inner.data.lock();
        if data.state != ScopeState::Active {
            return Err(self.disposed_error("create_child"));
        }

        let child = Scope::build(name.into(), Some(self));
        data.children.push(child.clone());
        debug!(scope = %self.inner.name, child = %child.inner.name, "Child scope created");
        Ok(child)
    }

    /// 跟踪资源，作用域释放时一并释放
    ///
    /// 作用域已释放时资源会被立即释放，并返回 `DisposedScopeAccess`。
    pub fn track<D>(&self, disposable: D) -> Result<(), ContainerError>
    where
        D: Disposable + 'static,
    {
        self.track_boxed(Box::new(disposable))
    }

    pub(crate) fn track_boxed(&self, disposable: Box<dyn Disposable>) -> Result<(), ContainerError> {
        self.track_with_token(disposable).map(|_| ())
    }

    fn track_with_token(&self, disposable: Box<dyn Disposable>) -> Result<u64, ContainerError> {
        let rejected = {
            let mut data = self.inner.data.lock();
            if data.state == ScopeState::Active {
                let token = data.next_token;
                data.next_token += 1;
                data.tracked.push((token, disposable));
                Ok(token)
            } else {
                Err(disposable)
            }
        };

        rejected.map_err(|disposable| {
            disposable.dispose();
            self.disposed_error("track")
        })
    }

    /// 由作用域持有订阅
    ///
    /// 订阅被显式取消时同时从作用域中移除。
    pub fn track_subscription(&self, subscription: &Subscription) -> Result<(), ContainerError> {
        let token = self.track_with_token(Box::new(subscription.clone()))?;
        let weak = Arc::downgrade(&self.inner);
        subscription.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                Scope { inner }.untrack(token);
            }
        });
        Ok(())
    }

    fn untrack(&self, token: u64) {
        let removed = {
            let mut data = self.inner.data.lock();
            let position = data.tracked.iter().position(|(entry, _)| *entry == token);
            position.map(|position| data.tracked.remove(position))
        };
        drop(removed);
    }

    /// 作用域不可用时返回 `DisposedScopeAccess`
    pub fn ensure_active(&self, operation: &'static str) -> Result<(), ContainerError> {
        if self.is_disposed() {
            return Err(self.disposed_error(operation));
        }
        Ok(())
    }

    /// 释放作用域（幂等）
    pub fn dispose(&self) {
        let (children, tracked) = {
            let mut data = self.inner.data.lock();
            if data.state != ScopeState::Active {
                return;
            }
            data.state = ScopeState::Disposing;
            (
                std::mem::take(&mut data.children),
                std::mem::take(&mut data.tracked),
            )
        };

        debug!(
            scope = %self.inner.name,
            children = children.len(),
            tracked = tracked.len(),
            "Disposing scope"
        );

        for child in children.into_iter().rev() {
            child.dispose();
        }
        for (_, disposable) in tracked.into_iter().rev() {
            disposable.dispose();
        }

        let (mut instances, order) = {
            let mut data = self.inner.data.lock();
            data.state = ScopeState::Disposed;
            data.disposed_at = Some(Instant::now());
            (
                std::mem::take(&mut data.instances),
                std::mem::take(&mut data.instance_order),
            )
        };
        for key in order.iter().rev() {
            drop(instances.remove(key));
        }

        if let Some(parent) = self.parent() {
            parent.detach_child(self.id());
        }
    }

    fn detach_child(&self, child_id: ScopeId) {
        let mut data = self.inner.data.lock();
        data.children.retain(|child| child.id() != child_id);
    }

    /// 当前状态快照
    pub fn info(&self) -> ScopeInfo {
        let data = self.inner.data.lock();
        ScopeInfo {
            id: self.inner.id,
            name: self.inner.name.clone(),
            state: data.state,
            parent_id: self.inner.parent_id,
            child_count: data.children.len(),
            tracked_count: data.tracked.len(),
            instance_count: data.instances.len(),
            created_at: self.inner.created_at,
            disposed_at: data.disposed_at,
        }
    }

    pub(crate) fn cached_instance(&self, key: &Key) -> Option<Instance> {
        self.inner.data.lock().instances.get(key).cloned()
    }

    /// 缓存实例并跟踪其释放器
    pub(crate) fn cache_instance(
        &self,
        key: Key,
        instance: Instance,
        release: Option<Box<dyn Disposable>>,
    ) -> Result<(), ContainerError> {
        let rejected = {
            let mut data = self.inner.data.lock();
            if data.state == ScopeState::Active {
                if data.instances.insert(key.clone(), instance).is_none() {
                    data.instance_order.push(key);
                }
                if let Some(release) = release {
                    let token = data.next_token;
                    data.next_token += 1;
                    data.tracked.push((token, release));
                }
                None
            } else {
                Some(release)
            }
        };

        match rejected {
            None => Ok(()),
            Some(release) => {
                if let Some(release) = release {
                    release.dispose();
                }
                Err(self.disposed_error("resolve"))
            }
        }
    }

    pub(crate) fn evict_instance(&self, key: &Key) -> Option<Instance> {
        let mut data = self.inner.data.lock();
        data.instance_order.retain(|cached| cached != key);
        data.instances.remove(key)
    }

    fn disposed_error(&self, operation: &'static str) -> ContainerError {
        ContainerError::DisposedScopeAccess {
            scope: self.inner.name.clone(),
            operation,
        }
    }
}

impl Disposable for Scope {
    fn dispose(&self) {
        Scope::dispose(self)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

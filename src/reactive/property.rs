use crate::errors::ContainerError;
use crate::scope::{Disposable, Scope};
use crate::subscription::{next_subscription_id, Subscription};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// 观察者回调：`(旧值, 新值)`，订阅时的回放旧值为 `None`
pub type Observer<T> = Arc<dyn Fn(Option<&T>, &T) + Send + Sync>;

struct ObserverEntry<T> {
    subscription: Subscription,
    callback: Observer<T>,
}

impl<T> Clone for ObserverEntry<T> {
    fn clone(&self) -> Self {
        Self {
            subscription: self.subscription.clone(),
            callback: self.callback.clone(),
        }
    }
}

struct PropertyState<T> {
    value: T,
    observers: Vec<ObserverEntry<T>>,
    /// 正在通知中
    notifying: bool,
    /// 通知期间产生的变更，按发生顺序排队
    pending_changes: VecDeque<(T, T)>,
    /// 通知期间请求的退订
    pending_removals: Vec<u64>,
    disposed: bool,
}

struct PropertyInner<T> {
    state: Mutex<PropertyState<T>>,
}

impl<T> PropertyInner<T> {
    fn detach(&self, id: u64) {
        let mut state = self.state.lock();
        if state.notifying {
            state.pending_removals.push(id);
        } else {
            state.observers.retain(|entry| entry.subscription.id() != id);
        }
    }
}

/// 结束一轮通知：清除标记并应用延迟的退订
struct NotifyGuard<'a, T> {
    inner: &'a PropertyInner<T>,
}

impl<T> Drop for NotifyGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.notifying = false;
        state.pending_changes.clear();
        let removals = std::mem::take(&mut state.pending_removals);
        if !removals.is_empty() {
            state
                .observers
                .retain(|entry| !removals.contains(&entry.subscription.id()));
        }
    }
}

/// 可观察的单值单元
///
/// - 只有新值与旧值不相等时才会通知
/// - 按订阅顺序同步通知
/// - 订阅时立即回放一次当前值
///
/// 单一逻辑写者：跨线程写入的顺序由调用方保证。
pub struct ReactiveProperty<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> Clone for ReactiveProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ReactiveProperty<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                state: Mutex::new(PropertyState {
                    value,
                    observers: Vec::new(),
                    notifying: false,
                    pending_changes: VecDeque::new(),
                    pending_removals: Vec::new(),
                    disposed: false,
                }),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.state.lock().value.clone()
    }

    /// 借用读取当前值，闭包内不得再访问同一属性
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.lock().value)
    }

    /// 写入新值；与当前值相等时不做任何事
    ///
    /// 在通知回调中调用时，新值立即生效，通知排在当前一轮之后。
    pub fn set(&self, value: T) {
        {
            let mut state = self.inner.state.lock();
            if state.value == value {
                return;
            }
            let previous = std::mem::replace(&mut state.value, value.clone());
            state.pending_changes.push_back((previous, value));
            if state.notifying {
                trace!("Nested set queued until the current notification pass ends");
                return;
            }
            state.notifying = true;
        }
        self.drain_notifications();
    }

    /// 基于当前值就地修改，随后按 [`set`](Self::set) 的规则通知
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    fn drain_notifications(&self) {
        let _guard = NotifyGuard { inner: &self.inner };
        loop {
            let (change, observers) = {
                let mut state = self.inner.state.lock();
                let Some(change) = state.pending_changes.pop_front() else {
                    break;
                };
                let observers: Vec<ObserverEntry<T>> = state
                    .observers
                    .iter()
                    .filter(|entry| entry.subscription.is_active())
                    .cloned()
                    .collect();
                (change, observers)
            };

            let (previous, current) = change;
            for entry in observers {
                (entry.callback)(Some(&previous), &current);
            }
        }
    }

    /// 订阅变更，返回前以 `(None, 当前值)` 回放一次
    #[must_use = "dropping the handle does not cancel the subscription; keep it or track it in a scope"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        let id = next_subscription_id();
        let callback: Observer<T> = Arc::new(callback);

        let (subscription, current) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Subscription::inactive(id);
            }
            let weak = Arc::downgrade(&self.inner);
            let subscription = Subscription::new(id, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.detach(id);
                }
            });
            state.observers.push(ObserverEntry {
                subscription: subscription.clone(),
                callback: callback.clone(),
            });
            (subscription, state.value.clone())
        };

        callback(None, &current);
        subscription
    }

    /// 订阅并交由作用域管理其生命周期
    pub fn subscribe_in<F>(&self, scope: &Scope, callback: F) -> Result<Subscription, ContainerError>
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        scope.ensure_active("subscribe")?;
        let subscription = self.subscribe(callback);
        scope.track_subscription(&subscription)?;
        Ok(subscription)
    }

    /// 只订阅之后的变更（不回放）
    #[must_use = "dropping the handle does not cancel the subscription; keep it or track it in a scope"]
    pub fn observe_changes<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.subscribe(move |previous, current| {
            if let Some(previous) = previous {
                callback(previous, current);
            }
        })
    }

    /// 当前有效的订阅数量
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .observers
            .iter()
            .filter(|entry| entry.subscription.is_active())
            .count()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// 面向被动视图的只读视图
    pub fn read_only(&self) -> super::ReadOnlyProperty<T> {
        super::ReadOnlyProperty::new(self.clone())
    }
}

impl<T> Disposable for ReactiveProperty<T>
where
    T: Send + Sync + 'static,
{
    /// 取消全部订阅，之后的订阅会直接返回失效句柄
    fn dispose(&self) {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.observers)
        };
        for entry in observers {
            entry.subscription.dispose();
        }
    }
}

impl<T: Default + Clone + PartialEq + Send + Sync + 'static> Default for ReactiveProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ReactiveProperty")
            .field("value", &state.value)
            .field("subscribers", &state.observers.len())
            .finish()
    }
}

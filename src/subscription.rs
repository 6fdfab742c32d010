//! 订阅句柄
//!
//! [`ReactiveProperty`](crate::reactive::ReactiveProperty) 与
//! [`EventBus`](crate::bus::EventBus) 共用的可取消句柄。句柄可以克隆；
//! 任一克隆调用 [`Subscription::dispose`] 都会取消同一订阅。
//! 丢弃句柄不会取消订阅，订阅的生命周期由显式 `dispose` 或所属作用域决定。

use crate::scope::Disposable;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_subscription_id() -> u64 {
    NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed)
}

type Detach = Box<dyn FnOnce() + Send>;

struct SubscriptionInner {
    id: u64,
    active: AtomicBool,
    detach: Mutex<Option<Detach>>,
}

#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new<F>(id: u64, detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(SubscriptionInner {
                id,
                active: AtomicBool::new(true),
                detach: Mutex::new(Some(Box::new(detach))),
            }),
        }
    }

    /// 一个从未生效的订阅（源已关闭时返回）
    pub(crate) fn inactive(id: u64) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                id,
                active: AtomicBool::new(false),
                detach: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// 追加一个在订阅取消时执行的动作；已取消时立即执行
    pub(crate) fn on_dispose<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut detach = self.inner.detach.lock();
        match detach.take() {
            Some(previous) => {
                *detach = Some(Box::new(move || {
                    previous();
                    action();
                }));
            }
            None if self.is_active() => *detach = Some(Box::new(action)),
            None => {
                drop(detach);
                action();
            }
        }
    }

    /// 取消订阅（幂等）
    pub fn dispose(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let detach = self.inner.detach.lock().take();
        if let Some(detach) = detach {
            detach();
        }
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        Subscription::dispose(self)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispose_detaches_once_across_clones() {
        let detached = Arc::new(AtomicUsize::new(0));
        let detached_clone = detached.clone();
        let subscription = Subscription::new(next_subscription_id(), move || {
            detached_clone.fetch_add(1, Ordering::SeqCst);
        });
        let other = subscription.clone();

        subscription.dispose();
        other.dispose();

        assert!(!subscription.is_active());
        assert!(!other.is_active());
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inactive_subscription() {
        let subscription = Subscription::inactive(7);
        assert_eq!(subscription.id(), 7);
        assert!(!subscription.is_active());
        subscription.dispose();
    }
}

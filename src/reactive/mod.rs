//! 响应式状态
//!
//! Model 通过 [`ReactiveProperty`] 暴露状态；被动视图只拿到
//! [`ReadOnlyProperty`]，只能读取与订阅，写入留给控制器。
//!
//! 通知是同步的：`set` 返回时所有订阅者都已收到变更。

mod property;

pub use property::{Observer, ReactiveProperty};

use crate::errors::ContainerError;
use crate::scope::Scope;
use crate::subscription::Subscription;
use std::fmt;

/// [`ReactiveProperty`] 的只读视图
pub struct ReadOnlyProperty<T> {
    source: ReactiveProperty<T>,
}

impl<T> Clone for ReadOnlyProperty<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T> ReadOnlyProperty<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(source: ReactiveProperty<T>) -> Self {
        Self { source }
    }

    pub fn get(&self) -> T {
        self.source.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.source.with(f)
    }

    #[must_use = "dropping the handle does not cancel the subscription; keep it or track it in a scope"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.source.subscribe(callback)
    }

    pub fn subscribe_in<F>(&self, scope: &Scope, callback: F) -> Result<Subscription, ContainerError>
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.source.subscribe_in(scope, callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.source.subscriber_count()
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyProperty").field(&self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_read_only_view_tracks_source() {
        let score = ReactiveProperty::new(0u32);
        let view = score.read_only();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let scope = Scope::root("hud");
        view.subscribe_in(&scope, move |_, value| seen_clone.lock().push(*value))
            .unwrap();
        score.set(3);

        assert_eq!(view.get(), 3);
        assert_eq!(*seen.lock(), vec![0, 3]);

        scope.dispose();
        score.set(4);
        assert_eq!(*seen.lock(), vec![0, 3]);
        assert_eq!(view.subscriber_count(), 0);
    }
}

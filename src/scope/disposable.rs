//! 可释放资源抽象

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// 可被 [`Scope`](super::Scope) 跟踪并在作用域结束时释放的资源
///
/// 实现必须是幂等的：同一资源可能经由多个句柄被释放。
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

impl<D: Disposable + ?Sized> Disposable for Arc<D> {
    fn dispose(&self) {
        (**self).dispose()
    }
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) {
        (**self).dispose()
    }
}

/// 闭包形式的一次性释放器
pub struct Disposer {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Disposer {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// 是否已经执行过
    pub fn is_disposed(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl Disposable for Disposer {
    fn dispose(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

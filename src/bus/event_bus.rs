use super::topic::TopicKey;
use crate::errors::{ContainerError, DispatchFailure, HandlerError};
use crate::scope::{Disposable, Scope};
use crate::subscription::{next_subscription_id, Subscription};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// 错误观察钩子
pub type ErrorHook = Arc<dyn Fn(&DispatchFailure) + Send + Sync>;

type Payload = Arc<dyn Any + Send + Sync>;
type ErasedHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), HandlerError> + Send + Sync>;

pub const DEFAULT_MAX_QUEUED_EVENTS: usize = 1024;

/// 事件总线参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusOptions {
    /// 单个主题在一次分发期间允许排队的重入事件上限
    pub max_queued_events: usize,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            max_queued_events: DEFAULT_MAX_QUEUED_EVENTS,
        }
    }
}

struct HandlerEntry {
    subscription: Subscription,
    handler: ErasedHandler,
}

impl Clone for HandlerEntry {
    fn clone(&self) -> Self {
        Self {
            subscription: self.subscription.clone(),
            handler: self.handler.clone(),
        }
    }
}

#[derive(Default)]
struct TopicState {
    handlers: Vec<HandlerEntry>,
    dispatching: bool,
    queue: VecDeque<Payload>,
    pending_removals: Vec<u64>,
}

struct BusInner {
    topics: Mutex<HashMap<TopicKey, TopicState>>,
    error_hook: Mutex<ErrorHook>,
    options: BusOptions,
    closed: AtomicBool,
}

impl BusInner {
    fn detach(&self, key: &TopicKey, id: u64) {
        let mut topics = self.topics.lock();
        let Some(topic) = topics.get_mut(key) else {
            return;
        };
        if topic.dispatching {
            topic.pending_removals.push(id);
        } else {
            topic.handlers.retain(|entry| entry.subscription.id() != id);
            if topic.handlers.is_empty() {
                topics.remove(key);
            }
        }
    }
}

/// 一次分发结束后复位主题状态
struct DispatchGuard<'a> {
    inner: &'a BusInner,
    key: &'a TopicKey,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut topics = self.inner.topics.lock();
        let Some(topic) = topics.get_mut(self.key) else {
            return;
        };
        topic.dispatching = false;
        topic.queue.clear();
        let removals = std::mem::take(&mut topic.pending_removals);
        if !removals.is_empty() {
            topic
                .handlers
                .retain(|entry| !removals.contains(&entry.subscription.id()));
        }
        if topic.handlers.is_empty() {
            topics.remove(self.key);
        }
    }
}

enum Admission {
    Dispatch,
    Queued,
    NoSubscribers,
    Overflow,
}

/// 按主题分发的同步发布/订阅总线
///
/// - 按订阅顺序同步调用处理器，`publish` 返回时全部处理器已执行
/// - 处理器内向同一主题发布的事件排队，在当前分发结束后按 FIFO 处理
/// - 处理器失败（返回 `Err` 或 panic）被隔离并交给错误钩子，其余处理器照常执行
/// - 分发到达之前被取消的订阅在本次分发中跳过
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    pub fn with_options(options: BusOptions) -> Self {
        let default_hook: ErrorHook = Arc::new(|failure: &DispatchFailure| {
            error!(topic = failure.topic(), error = %failure, "Event dispatch failure");
        });
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new(HashMap::new()),
                error_hook: Mutex::new(default_hook),
                options,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> BusOptions {
        self.inner.options
    }

    /// 替换错误观察钩子
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(&DispatchFailure) + Send + Sync + 'static,
    {
        *self.inner.error_hook.lock() = Arc::new(hook);
    }

    pub fn publish<E>(&self, event: E)
    where
        E: Send + Sync + 'static,
    {
        self.publish_key(TopicKey::of::<E>(), Arc::new(event));
    }

    /// 发布到具名频道
    pub fn publish_to<E>(&self, channel: &str, event: E)
    where
        E: Send + Sync + 'static,
    {
        self.publish_key(TopicKey::on_channel::<E>(channel), Arc::new(event));
    }

    fn publish_key(&self, key: TopicKey, payload: Payload) {
        if self.is_closed() {
            warn!(topic = %key, "Publish on a disposed event bus ignored");
            return;
        }

        let admission = {
            let mut topics = self.inner.topics.lock();
            match topics.get_mut(&key) {
                None => Admission::NoSubscribers,
                Some(topic) => {
                    if topic.dispatching {
                        if topic.queue.len() >= self.inner.options.max_queued_events {
                            Admission::Overflow
                        } else {
                            topic.queue.push_back(payload);
                            Admission::Queued
                        }
                    } else if topic.handlers.is_empty() {
                        Admission::NoSubscribers
                    } else {
                        topic.dispatching = true;
                        topic.queue.push_back(payload);
                        Admission::Dispatch
                    }
                }
            }
        };

        match admission {
            Admission::Dispatch => self.dispatch(&key),
            Admission::Queued => trace!(topic = %key, "Reentrant publish queued"),
            Admission::NoSubscribers => trace!(topic = %key, "No subscribers"),
            Admission::Overflow => self.report(DispatchFailure::QueueOverflow {
                topic: key.to_string(),
                limit: self.inner.options.max_queued_events,
            }),
        }
    }

    fn dispatch(&self, key: &TopicKey) {
        let _guard = DispatchGuard {
            inner: &self.inner,
            key,
        };
        let topic_name = key.to_string();

        loop {
            let (payload, handlers) = {
                let mut topics = self.inner.topics.lock();
                let Some(topic) = topics.get_mut(key) else {
                    break;
                };
                let Some(payload) = topic.queue.pop_front() else {
                    break;
                };
                (payload, topic.handlers.clone())
            };

            for entry in handlers {
                if !entry.subscription.is_active() {
                    continue;
                }
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(payload.as_ref())));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => self.report(DispatchFailure::HandlerFailed {
                        topic: topic_name.clone(),
                        subscription: entry.subscription.id(),
                        source,
                    }),
                    Err(panic) => self.report(DispatchFailure::HandlerPanicked {
                        topic: topic_name.clone(),
                        subscription: entry.subscription.id(),
                        message: panic_message(panic.as_ref()),
                    }),
                }
            }
        }
    }

    fn report(&self, failure: DispatchFailure) {
        let hook = self.inner.error_hook.lock().clone();
        hook(&failure);
    }

    #[must_use = "dropping the handle does not cancel the subscription; keep it or track it in a scope"]
    pub fn subscribe<E, F>(&self, handler: F) -> Subscription
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_key(TopicKey::of::<E>(), erase(handler))
    }

    /// 订阅具名频道
    #[must_use = "dropping the handle does not cancel the subscription; keep it or track it in a scope"]
    pub fn subscribe_to<E, F>(&self, channel: &str, handler: F) -> Subscription
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_key(TopicKey::on_channel::<E>(channel), erase(handler))
    }

    /// 订阅并交由作用域管理其生命周期
    pub fn subscribe_in<E, F>(&self, scope: &Scope, handler: F) -> Result<Subscription, ContainerError>
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_key_in(scope, TopicKey::of::<E>(), erase(handler))
    }

    pub fn subscribe_to_in<E, F>(
        &self,
        scope: &Scope,
        channel: &str,
        handler: F,
    ) -> Result<Subscription, ContainerError>
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_key_in(scope, TopicKey::on_channel::<E>(channel), erase(handler))
    }

    fn subscribe_key_in(
        &self,
        scope: &Scope,
        key: TopicKey,
        handler: ErasedHandler,
    ) -> Result<Subscription, ContainerError> {
        scope.ensure_active("subscribe")?;
        let subscription = self.subscribe_key(key, handler);
        scope.track_subscription(&subscription)?;
        Ok(subscription)
    }

    fn subscribe_key(&self, key: TopicKey, handler: ErasedHandler) -> Subscription {
        let id = next_subscription_id();
        let mut topics = self.inner.topics.lock();
        if self.is_closed() {
            warn!(topic = %key, "Subscribe on a disposed event bus ignored");
            return Subscription::inactive(id);
        }

        let weak = Arc::downgrade(&self.inner);
        let detach_key = key.clone();
        let subscription = Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.detach(&detach_key, id);
            }
        });

        debug!(topic = %key, subscription = id, "Handler subscribed");
        topics.entry(key).or_default().handlers.push(HandlerEntry {
            subscription: subscription.clone(),
            handler,
        });
        subscription
    }

    /// 某事件类型（默认频道）当前有效的处理器数量
    pub fn subscriber_count<E: 'static>(&self) -> usize {
        self.active_handlers(&TopicKey::of::<E>())
    }

    pub fn channel_subscriber_count<E: 'static>(&self, channel: &str) -> usize {
        self.active_handlers(&TopicKey::on_channel::<E>(channel))
    }

    fn active_handlers(&self, key: &TopicKey) -> usize {
        self.inner.topics.lock().get(key).map_or(0, |topic| {
            topic
                .handlers
                .iter()
                .filter(|entry| entry.subscription.is_active())
                .count()
        })
    }

    /// 有订阅者的主题数量
    pub fn topic_count(&self) -> usize {
        self.inner.topics.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for EventBus {
    /// 关闭总线并取消全部订阅
    fn dispose(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let topics = std::mem::take(&mut *self.inner.topics.lock());
        debug!(topics = topics.len(), "Event bus disposed");
        for (_, topic) in topics {
            for entry in topic.handlers {
                entry.subscription.dispose();
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.topic_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn erase<E, F>(handler: F) -> ErasedHandler
where
    E: Send + Sync + 'static,
    F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(move |payload: &(dyn Any + Send + Sync)| match payload.downcast_ref::<E>() {
        Some(event) => handler(event),
        None => Err(format!("payload is not a {}", std::any::type_name::<E>()).into()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tick(u32);

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(Tick(1));
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn test_reentrant_publish_is_queued_fifo() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let republisher = bus.clone();
        let log_first = log.clone();
        let _first = bus.subscribe(move |tick: &Tick| {
            log_first.lock().push(format!("first:{}", tick.0));
            if tick.0 == 1 {
                republisher.publish(Tick(2));
                republisher.publish(Tick(3));
            }
            Ok(())
        });
        let log_second = log.clone();
        let _second = bus.subscribe(move |tick: &Tick| {
            log_second.lock().push(format!("second:{}", tick.0));
            Ok(())
        });

        bus.publish(Tick(1));

        assert_eq!(
            *log.lock(),
            vec!["first:1", "second:1", "first:2", "second:2", "first:3", "second:3"]
        );
    }

    #[test]
    fn test_publish_to_other_topic_runs_inline() {
        #[derive(Debug)]
        struct Echo;

        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let log_tick = log.clone();
        let _tick = bus.subscribe(move |_: &Tick| {
            log_tick.lock().push("tick-start");
            inner_bus.publish(Echo);
            log_tick.lock().push("tick-end");
            Ok(())
        });
        let log_echo = log.clone();
        let _echo = bus.subscribe(move |_: &Echo| {
            log_echo.lock().push("echo");
            Ok(())
        });

        bus.publish(Tick(0));

        assert_eq!(*log.lock(), vec!["tick-start", "echo", "tick-end"]);
    }

    #[test]
    fn test_failures_are_isolated_and_reported() {
        let bus = EventBus::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failures_clone = failures.clone();
        bus.set_error_hook(move |failure| failures_clone.lock().push(failure.to_string()));

        let delivered = Arc::new(Mutex::new(0));
        let _failing = bus.subscribe(|_: &Tick| Err("boom".into()));
        let _panicking = bus.subscribe(|_: &Tick| -> Result<(), HandlerError> { panic!("kaboom") });
        let delivered_clone = delivered.clone();
        let _healthy = bus.subscribe(move |_: &Tick| {
            *delivered_clone.lock() += 1;
            Ok(())
        });

        bus.publish(Tick(9));

        assert_eq!(*delivered.lock(), 1);
        let failures = failures.lock();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("boom"));
        assert!(failures[1].contains("kaboom"));
    }

    #[test]
    fn test_queue_overflow_is_reported() {
        let bus = EventBus::with_options(BusOptions {
            max_queued_events: 1,
        });
        let overflowed = Arc::new(Mutex::new(0));
        let overflowed_clone = overflowed.clone();
        bus.set_error_hook(move |failure| {
            if matches!(failure, DispatchFailure::QueueOverflow { .. }) {
                *overflowed_clone.lock() += 1;
            }
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let republisher = bus.clone();
        let _subscription = bus.subscribe(move |tick: &Tick| {
            seen_clone.lock().push(tick.0);
            if tick.0 == 0 {
                republisher.publish(Tick(1));
                republisher.publish(Tick(2));
            }
            Ok(())
        });

        bus.publish(Tick(0));

        assert_eq!(*seen.lock(), vec![0, 1]);
        assert_eq!(*overflowed.lock(), 1);
    }

    #[test]
    fn test_channels_are_separate_topics() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _player_two = bus.subscribe_to("p2", move |tick: &Tick| {
            seen_clone.lock().push(tick.0);
            Ok(())
        });

        bus.publish(Tick(1));
        bus.publish_to("p1", Tick(2));
        bus.publish_to("p2", Tick(3));

        assert_eq!(*seen.lock(), vec![3]);
        assert_eq!(bus.channel_subscriber_count::<Tick>("p2"), 1);
        assert_eq!(bus.subscriber_count::<Tick>(), 0);
    }

    #[test]
    fn test_disposed_bus_drops_everything() {
        let bus = EventBus::new();
        let subscription = bus.subscribe(|_: &Tick| Ok(()));

        bus.dispose();

        assert!(bus.is_closed());
        assert!(!subscription.is_active());
        assert!(!bus.subscribe(|_: &Tick| Ok(())).is_active());
        bus.publish(Tick(1));
        assert_eq!(bus.topic_count(), 0);
    }
}

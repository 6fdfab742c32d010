//! 响应式属性集成测试

use parking_lot::Mutex;
use std::sync::Arc;
use wiring::{Disposable, ReactiveProperty, Scope, Subscription};

type Changes = Arc<Mutex<Vec<(Option<String>, String)>>>;

fn record(changes: &Changes) -> impl Fn(Option<&String>, &String) + Send + Sync + 'static {
    let changes = changes.clone();
    move |previous, current| changes.lock().push((previous.cloned(), current.clone()))
}

#[test]
fn test_equal_assignments_produce_single_change() {
    let status = ReactiveProperty::new("idle".to_string());
    let changes: Changes = Arc::default();
    let _subscription = status.subscribe(record(&changes));

    status.set("idle".to_string());
    status.set("running".to_string());
    status.set("running".to_string());

    assert_eq!(
        *changes.lock(),
        vec![
            (None, "idle".to_string()),
            (Some("idle".to_string()), "running".to_string())
        ]
    );
}

#[test]
fn test_scope_disposal_leaves_no_live_subscriptions() {
    let health = ReactiveProperty::new(100u32);
    let scope = Scope::root("hud");
    let seen = Arc::new(Mutex::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let seen = seen.clone();
        handles.push(
            health
                .subscribe_in(&scope, move |_, _| *seen.lock() += 1)
                .unwrap(),
        );
    }
    assert_eq!(health.subscriber_count(), 5);
    assert_eq!(*seen.lock(), 5);

    scope.dispose();
    scope.dispose();

    assert_eq!(health.subscriber_count(), 0);
    assert!(handles.iter().all(|handle| !handle.is_active()));
    health.set(50);
    assert_eq!(*seen.lock(), 5);
}

#[test]
fn test_subscriber_added_during_notification_only_gets_replay() {
    let property = ReactiveProperty::new(0);
    let late_calls = Arc::new(Mutex::new(Vec::new()));
    let late: Arc<Mutex<Option<Subscription>>> = Arc::default();

    let source = property.clone();
    let late_calls_clone = late_calls.clone();
    let late_clone = late.clone();
    let _first = property.observe_changes(move |_, _| {
        if late_clone.lock().is_none() {
            let calls = late_calls_clone.clone();
            let subscription = source.subscribe(move |_, current| calls.lock().push(*current));
            *late_clone.lock() = Some(subscription);
        }
    });

    property.set(1);
    assert_eq!(*late_calls.lock(), vec![1]);

    property.set(2);
    assert_eq!(*late_calls.lock(), vec![1, 2]);
}

#[test]
fn test_read_only_view_observes_controller_writes() {
    let score = ReactiveProperty::new(0i64);
    let view = score.read_only();
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let rendered_clone = rendered.clone();
    let subscription = view.subscribe(move |_, value| rendered_clone.lock().push(*value));

    score.update(|value| *value += 3);
    score.update(|value| *value *= 2);
    subscription.dispose();
    score.set(-1);

    assert_eq!(*rendered.lock(), vec![0, 3, 6]);
    assert_eq!(view.get(), -1);
}

#[test]
fn test_disposed_property_refuses_new_subscribers() {
    let property = ReactiveProperty::new(1);
    property.dispose();

    let subscription = property.subscribe(|_, _| panic!("must not replay"));

    assert!(!subscription.is_active());
    assert!(property.is_disposed());
}

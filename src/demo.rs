//! 无界面的计数器场景
//!
//! - `Clock` 能力由 `SystemClock` 提供（单例）
//! - `CounterModel` 通过 [`ReactiveProperty`] 暴露状态
//! - `CounterController` 由容器构造，在初始化钩子中订阅事件总线
//! - `ConsoleView` 是被动视图：只读订阅模型，把用户动作发布到总线

use crate::app::{App, AppContext};
use crate::bus::EventBus;
use crate::errors::WiringError;
use crate::infrastructure::container::{Binding, ServiceContainer};
use crate::infrastructure::module::{Module, ModuleError};
use crate::reactive::{ReactiveProperty, ReadOnlyProperty};
use crate::scope::Scope;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_SCRIPT: &str = "inc,inc:5,dec,reset,inc:2";

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 用户动作：计数增加（可为负）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    pub by: i64,
}

/// 用户动作：清零
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reset;

#[derive(Debug)]
pub struct CounterModel {
    count: ReactiveProperty<i64>,
}

impl CounterModel {
    pub fn new() -> Self {
        Self {
            count: ReactiveProperty::new(0),
        }
    }

    pub fn count(&self) -> ReadOnlyProperty<i64> {
        self.count.read_only()
    }
}

impl Default for CounterModel {
    fn default() -> Self {
        Self::new()
    }
}

/// 把总线上的用户动作转成模型写入
pub struct CounterController {
    model: Arc<CounterModel>,
    clock: Arc<dyn Clock>,
    last_action_at: Mutex<Option<Instant>>,
    actions_handled: Mutex<u64>,
}

impl CounterController {
    pub fn new(model: Arc<CounterModel>, clock: Arc<dyn Clock>) -> Self {
        Self {
            model,
            clock,
            last_action_at: Mutex::new(None),
            actions_handled: Mutex::new(0),
        }
    }

    /// 订阅用户动作，订阅归 `scope` 所有
    pub fn attach(self: &Arc<Self>, bus: &EventBus, scope: &Scope) -> Result<(), WiringError> {
        let controller = self.clone();
        bus.subscribe_in(scope, move |event: &Increment| {
            controller.record_action();
            controller.model.count.update(|count| *count += event.by);
            Ok(())
        })?;

        let controller = self.clone();
        bus.subscribe_in(scope, move |_: &Reset| {
            controller.record_action();
            controller.model.count.set(0);
            Ok(())
        })?;
        Ok(())
    }

    fn record_action(&self) {
        *self.last_action_at.lock() = Some(self.clock.now());
        *self.actions_handled.lock() += 1;
    }

    pub fn last_action_at(&self) -> Option<Instant> {
        *self.last_action_at.lock()
    }

    pub fn actions_handled(&self) -> u64 {
        *self.actions_handled.lock()
    }
}

/// 被动视图：渲染收到的值
pub struct ConsoleView {
    echo: bool,
    lines: Mutex<Vec<String>>,
}

impl ConsoleView {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            lines: Mutex::new(Vec::new()),
        }
    }

    fn render(&self, previous: Option<i64>, current: i64) {
        let line = match previous {
            Some(previous) => format!("count: {} -> {}", previous, current),
            None => format!("count: {}", current),
        };
        if self.echo {
            println!("{}", line);
        }
        self.lines.lock().push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

/// 演示脚本中的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Increment(i64),
    Reset,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, amount) = match s.trim().split_once(':') {
            Some((name, amount)) => {
                let amount = amount
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("invalid amount in '{}'", s.trim()))?;
                (name.trim(), Some(amount))
            }
            None => (s.trim(), None),
        };
        match (name, amount) {
            ("inc", amount) => Ok(Action::Increment(amount.unwrap_or(1))),
            ("dec", amount) => Ok(Action::Increment(-amount.unwrap_or(1))),
            ("reset", None) => Ok(Action::Reset),
            _ => Err(format!("unknown action '{}'", s.trim())),
        }
    }
}

/// 解析逗号分隔的脚本，例如 `inc,inc:5,reset`
pub fn parse_script(script: &str) -> Result<Vec<Action>, String> {
    script
        .split(',')
        .filter(|step| !step.trim().is_empty())
        .map(str::parse)
        .collect()
}

pub struct CounterModule;

impl Module for CounterModule {
    fn name(&self) -> &str {
        "counter"
    }

    fn install(&self, container: &ServiceContainer) -> Result<(), ModuleError> {
        container.register_singleton::<dyn Clock, _>(|_| {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            Ok(clock)
        })?;
        container.register_singleton(|_| Ok(Arc::new(CounterModel::new())))?;
        container.register_binding(
            Binding::singleton(|r| {
                Ok(Arc::new(CounterController::new(
                    r.resolve::<CounterModel>()?,
                    r.resolve::<dyn Clock>()?,
                )))
            })
            .on_initialize(|controller, r| {
                let bus = r.resolve::<EventBus>()?;
                controller.attach(&bus, r.scope())?;
                Ok(())
            }),
        )?;
        Ok(())
    }

    fn start(&self, context: &AppContext) -> Result<(), ModuleError> {
        let controller = context.resolve::<CounterController>()?;
        debug!(handled = controller.actions_handled(), "Counter controller ready");
        Ok(())
    }
}

/// 场景结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub final_count: i64,
    pub rendered: Vec<String>,
    pub actions_handled: u64,
}

/// 在已装配的应用上运行脚本；视图订阅在场景结束时随其作用域释放
pub fn run(app: &App, actions: &[Action], echo: bool) -> Result<DemoReport, WiringError> {
    let context = app.context();
    let view_scope = context.create_scope("console-view")?;
    let model = context.resolve::<CounterModel>()?;
    let controller = context.resolve::<CounterController>()?;

    let view = Arc::new(ConsoleView::new(echo));
    let renderer = view.clone();
    model
        .count()
        .subscribe_in(&view_scope, move |previous, current| {
            renderer.render(previous.copied(), *current)
        })?;

    for action in actions {
        match *action {
            Action::Increment(by) => context.bus().publish(Increment { by }),
            Action::Reset => context.bus().publish(Reset),
        }
    }
    view_scope.dispose();

    Ok(DemoReport {
        final_count: model.count().get(),
        rendered: view.lines(),
        actions_handled: controller.actions_handled(),
    })
}

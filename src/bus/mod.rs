//! 进程内事件总线
//!
//! 主题由事件类型决定，可选再按频道名细分（例如同一 `Jumped`
//! 事件按玩家区分）。发布方与订阅方互不知晓对方。

mod event_bus;
mod topic;

pub use event_bus::{BusOptions, ErrorHook, EventBus, DEFAULT_MAX_QUEUED_EVENTS};
pub use topic::TopicKey;

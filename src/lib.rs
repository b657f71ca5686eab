// 时间账本 - 基于 Notion 的时间投入记录与数据库迁移工具

pub mod error;
pub mod event_bus;
pub mod ledger;
pub mod logger;
pub mod migration;
pub mod models;
pub mod notion;
pub mod schema;
pub mod settings;

pub use error::{LedgerError, RemoteError, Result};
pub use event_bus::{AppEvent, EventBus};

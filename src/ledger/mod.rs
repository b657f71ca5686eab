// 时间账本 - 实体模型、时间槽、会话保存、关联更新和统计

pub mod entities;
pub mod entry;
pub mod linker;
pub mod record_id;
pub mod service;
pub mod slots;
pub mod stats;

pub use entities::{
    ActivityDetail, DailyStatus, Goal, GoalStatus, MainRecord, Priority, RecordType, RemoteEnum,
    Todo, TodoStatus, ValueRating,
};
pub use entry::{ActivityEntry, SessionDraft};
pub use linker::{LinkReport, RelationLinker};
pub use service::{ItemFailure, LedgerService, SaveReport};
pub use slots::{SlotPicker, SlotRange, TimeSlot};
pub use stats::{aggregate, aggregate_by_period, ActivityStats, Period};

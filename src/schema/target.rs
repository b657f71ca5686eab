// 声明式目标结构 - 每类实体在远程数据库中应有的字段
//
// 既用于将线上数据库与声明结构做差异比较，也用于在父页面下创建数据库。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::model::{FieldType, Schema};
use crate::ledger::entities::{
    GoalStatus, Priority, RecordType, RemoteEnum, TodoStatus, ValueRating,
};
use crate::models::DatabaseIds;

/// 主记录字段
pub mod main_record {
    pub const NAME: &str = "名称";
    pub const RECORD_ID: &str = "记录ID";
    pub const CONTENT: &str = "内容";
    pub const DATE: &str = "日期";
    pub const RECORD_TYPE: &str = "记录类型";
    pub const START_TIME: &str = "开始时间";
    pub const END_TIME: &str = "结束时间";
}

/// 活动明细字段
pub mod activity {
    pub const NAME: &str = "名称";
    pub const DURATION: &str = "时长";
    pub const VALUE: &str = "价值";
    pub const TAGS: &str = "标签";
    pub const MAIN_RECORD: &str = "主记录";
    pub const GOAL: &str = "目标";
    pub const TODO: &str = "待办";
}

/// 目标字段
pub mod goal {
    pub const NAME: &str = "名称";
    pub const STATUS: &str = "状态";
    pub const PRIORITY: &str = "优先级";
    pub const TARGET_DATE: &str = "目标日期";
}

/// 待办字段
pub mod todo {
    pub const NAME: &str = "名称";
    pub const STATUS: &str = "状态";
    pub const GOAL: &str = "目标";
}

/// 每日状态字段
pub mod daily_status {
    pub const DATE: &str = "日期";
    pub const MOOD: &str = "心情";
    pub const ENERGY: &str = "精力";
    pub const SLEEP_HOURS: &str = "睡眠时长";
    pub const EXERCISED: &str = "是否运动";
    pub const EXERCISE_MINUTES: &str = "运动时长";
    pub const DIET: &str = "饮食";
    pub const NOTE: &str = "备注";
}

/// 实体类型（每类一个远程数据库）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Goal,
    Todo,
    MainRecord,
    ActivityDetail,
    DailyStatus,
}

impl EntityKind {
    /// 按关联依赖排序：被关联的数据库在前
    pub const CREATION_ORDER: [EntityKind; 5] = [
        EntityKind::Goal,
        EntityKind::Todo,
        EntityKind::MainRecord,
        EntityKind::ActivityDetail,
        EntityKind::DailyStatus,
    ];

    /// 数据库标题
    pub fn database_title(&self) -> &'static str {
        match self {
            EntityKind::Goal => "目标",
            EntityKind::Todo => "待办",
            EntityKind::MainRecord => "时间记录",
            EntityKind::ActivityDetail => "活动明细",
            EntityKind::DailyStatus => "每日状态",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            EntityKind::Goal => "goal",
            EntityKind::Todo => "todo",
            EntityKind::MainRecord => "main-record",
            EntityKind::ActivityDetail => "activity",
            EntityKind::DailyStatus => "daily-status",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "goal" => Ok(EntityKind::Goal),
            "todo" => Ok(EntityKind::Todo),
            "main-record" | "main" => Ok(EntityKind::MainRecord),
            "activity" | "activity-detail" => Ok(EntityKind::ActivityDetail),
            "daily-status" | "status" => Ok(EntityKind::DailyStatus),
            other => Err(format!(
                "未知的实体类型: {}（可选 goal / todo / main-record / activity / daily-status）",
                other
            )),
        }
    }
}

fn enum_names<E: RemoteEnum>() -> Vec<String> {
    E::all().iter().map(|e| e.remote_name().to_string()).collect()
}

/// 实体的目标字段集合；关联字段指向 `ids` 中对应的数据库
pub fn target_fields(kind: EntityKind, ids: &DatabaseIds) -> BTreeMap<String, FieldType> {
    let mut fields = BTreeMap::new();
    let mut add = |name: &str, ft: FieldType| {
        fields.insert(name.to_string(), ft);
    };

    match kind {
        EntityKind::Goal => {
            add(goal::NAME, FieldType::Title);
            add(goal::STATUS, FieldType::Select { options: enum_names::<GoalStatus>() });
            add(goal::PRIORITY, FieldType::Select { options: enum_names::<Priority>() });
            add(goal::TARGET_DATE, FieldType::Date);
        }
        EntityKind::Todo => {
            add(todo::NAME, FieldType::Title);
            add(todo::STATUS, FieldType::Select { options: enum_names::<TodoStatus>() });
            add(todo::GOAL, FieldType::relation(&ids.goal));
        }
        EntityKind::MainRecord => {
            add(main_record::NAME, FieldType::Title);
            add(main_record::RECORD_ID, FieldType::RichText);
            add(main_record::CONTENT, FieldType::RichText);
            add(main_record::DATE, FieldType::Date);
            add(
                main_record::RECORD_TYPE,
                FieldType::Select { options: enum_names::<RecordType>() },
            );
            add(main_record::START_TIME, FieldType::Date);
            add(main_record::END_TIME, FieldType::Date);
        }
        EntityKind::ActivityDetail => {
            add(activity::NAME, FieldType::Title);
            add(activity::DURATION, FieldType::number());
            add(activity::VALUE, FieldType::Select { options: enum_names::<ValueRating>() });
            add(activity::TAGS, FieldType::MultiSelect { options: Vec::new() });
            add(activity::MAIN_RECORD, FieldType::relation(&ids.main_record));
            add(activity::GOAL, FieldType::relation(&ids.goal));
            add(activity::TODO, FieldType::relation(&ids.todo));
        }
        EntityKind::DailyStatus => {
            add(daily_status::DATE, FieldType::Title);
            add(daily_status::MOOD, FieldType::number());
            add(daily_status::ENERGY, FieldType::number());
            add(daily_status::SLEEP_HOURS, FieldType::number());
            add(daily_status::EXERCISED, FieldType::Checkbox);
            add(daily_status::EXERCISE_MINUTES, FieldType::number());
            add(daily_status::DIET, FieldType::RichText);
            add(daily_status::NOTE, FieldType::RichText);
        }
    }

    fields
}

/// 声明结构（数据库 ID 取自配置）
pub fn target_schema(kind: EntityKind, ids: &DatabaseIds) -> Schema {
    Schema {
        database_id: ids.get(kind).to_string(),
        title: kind.database_title().to_string(),
        fields: target_fields(kind, ids),
    }
}

// 账本实体 - 目标、待办、主记录、活动明细、每日状态
//
// 每个实体负责与远程页面属性之间的转换。关联字段只保存页面 ID（弱引用，不级联删除）。

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::notion::{DateValue, Page, Properties, PropertyValue};
use crate::schema::target::{activity, daily_status, goal, main_record, todo};

/// 与远程单选选项一一对应的枚举
pub trait RemoteEnum: Sized + Copy + 'static {
    fn all() -> &'static [Self];

    /// 远程选项名
    fn remote_name(&self) -> &'static str;

    fn from_remote(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.remote_name() == name)
    }
}

/// 活动价值分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueRating {
    Valuable,
    Neutral,
    Wasteful,
}

impl RemoteEnum for ValueRating {
    fn all() -> &'static [Self] {
        &[ValueRating::Valuable, ValueRating::Neutral, ValueRating::Wasteful]
    }

    fn remote_name(&self) -> &'static str {
        match self {
            ValueRating::Valuable => "高价值",
            ValueRating::Neutral => "中价值",
            ValueRating::Wasteful => "低价值",
        }
    }
}

impl ValueRating {
    /// 缺失或无法识别的分类按中性处理
    pub fn from_remote_or_neutral(name: Option<&str>) -> Self {
        name.and_then(Self::from_remote).unwrap_or(ValueRating::Neutral)
    }

    pub fn key(&self) -> &'static str {
        match self {
            ValueRating::Valuable => "valuable",
            ValueRating::Neutral => "neutral",
            ValueRating::Wasteful => "wasteful",
        }
    }
}

impl std::str::FromStr for ValueRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valuable" | "high" => Ok(ValueRating::Valuable),
            "neutral" | "medium" => Ok(ValueRating::Neutral),
            "wasteful" | "low" => Ok(ValueRating::Wasteful),
            other => Self::from_remote(other).ok_or_else(|| format!("未知的价值分类: {}", other)),
        }
    }
}

/// 主记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    DailyLog,
    Plan,
    Summary,
}

impl RemoteEnum for RecordType {
    fn all() -> &'static [Self] {
        &[RecordType::DailyLog, RecordType::Plan, RecordType::Summary]
    }

    fn remote_name(&self) -> &'static str {
        match self {
            RecordType::DailyLog => "日常记录",
            RecordType::Plan => "计划",
            RecordType::Summary => "总结",
        }
    }
}

/// 目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    NotStarted,
    InProgress,
    Completed,
    Paused,
    Abandoned,
}

impl RemoteEnum for GoalStatus {
    fn all() -> &'static [Self] {
        &[
            GoalStatus::NotStarted,
            GoalStatus::InProgress,
            GoalStatus::Completed,
            GoalStatus::Paused,
            GoalStatus::Abandoned,
        ]
    }

    fn remote_name(&self) -> &'static str {
        match self {
            GoalStatus::NotStarted => "未开始",
            GoalStatus::InProgress => "进行中",
            GoalStatus::Completed => "已完成",
            GoalStatus::Paused => "已暂停",
            GoalStatus::Abandoned => "已放弃",
        }
    }
}

/// 待办状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RemoteEnum for TodoStatus {
    fn all() -> &'static [Self] {
        &[
            TodoStatus::Pending,
            TodoStatus::InProgress,
            TodoStatus::Completed,
            TodoStatus::Cancelled,
        ]
    }

    fn remote_name(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "待办",
            TodoStatus::InProgress => "进行中",
            TodoStatus::Completed => "已完成",
            TodoStatus::Cancelled => "已取消",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_name())
    }
}

/// 优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl RemoteEnum for Priority {
    fn all() -> &'static [Self] {
        &[Priority::High, Priority::Medium, Priority::Low]
    }

    fn remote_name(&self) -> &'static str {
        match self {
            Priority::High => "高",
            Priority::Medium => "中",
            Priority::Low => "低",
        }
    }
}

fn select_of<E: RemoteEnum>(value: E) -> PropertyValue {
    PropertyValue::select(value.remote_name())
}

fn enum_field<E: RemoteEnum>(page: &Page, name: &str) -> Option<E> {
    page.text(name).and_then(E::from_remote)
}

fn date_field(page: &Page, name: &str) -> Option<NaiveDate> {
    match page.get(name) {
        Some(PropertyValue::Date(Some(d))) => d.start_date(),
        _ => None,
    }
}

fn datetime_field(page: &Page, name: &str) -> Option<NaiveDateTime> {
    match page.get(name) {
        Some(PropertyValue::Date(Some(d))) => d.start_datetime(),
        _ => None,
    }
}

fn first_relation(page: &Page, name: &str) -> Option<String> {
    page.relation(name).first().cloned()
}

/// 目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// 远程页面 ID，创建后不可变
    pub id: Option<String>,
    pub title: String,
    pub status: GoalStatus,
    pub priority: Option<Priority>,
    pub target_date: Option<NaiveDate>,
}

impl Goal {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: GoalStatus::NotStarted,
            priority: None,
            target_date: None,
        }
    }

    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(goal::NAME.to_string(), PropertyValue::title(&self.title));
        props.insert(goal::STATUS.to_string(), select_of(self.status));
        if let Some(priority) = self.priority {
            props.insert(goal::PRIORITY.to_string(), select_of(priority));
        }
        if let Some(date) = self.target_date {
            props.insert(
                goal::TARGET_DATE.to_string(),
                PropertyValue::Date(Some(DateValue::date(date))),
            );
        }
        props
    }

    pub fn from_page(page: &Page) -> Self {
        Self {
            id: Some(page.id.clone()),
            title: page.text(goal::NAME).unwrap_or_default().to_string(),
            status: enum_field(page, goal::STATUS).unwrap_or(GoalStatus::NotStarted),
            priority: enum_field(page, goal::PRIORITY),
            target_date: date_field(page, goal::TARGET_DATE),
        }
    }
}

/// 待办
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Option<String>,
    pub title: String,
    pub status: TodoStatus,
    /// 所属目标（可选）
    pub goal_id: Option<String>,
}

impl Todo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: TodoStatus::Pending,
            goal_id: None,
        }
    }

    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(todo::NAME.to_string(), PropertyValue::title(&self.title));
        props.insert(todo::STATUS.to_string(), select_of(self.status));
        if let Some(goal_id) = &self.goal_id {
            props.insert(todo::GOAL.to_string(), PropertyValue::relation_one(goal_id));
        }
        props
    }

    pub fn from_page(page: &Page) -> Self {
        Self {
            id: Some(page.id.clone()),
            title: page.text(todo::NAME).unwrap_or_default().to_string(),
            status: enum_field(page, todo::STATUS).unwrap_or(TodoStatus::Pending),
            goal_id: first_relation(page, todo::GOAL),
        }
    }

    /// 只更新状态的属性集合
    pub fn status_properties(status: TodoStatus) -> Properties {
        let mut props = Properties::new();
        props.insert(todo::STATUS.to_string(), select_of(status));
        props
    }
}

/// 主记录：一次保存对应的时段汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainRecord {
    pub page_id: Option<String>,
    /// 基于创建时间戳（毫秒）的数字 ID
    pub record_id: String,
    pub title: String,
    /// 所有活动合并后的文本
    pub content: String,
    pub date: NaiveDate,
    pub record_type: RecordType,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

impl MainRecord {
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(main_record::NAME.to_string(), PropertyValue::title(&self.title));
        props.insert(
            main_record::RECORD_ID.to_string(),
            PropertyValue::rich_text(&self.record_id),
        );
        props.insert(
            main_record::CONTENT.to_string(),
            PropertyValue::rich_text(&self.content),
        );
        props.insert(
            main_record::DATE.to_string(),
            PropertyValue::Date(Some(DateValue::date(self.date))),
        );
        props.insert(main_record::RECORD_TYPE.to_string(), select_of(self.record_type));
        if let Some(start) = self.start_time {
            props.insert(
                main_record::START_TIME.to_string(),
                PropertyValue::Date(Some(DateValue::datetime(start))),
            );
        }
        if let Some(end) = self.end_time {
            props.insert(
                main_record::END_TIME.to_string(),
                PropertyValue::Date(Some(DateValue::datetime(end))),
            );
        }
        props
    }

    pub fn from_page(page: &Page) -> Option<Self> {
        Some(Self {
            page_id: Some(page.id.clone()),
            record_id: page.text(main_record::RECORD_ID).unwrap_or_default().to_string(),
            title: page.text(main_record::NAME).unwrap_or_default().to_string(),
            content: page.text(main_record::CONTENT).unwrap_or_default().to_string(),
            date: date_field(page, main_record::DATE)?,
            record_type: enum_field(page, main_record::RECORD_TYPE).unwrap_or(RecordType::DailyLog),
            start_time: datetime_field(page, main_record::START_TIME),
            end_time: datetime_field(page, main_record::END_TIME),
        })
    }
}

/// 活动明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetail {
    pub page_id: Option<String>,
    pub name: String,
    /// 分钟，始终大于 0
    pub duration_minutes: u32,
    /// 创建时确定，之后不再修改
    pub value_rating: ValueRating,
    pub tags: BTreeSet<String>,
    /// 所属主记录的页面 ID
    pub main_record_id: String,
    pub goal_id: Option<String>,
    pub todo_id: Option<String>,
}

impl ActivityDetail {
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(activity::NAME.to_string(), PropertyValue::title(&self.name));
        props.insert(
            activity::DURATION.to_string(),
            PropertyValue::Number(Some(f64::from(self.duration_minutes))),
        );
        props.insert(activity::VALUE.to_string(), select_of(self.value_rating));
        if !self.tags.is_empty() {
            props.insert(
                activity::TAGS.to_string(),
                PropertyValue::MultiSelect(self.tags.iter().cloned().collect()),
            );
        }
        props.insert(
            activity::MAIN_RECORD.to_string(),
            PropertyValue::relation_one(&self.main_record_id),
        );
        if let Some(goal_id) = &self.goal_id {
            props.insert(activity::GOAL.to_string(), PropertyValue::relation_one(goal_id));
        }
        if let Some(todo_id) = &self.todo_id {
            props.insert(activity::TODO.to_string(), PropertyValue::relation_one(todo_id));
        }
        props
    }

    pub fn from_page(page: &Page) -> Self {
        let tags = match page.get(activity::TAGS) {
            Some(PropertyValue::MultiSelect(names)) => names.iter().cloned().collect(),
            _ => BTreeSet::new(),
        };
        Self {
            page_id: Some(page.id.clone()),
            name: page.text(activity::NAME).unwrap_or_default().to_string(),
            duration_minutes: page
                .number(activity::DURATION)
                .map(|n| n.max(0.0).round() as u32)
                .unwrap_or(0),
            value_rating: ValueRating::from_remote_or_neutral(page.text(activity::VALUE)),
            tags,
            main_record_id: first_relation(page, activity::MAIN_RECORD).unwrap_or_default(),
            goal_id: first_relation(page, activity::GOAL),
            todo_id: first_relation(page, activity::TODO),
        }
    }
}

/// 每日状态（按日期唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatus {
    pub page_id: Option<String>,
    pub date: NaiveDate,
    /// 1-5
    pub mood: Option<u8>,
    /// 1-5
    pub energy: Option<u8>,
    pub sleep_hours: Option<f64>,
    pub exercised: bool,
    pub exercise_minutes: Option<u32>,
    pub diet: Option<String>,
    pub note: Option<String>,
}

impl DailyStatus {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            page_id: None,
            date,
            mood: None,
            energy: None,
            sleep_hours: None,
            exercised: false,
            exercise_minutes: None,
            diet: None,
            note: None,
        }
    }

    /// 标题字段存日期字符串，作为唯一键
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(daily_status::DATE.to_string(), PropertyValue::title(self.date_key()));
        props.insert(
            daily_status::MOOD.to_string(),
            PropertyValue::Number(self.mood.map(f64::from)),
        );
        props.insert(
            daily_status::ENERGY.to_string(),
            PropertyValue::Number(self.energy.map(f64::from)),
        );
        props.insert(
            daily_status::SLEEP_HOURS.to_string(),
            PropertyValue::Number(self.sleep_hours),
        );
        props.insert(
            daily_status::EXERCISED.to_string(),
            PropertyValue::Checkbox(self.exercised),
        );
        props.insert(
            daily_status::EXERCISE_MINUTES.to_string(),
            PropertyValue::Number(self.exercise_minutes.map(f64::from)),
        );
        props.insert(
            daily_status::DIET.to_string(),
            PropertyValue::rich_text(self.diet.clone().unwrap_or_default()),
        );
        props.insert(
            daily_status::NOTE.to_string(),
            PropertyValue::rich_text(self.note.clone().unwrap_or_default()),
        );
        props
    }

    pub fn from_page(page: &Page) -> Option<Self> {
        let date = NaiveDate::parse_from_str(page.text(daily_status::DATE)?, "%Y-%m-%d").ok()?;
        let non_empty = |name: &str| {
            page.text(name)
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
        };
        Some(Self {
            page_id: Some(page.id.clone()),
            date,
            mood: page.number(daily_status::MOOD).map(|n| n as u8),
            energy: page.number(daily_status::ENERGY).map(|n| n as u8),
            sleep_hours: page.number(daily_status::SLEEP_HOURS),
            exercised: matches!(
                page.get(daily_status::EXERCISED),
                Some(PropertyValue::Checkbox(true))
            ),
            exercise_minutes: page.number(daily_status::EXERCISE_MINUTES).map(|n| n as u32),
            diet: non_empty(daily_status::DIET),
            note: non_empty(daily_status::NOTE),
        })
    }
}

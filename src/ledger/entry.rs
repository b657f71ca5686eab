// 用户输入 - 一次保存会话中的活动条目
//
// 所有校验都在发起任何远程调用之前完成。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::entities::{RecordType, RemoteEnum, TodoStatus, ValueRating};
use super::slots::{format_minutes, SlotRange};
use crate::error::{LedgerError, Result};

/// 单条活动允许的最短时长（分钟）
pub const MIN_ACTIVITY_MINUTES: u32 = 5;

/// 一条待保存的活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub name: String,
    pub minutes: u32,
    pub value_rating: Option<ValueRating>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub goal_id: Option<String>,
    pub todo_id: Option<String>,
    /// 保存后将关联待办更新为该状态
    pub todo_status: Option<TodoStatus>,
    /// 活动所在的时间段；时长不能超过该时间段
    pub slot_range: Option<SlotRange>,
}

impl ActivityEntry {
    pub fn new(name: impl Into<String>, minutes: u32) -> Self {
        Self {
            name: name.into(),
            minutes,
            value_rating: None,
            tags: BTreeSet::new(),
            goal_id: None,
            todo_id: None,
            todo_status: None,
            slot_range: None,
        }
    }

    pub fn with_rating(mut self, rating: ValueRating) -> Self {
        self.value_rating = Some(rating);
        self
    }

    pub fn with_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    /// 记录时间段；时钟时段同时用它的长度作为时长
    pub fn with_slots(mut self, range: SlotRange) -> Self {
        if let Some(minutes) = range.duration_minutes() {
            self.minutes = minutes;
        }
        self.slot_range = Some(range);
        self
    }

    pub fn with_todo(mut self, todo_id: impl Into<String>, status: Option<TodoStatus>) -> Self {
        self.todo_id = Some(todo_id.into());
        self.todo_status = status;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("name", "活动名称不能为空"));
        }
        if self.minutes < MIN_ACTIVITY_MINUTES {
            return Err(LedgerError::validation(
                "minutes",
                format!(
                    "活动「{}」时长 {} 分钟，至少需要 {} 分钟",
                    self.name, self.minutes, MIN_ACTIVITY_MINUTES
                ),
            ));
        }
        if let Some(range_minutes) = self.slot_range.and_then(|r| r.duration_minutes()) {
            if self.minutes > range_minutes {
                return Err(LedgerError::validation(
                    "minutes",
                    format!(
                        "活动「{}」时长 {} 分钟，超过所选时间段 {}",
                        self.name,
                        self.minutes,
                        format_minutes(range_minutes)
                    ),
                ));
            }
        }
        if self.todo_status.is_some() && self.todo_id.is_none() {
            return Err(LedgerError::validation(
                "todo_status",
                format!("活动「{}」设置了待办状态但没有关联待办", self.name),
            ));
        }
        Ok(())
    }

    /// 实际写入的价值分类，未选择时按中性
    pub fn effective_rating(&self) -> ValueRating {
        self.value_rating.unwrap_or(ValueRating::Neutral)
    }

    /// 合并到主记录内容中的一行
    pub fn content_line(&self) -> String {
        format!(
            "{} {} [{}]",
            self.name.trim(),
            format_minutes(self.minutes),
            self.effective_rating().remote_name()
        )
    }
}

/// 一次保存会话的草稿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub title: Option<String>,
    pub date: NaiveDate,
    pub record_type: RecordType,
    pub time_range: Option<SlotRange>,
    pub entries: Vec<ActivityEntry>,
}

impl SessionDraft {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            title: None,
            date,
            record_type: RecordType::DailyLog,
            time_range: None,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ActivityEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// 校验所有条目；空会话同样视为无效
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(LedgerError::validation("entries", "至少需要一条活动"));
        }
        self.entries.iter().try_for_each(ActivityEntry::validate)
    }

    /// 主记录内容：每条活动一行
    pub fn merged_content(&self) -> String {
        self.entries
            .iter()
            .map(ActivityEntry::content_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 主记录标题，默认 "YYYY-MM-DD 记录类型"
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.trim().to_string(),
            _ => format!(
                "{} {}",
                self.date.format("%Y-%m-%d"),
                self.record_type.remote_name()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::slots::TimeSlot;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
    }

    #[test]
    fn test_minimum_duration_boundary() {
        assert!(ActivityEntry::new("读书", 5).validate().is_ok());
        let err = ActivityEntry::new("读书", 4).validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "minutes"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = ActivityEntry::new("   ", 30).validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_todo_status_requires_todo() {
        let mut entry = ActivityEntry::new("跑步", 30);
        entry.todo_status = Some(TodoStatus::Completed);
        assert!(entry.validate().is_err());
        let entry = ActivityEntry::new("跑步", 30).with_todo("t1", Some(TodoStatus::Completed));
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_slot_range_sets_and_bounds_minutes() {
        let slot = |label: &str| TimeSlot::parse(label).unwrap();
        let range = SlotRange::new(slot("09:00"), slot("10:30")).unwrap();
        let entry = ActivityEntry::new("开会", 0).with_slots(range);
        assert_eq!(entry.minutes, 90);
        assert!(entry.validate().is_ok());

        let mut entry = entry;
        entry.minutes = 120;
        let err = entry.validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "minutes"));

        // 睡眠时段没有长度，保留手填时长
        let asleep = ActivityEntry::new("午睡", 40).with_slots(SlotRange::asleep(slot("13:00")));
        assert_eq!(asleep.minutes, 40);
        assert!(asleep.validate().is_ok());
    }

    #[test]
    fn test_merged_content() {
        let mut draft = SessionDraft::new(date());
        draft
            .push(ActivityEntry::new("写代码", 90).with_rating(ValueRating::Valuable))
            .push(ActivityEntry::new("刷视频", 20).with_rating(ValueRating::Wasteful))
            .push(ActivityEntry::new("吃饭", 30));
        assert_eq!(
            draft.merged_content(),
            "写代码 1小时30分钟 [高价值]\n刷视频 20分钟 [低价值]\n吃饭 30分钟 [中价值]"
        );
        assert_eq!(draft.display_title(), "2024-03-08 日常记录");
    }

    #[test]
    fn test_empty_session_rejected() {
        assert!(SessionDraft::new(date()).validate().is_err());
    }
}

// 账本服务 - 会话保存、目标/待办管理、每日状态
//
// 保存流程：
// 1. 本地校验全部条目（失败则不发起任何写入）
// 2. 创建主记录（失败则中止，不写任何明细）
// 3. 逐条创建活动明细（单条失败记录后继续）
// 4. 回写待办状态
// 5. 返回保存报告

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::entities::{
    ActivityDetail, DailyStatus, Goal, GoalStatus, MainRecord, RemoteEnum, Todo, TodoStatus,
};
use super::entry::{ActivityEntry, SessionDraft};
use super::linker::{LinkReport, RelationLinker};
use super::record_id::RecordIdGenerator;
use super::stats::{aggregate, ActivityStats};
use crate::error::{LedgerError, Result};
use crate::event_bus::{AppEvent, EventBus};
use crate::models::DatabaseIds;
use crate::notion::{Page, Properties, PropertyValue, QueryFilter, RemoteStore};
use crate::schema::target::{activity, daily_status, goal, main_record, EntityKind};

/// 单条明细写入失败
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub name: String,
    pub error: String,
}

/// 会话保存结果
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub main_record_page_id: String,
    pub record_id: String,
    /// (活动名称, 页面 ID)
    pub created: Vec<(String, String)>,
    pub failed: Vec<ItemFailure>,
    pub link_report: LinkReport,
    /// 只统计写入成功的明细
    pub stats: ActivityStats,
}

impl SaveReport {
    /// 主记录已保存但有明细或待办更新失败
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || !self.link_report.is_clean()
    }
}

pub struct LedgerService {
    store: Arc<dyn RemoteStore>,
    databases: DatabaseIds,
    record_ids: RecordIdGenerator,
    events: Option<Arc<EventBus>>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn RemoteStore>, databases: DatabaseIds) -> Self {
        Self {
            store,
            databases,
            record_ids: RecordIdGenerator::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: AppEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn database(&self, kind: EntityKind) -> Result<&str> {
        let id = self.databases.get(kind);
        if id.trim().is_empty() {
            return Err(LedgerError::Config(format!("未配置 {} 数据库 ID", kind)));
        }
        Ok(id)
    }

    /// 保存一次会话
    pub async fn save_session(&self, draft: &SessionDraft) -> Result<SaveReport> {
        draft.validate()?;
        let main_db = self.database(EntityKind::MainRecord)?;
        let activity_db = self.database(EntityKind::ActivityDetail)?;

        let record_id = self.record_ids.next_id();
        let (start_time, end_time) = draft
            .time_range
            .map(|r| r.to_datetimes(draft.date))
            .unwrap_or((None, None));
        let record = MainRecord {
            page_id: None,
            record_id: record_id.clone(),
            title: draft.display_title(),
            content: draft.merged_content(),
            date: draft.date,
            record_type: draft.record_type,
            start_time,
            end_time,
        };

        let main_page = self
            .store
            .create_page(main_db, &record.to_properties())
            .await
            .map_err(|e| {
                error!("主记录 {} 保存失败: {}", record_id, e);
                LedgerError::remote("create main record", e)
            })?;
        info!("主记录已创建: record_id={}, page={}", record_id, main_page.id);

        let mut created = Vec::new();
        let mut failed = Vec::new();
        let mut saved_entries: Vec<&ActivityEntry> = Vec::new();

        for entry in &draft.entries {
            let detail = ActivityDetail {
                page_id: None,
                name: entry.name.trim().to_string(),
                duration_minutes: entry.minutes,
                value_rating: entry.effective_rating(),
                tags: entry.tags.clone(),
                main_record_id: main_page.id.clone(),
                goal_id: entry.goal_id.clone(),
                todo_id: entry.todo_id.clone(),
            };
            match self
                .store
                .create_page(activity_db, &detail.to_properties())
                .await
            {
                Ok(page) => {
                    created.push((detail.name.clone(), page.id));
                    saved_entries.push(entry);
                }
                Err(e) => {
                    warn!(
                        "活动明细「{}」保存失败 (record_id={}): {}",
                        detail.name, record_id, e
                    );
                    self.publish(AppEvent::ActivityWriteFailed {
                        name: detail.name.clone(),
                        error: e.to_string(),
                    });
                    failed.push(ItemFailure {
                        name: detail.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        // 统计和待办回写都只针对成功保存的活动
        let stats = aggregate(saved_entries.iter().copied());
        let linker = RelationLinker::new(self.store.clone(), self.events.clone());
        let updates = RelationLinker::collect(saved_entries);
        let link_report = linker.apply(&updates).await;

        info!(
            "会话保存完成: record_id={}, 明细 {} 条成功 / {} 条失败, 共 {} 分钟",
            record_id,
            created.len(),
            failed.len(),
            stats.total_minutes
        );
        self.publish(AppEvent::SessionSaved {
            record_id: record_id.clone(),
            created: created.len(),
            failed: failed.len(),
        });

        Ok(SaveReport {
            main_record_page_id: main_page.id,
            record_id,
            created,
            failed,
            link_report,
            stats,
        })
    }

    /// 读取主记录下的全部活动明细
    pub async fn load_activities(&self, main_record_page_id: &str) -> Result<Vec<ActivityDetail>> {
        let filter = QueryFilter::RelationContains {
            property: activity::MAIN_RECORD.to_string(),
            page_id: main_record_page_id.to_string(),
        };
        let pages = self
            .query(EntityKind::ActivityDetail, Some(&filter))
            .await?;
        Ok(pages.iter().map(ActivityDetail::from_page).collect())
    }

    /// 某一天的主记录
    pub async fn list_main_records(&self, date: NaiveDate) -> Result<Vec<MainRecord>> {
        let filter = QueryFilter::DateEquals {
            property: main_record::DATE.to_string(),
            date,
        };
        let pages = self.query(EntityKind::MainRecord, Some(&filter)).await?;
        Ok(pages.iter().filter_map(MainRecord::from_page).collect())
    }

    /// 某一天全部活动的统计
    pub async fn daily_stats(&self, date: NaiveDate) -> Result<ActivityStats> {
        let mut details = Vec::new();
        for record in self.list_main_records(date).await? {
            if let Some(page_id) = &record.page_id {
                details.extend(self.load_activities(page_id).await?);
            }
        }
        Ok(aggregate(&details))
    }

    async fn query(&self, kind: EntityKind, filter: Option<&QueryFilter>) -> Result<Vec<Page>> {
        let db = self.database(kind)?;
        self.store
            .query_database(db, filter)
            .await
            .map_err(|e| LedgerError::remote(format!("query {}", kind), e))
    }

    async fn create(&self, kind: EntityKind, properties: &Properties) -> Result<Page> {
        let db = self.database(kind)?;
        self.store
            .create_page(db, properties)
            .await
            .map_err(|e| LedgerError::remote(format!("create {}", kind), e))
    }

    async fn update(&self, page_id: &str, properties: &Properties) -> Result<Page> {
        self.store
            .update_page(page_id, properties)
            .await
            .map_err(|e| LedgerError::remote(format!("update page {}", page_id), e))
    }

    // --- 目标 ---

    pub async fn create_goal(&self, item: &Goal) -> Result<Goal> {
        if item.title.trim().is_empty() {
            return Err(LedgerError::validation("title", "目标名称不能为空"));
        }
        let page = self.create(EntityKind::Goal, &item.to_properties()).await?;
        info!("目标已创建: {} ({})", item.title, page.id);
        Ok(Goal::from_page(&page))
    }

    pub async fn update_goal_status(&self, goal_id: &str, status: GoalStatus) -> Result<()> {
        let mut props = Properties::new();
        props.insert(
            goal::STATUS.to_string(),
            PropertyValue::select(status.remote_name()),
        );
        self.update(goal_id, &props).await?;
        Ok(())
    }

    pub async fn list_goals(&self) -> Result<Vec<Goal>> {
        let pages = self.query(EntityKind::Goal, None).await?;
        Ok(pages.iter().map(Goal::from_page).collect())
    }

    // --- 待办 ---

    pub async fn create_todo(&self, item: &Todo) -> Result<Todo> {
        if item.title.trim().is_empty() {
            return Err(LedgerError::validation("title", "待办名称不能为空"));
        }
        let page = self.create(EntityKind::Todo, &item.to_properties()).await?;
        info!("待办已创建: {} ({})", item.title, page.id);
        Ok(Todo::from_page(&page))
    }

    pub async fn update_todo_status(&self, todo_id: &str, status: TodoStatus) -> Result<()> {
        self.update(todo_id, &Todo::status_properties(status)).await?;
        self.publish(AppEvent::TodoStatusUpdated {
            todo_id: todo_id.to_string(),
            status: status.to_string(),
        });
        Ok(())
    }

    pub async fn list_todos(&self) -> Result<Vec<Todo>> {
        let pages = self.query(EntityKind::Todo, None).await?;
        Ok(pages.iter().map(Todo::from_page).collect())
    }

    // --- 每日状态 ---

    /// 按日期更新或创建，同一日期只保留一条
    pub async fn upsert_daily_status(&self, status: &DailyStatus) -> Result<DailyStatus> {
        for (name, value) in [("mood", status.mood), ("energy", status.energy)] {
            if let Some(v) = value {
                if !(1..=5).contains(&v) {
                    return Err(LedgerError::validation(name, format!("取值 {} 不在 1-5 之间", v)));
                }
            }
        }

        let filter = QueryFilter::TitleEquals {
            property: daily_status::DATE.to_string(),
            value: status.date_key(),
        };
        let existing = self.query(EntityKind::DailyStatus, Some(&filter)).await?;
        let props = status.to_properties();

        let page = match existing.first() {
            Some(page) => {
                info!("更新 {} 的每日状态 ({})", status.date_key(), page.id);
                self.update(&page.id, &props).await?
            }
            None => {
                info!("创建 {} 的每日状态", status.date_key());
                self.create(EntityKind::DailyStatus, &props).await?
            }
        };

        DailyStatus::from_page(&page).ok_or_else(|| {
            LedgerError::validation(daily_status::DATE, "每日状态页面缺少有效日期")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::ledger::entities::ValueRating;
    use crate::ledger::slots::{SlotRange, TimeSlot};
    use crate::notion::InMemoryStore;
    use crate::schema::target::{target_schema, todo};

    fn ids() -> DatabaseIds {
        DatabaseIds {
            main_record: "main-db".to_string(),
            activity_detail: "activity-db".to_string(),
            goal: "goal-db".to_string(),
            todo: "todo-db".to_string(),
            daily_status: "status-db".to_string(),
        }
    }

    async fn setup() -> (Arc<InMemoryStore>, LedgerService) {
        let store = Arc::new(InMemoryStore::new());
        let ids = ids();
        for kind in EntityKind::CREATION_ORDER {
            store.insert_database(target_schema(kind, &ids)).await;
        }
        let service = LedgerService::new(store.clone(), ids);
        (store, service)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
    }

    fn draft(entries: Vec<ActivityEntry>) -> SessionDraft {
        let mut draft = SessionDraft::new(date());
        draft.entries = entries;
        draft
    }

    #[tokio::test]
    async fn test_save_session_writes_record_and_details() {
        let (store, service) = setup().await;
        let todo_page = service.create_todo(&Todo::new("写报告")).await.unwrap();
        let todo_id = todo_page.id.unwrap();

        let mut session = draft(vec![
            ActivityEntry::new("写报告", 45)
                .with_rating(ValueRating::Valuable)
                .with_todo(todo_id.clone(), Some(TodoStatus::Completed)),
            ActivityEntry::new("刷手机", 20).with_rating(ValueRating::Wasteful),
        ]);
        session.time_range = Some(
            SlotRange::new(
                TimeSlot::parse("09:00").unwrap(),
                TimeSlot::parse("10:30").unwrap(),
            )
            .unwrap(),
        );

        let report = service.save_session(&session).await.unwrap();
        assert!(!report.is_partial());
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.stats.total_minutes, 65);
        assert_eq!(report.stats.valuable_minutes, 45);
        assert_eq!(report.link_report.updated, vec![todo_id.clone()]);

        let details = service
            .load_activities(&report.main_record_page_id)
            .await
            .unwrap();
        assert_eq!(details.len(), 2);
        assert!(details.iter().all(|d| d.main_record_id == report.main_record_page_id));

        let main = store.page(&report.main_record_page_id).await.unwrap();
        assert_eq!(main.text(main_record::RECORD_ID), Some(report.record_id.as_str()));
        let todo_after = store.page(&todo_id).await.unwrap();
        assert_eq!(todo_after.text(todo::STATUS), Some("已完成"));
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_calls() {
        let (store, service) = setup().await;
        let session = draft(vec![
            ActivityEntry::new("读书", 30),
            ActivityEntry::new("喝水", 4),
        ]);
        let err = service.save_session(&session).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_main_record_failure_writes_no_children() {
        let (store, service) = setup().await;
        let session = draft(vec![ActivityEntry::new("读书", 30)]);
        store.fail_create("main-db", &session.display_title()).await;

        let err = service.save_session(&session).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            LedgerError::Remote {
                source: RemoteError::Http { status: 409, .. },
                ..
            }
        ));
        assert_eq!(store.call_count("create_page").await, 1);
        assert!(store.pages_in("activity-db").await.is_empty());
    }

    #[tokio::test]
    async fn test_child_failure_is_partial_save() {
        let (store, service) = setup().await;
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let service = service.with_events(events);

        store.fail_create("activity-db", "开会").await;
        let session = draft(vec![
            ActivityEntry::new("写代码", 60),
            ActivityEntry::new("开会", 30),
            ActivityEntry::new("复盘", 15),
        ]);
        let report = service.save_session(&session).await.unwrap();

        assert!(report.is_partial());
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "开会");
        assert_eq!(store.pages_in("activity-db").await.len(), 2);
        assert_eq!(report.stats.count, 2);
        assert_eq!(report.stats.total_minutes, 75);

        let mut saw_failure = false;
        let mut saw_saved = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::ActivityWriteFailed { name, .. } => saw_failure = name == "开会",
                AppEvent::SessionSaved { created, failed, .. } => {
                    saw_saved = created == 2 && failed == 1
                }
                _ => {}
            }
        }
        assert!(saw_failure && saw_saved);
    }

    #[tokio::test]
    async fn test_failed_todo_update_does_not_fail_save() {
        let (store, service) = setup().await;
        let todo_id = service
            .create_todo(&Todo::new("跑步"))
            .await
            .unwrap()
            .id
            .unwrap();
        store.fail_page_update(&todo_id).await;

        let session = draft(vec![
            ActivityEntry::new("跑步", 30).with_todo(todo_id.clone(), Some(TodoStatus::Completed))
        ]);
        let report = service.save_session(&session).await.unwrap();
        assert!(report.is_partial());
        assert!(report.failed.is_empty());
        assert_eq!(report.link_report.failed[0].todo_id, todo_id);
    }

    #[tokio::test]
    async fn test_missing_database_id_is_config_error() {
        let store = Arc::new(InMemoryStore::new());
        let service = LedgerService::new(store, DatabaseIds::default());
        let err = service
            .save_session(&draft(vec![ActivityEntry::new("读书", 30)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[tokio::test]
    async fn test_upsert_daily_status_keeps_one_per_date() {
        let (store, service) = setup().await;
        let mut status = DailyStatus::new(date());
        status.mood = Some(3);
        service.upsert_daily_status(&status).await.unwrap();

        status.mood = Some(5);
        status.note = Some("状态不错".to_string());
        let saved = service.upsert_daily_status(&status).await.unwrap();

        assert_eq!(saved.mood, Some(5));
        assert_eq!(store.pages_in("status-db").await.len(), 1);
        assert_eq!(store.call_count("update_page").await, 1);

        status.energy = Some(9);
        assert!(service.upsert_daily_status(&status).await.is_err());
    }

    #[tokio::test]
    async fn test_goal_lifecycle() {
        let (_store, service) = setup().await;
        let mut item = Goal::new("学会 Rust");
        item.target_date = NaiveDate::from_ymd_opt(2024, 12, 31);
        let created = service.create_goal(&item).await.unwrap();
        let id = created.id.clone().unwrap();

        service
            .update_goal_status(&id, GoalStatus::InProgress)
            .await
            .unwrap();
        let goals = service.list_goals().await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].status, GoalStatus::InProgress);
        assert_eq!(goals[0].target_date, item.target_date);
    }

    #[tokio::test]
    async fn test_daily_stats() {
        let (_store, service) = setup().await;
        service
            .save_session(&draft(vec![
                ActivityEntry::new("写代码", 45).with_rating(ValueRating::Valuable),
                ActivityEntry::new("午休", 30),
            ]))
            .await
            .unwrap();
        let stats = service.daily_stats(date()).await.unwrap();
        assert_eq!(stats.total_minutes, 75);
        assert_eq!(stats.neutral_minutes, 30);
    }
}

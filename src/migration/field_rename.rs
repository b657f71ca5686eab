// 字段改名数据迁移
//
// 把旧字段的值原样复制到新字段名下。旧字段永远不会被清空或删除，
// 因此中途失败或取消后重新执行是安全的。

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::rate_limiter::RateLimiter;
use crate::error::{LedgerError, Result};
use crate::event_bus::{AppEvent, EventBus};
use crate::notion::{Page, Properties, PropertyValue, RemoteStore};
use crate::schema::target::{activity, goal, main_record, todo};
use crate::schema::{EntityKind, FieldType, Schema};

/// (旧字段名, 新字段名)
pub type RenamePair = (String, String);

/// 每类实体的字段改名表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameTable {
    pairs: BTreeMap<EntityKind, Vec<RenamePair>>,
}

impl RenameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 旧版数据库使用的字段名
    pub fn default_table() -> Self {
        let mut table = Self::new();
        table
            .add(EntityKind::MainRecord, "标题", main_record::NAME)
            .add(EntityKind::MainRecord, "类型", main_record::RECORD_TYPE)
            .add(EntityKind::MainRecord, "描述", main_record::CONTENT)
            .add(EntityKind::ActivityDetail, "标题", activity::NAME)
            .add(EntityKind::ActivityDetail, "时长(分钟)", activity::DURATION)
            .add(EntityKind::ActivityDetail, "价值分类", activity::VALUE)
            .add(EntityKind::ActivityDetail, "关联目标", activity::GOAL)
            .add(EntityKind::ActivityDetail, "关联待办", activity::TODO)
            .add(EntityKind::Goal, "标题", goal::NAME)
            .add(EntityKind::Todo, "标题", todo::NAME)
            .add(EntityKind::Todo, "关联目标", todo::GOAL);
        table
    }

    pub fn add(&mut self, kind: EntityKind, legacy: &str, current: &str) -> &mut Self {
        self.pairs
            .entry(kind)
            .or_default()
            .push((legacy.to_string(), current.to_string()));
        self
    }

    pub fn for_kind(&self, kind: EntityKind) -> &[RenamePair] {
        self.pairs.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 单条记录迁移失败
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub page_id: String,
    pub fields: Vec<String>,
    pub error: String,
}

/// 迁移统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMigrationStats {
    pub total: usize,
    pub updated: usize,
    /// 没有需要复制的值
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
    pub cancelled: bool,
    /// 本次迁移中节流暂停的次数
    pub pauses: usize,
}

impl FieldMigrationStats {
    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.failed
    }
}

/// 标题和富文本之间按文本转换，其余类型原样复制
fn coerce(value: &PropertyValue, target: Option<&FieldType>) -> PropertyValue {
    match (value, target) {
        (PropertyValue::Title(text), Some(FieldType::RichText)) => PropertyValue::rich_text(text),
        (PropertyValue::RichText(text), Some(FieldType::Title)) => PropertyValue::title(text),
        _ => value.clone(),
    }
}

/// 为一条记录构建需要写入的属性；已经一致的字段不再写入
fn build_update(page: &Page, renames: &[RenamePair], schema: &Schema) -> Properties {
    let mut update = Properties::new();
    for (legacy, current) in renames {
        let Some(value) = page.get(legacy) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let value = coerce(value, schema.get(current));
        if page.get(current) == Some(&value) {
            continue;
        }
        update.insert(current.clone(), value);
    }
    update
}

pub struct FieldRenameMigrator {
    store: Arc<dyn RemoteStore>,
    limiter: Arc<RateLimiter>,
    events: Option<Arc<EventBus>>,
}

impl FieldRenameMigrator {
    pub fn new(store: Arc<dyn RemoteStore>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            store,
            limiter,
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

    /// 迁移一个数据库中的全部记录
    ///
    /// 读取结构或记录失败时返回错误；单条记录失败只计数，循环继续。
    /// 每处理一条记录前检查一次取消。每 batch_size 条记录暂停一次，
    /// 结构和记录的读取走共享限流器。
    pub async fn migrate(
        &self,
        database_id: &str,
        renames: &[RenamePair],
        cancel: &CancellationToken,
    ) -> Result<FieldMigrationStats> {
        self.limiter.tick().await;
        let schema = self
            .store
            .retrieve_database(database_id)
            .await
            .map_err(|e| LedgerError::remote(format!("retrieve_database {}", database_id), e))?;

        // 新字段不存在时每条记录都会失败，提前排除
        let renames: Vec<RenamePair> = renames
            .iter()
            .filter(|(legacy, current)| {
                let exists = schema.contains(current);
                if !exists {
                    warn!(
                        "数据库 {} 没有字段 {}，跳过 {} → {}（请先执行结构迁移）",
                        database_id, current, legacy, current
                    );
                }
                exists
            })
            .cloned()
            .collect();

        self.limiter.tick().await;
        let records = self
            .store
            .query_database(database_id, None)
            .await
            .map_err(|e| LedgerError::remote(format!("query_database {}", database_id), e))?;

        let mut stats = FieldMigrationStats {
            total: records.len(),
            ..Default::default()
        };
        info!(
            "开始迁移数据库 {}：{} 条记录，{} 组字段",
            database_id,
            stats.total,
            renames.len()
        );

        // 按记录节流，跳过的记录也计入批次
        let pacer = self.limiter.fresh();
        for page in &records {
            pacer.tick().await;
            if cancel.is_cancelled() {
                warn!(
                    "数据库 {} 迁移已取消，已处理 {}/{}",
                    database_id,
                    stats.processed(),
                    stats.total
                );
                stats.cancelled = true;
                break;
            }

            let update = build_update(page, &renames, &schema);
            if update.is_empty() {
                stats.skipped += 1;
            } else {
                match self.store.update_page(&page.id, &update).await {
                    Ok(_) => stats.updated += 1,
                    Err(e) => {
                        let fields: Vec<String> = update.keys().cloned().collect();
                        error!(
                            "记录 {} 迁移失败，字段 [{}]: {}",
                            page.id,
                            fields.join(", "),
                            e
                        );
                        self.publish(AppEvent::RecordMigrationFailed {
                            database_id: database_id.to_string(),
                            page_id: page.id.clone(),
                            error: e.to_string(),
                        });
                        stats.failed += 1;
                        stats.failures.push(RecordFailure {
                            page_id: page.id.clone(),
                            fields,
                            error: e.to_string(),
                        });
                    }
                }
            }

            self.publish(AppEvent::MigrationProgress {
                database_id: database_id.to_string(),
                processed: stats.processed(),
                total: stats.total,
                updated: stats.updated,
                failed: stats.failed,
            });
        }

        stats.pauses = pacer.pauses();
        info!(
            "数据库 {} 迁移结束: 更新 {}，跳过 {}，失败 {}，共 {}",
            database_id, stats.updated, stats.skipped, stats.failed, stats.total
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::InMemoryStore;
    use tokio::time::Duration;

    const DB: &str = "activity-db";

    fn schema() -> Schema {
        Schema::new(DB)
            .with_field("标题", FieldType::Title)
            .with_field(activity::NAME, FieldType::RichText)
            .with_field("时长(分钟)", FieldType::number())
            .with_field(activity::DURATION, FieldType::number())
            .with_field("价值分类", FieldType::select(&["高价值"]))
            .with_field(activity::VALUE, FieldType::select(&["高价值"]))
    }

    fn legacy_page(id: &str, title: &str, minutes: Option<f64>) -> Page {
        let mut properties = Properties::new();
        properties.insert("标题".to_string(), PropertyValue::title(title));
        properties.insert("时长(分钟)".to_string(), PropertyValue::Number(minutes));
        properties.insert("价值分类".to_string(), PropertyValue::Select(None));
        Page {
            id: id.to_string(),
            properties,
        }
    }

    async fn setup(pages: Vec<Page>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_database(schema()).await;
        for page in pages {
            store.insert_page(DB, page).await;
        }
        store
    }

    fn migrator(store: Arc<InMemoryStore>) -> FieldRenameMigrator {
        FieldRenameMigrator::new(store, Arc::new(RateLimiter::new(5, Duration::from_millis(350))))
    }

    fn renames() -> Vec<RenamePair> {
        RenameTable::default_table()
            .for_kind(EntityKind::ActivityDetail)
            .to_vec()
    }

    #[test]
    fn test_default_table() {
        let table = RenameTable::default_table();
        assert!(table
            .for_kind(EntityKind::ActivityDetail)
            .contains(&("时长(分钟)".to_string(), "时长".to_string())));
        assert!(table
            .for_kind(EntityKind::MainRecord)
            .contains(&("描述".to_string(), "内容".to_string())));
        assert!(table.for_kind(EntityKind::DailyStatus).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_copies_values_and_keeps_legacy_fields() {
        let store = setup(vec![
            legacy_page("p1", "读书", Some(30.0)),
            legacy_page("p2", "", None),
        ])
        .await;

        let stats = migrator(store.clone())
            .migrate(DB, &renames(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);

        let page = store.page("p1").await.unwrap();
        assert_eq!(page.get(activity::NAME), Some(&PropertyValue::rich_text("读书")));
        assert_eq!(page.number(activity::DURATION), Some(30.0));
        // 旧字段保持不变
        assert_eq!(page.text("标题"), Some("读书"));
        assert_eq!(page.number("时长(分钟)"), Some(30.0));
        // 空的旧值不会写入
        assert!(page.get(activity::VALUE).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_is_noop() {
        let store = setup(vec![legacy_page("p1", "读书", Some(30.0))]).await;
        let migrator = migrator(store.clone());
        let cancel = CancellationToken::new();

        migrator.migrate(DB, &renames(), &cancel).await.unwrap();
        let stats = migrator.migrate(DB, &renames(), &cancel).await.unwrap();
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.call_count("update_page").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_failure_does_not_stop_loop() {
        let store = setup(vec![
            legacy_page("p1", "a", Some(10.0)),
            legacy_page("p2", "b", Some(20.0)),
            legacy_page("p3", "c", Some(30.0)),
        ])
        .await;
        store.fail_page_update("p2").await;

        let stats = migrator(store.clone())
            .migrate(DB, &renames(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.updated, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures[0].page_id, "p2");
        assert!(stats.failures[0].fields.contains(&activity::DURATION.to_string()));
        assert_eq!(store.page("p3").await.unwrap().number(activity::DURATION), Some(30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_current_field_is_skipped() {
        let store = setup(vec![legacy_page("p1", "读书", Some(30.0))]).await;
        let renames = vec![("标题".to_string(), "不存在".to_string())];
        let stats = migrator(store.clone())
            .migrate(DB, &renames, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.call_count("update_page").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start() {
        let store = setup(vec![legacy_page("p1", "读书", Some(30.0))]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = migrator(store.clone())
            .migrate(DB, &renames(), &cancel)
            .await
            .unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.processed(), 0);
        assert_eq!(store.call_count("update_page").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_midway() {
        let pages = (0..6)
            .map(|i| legacy_page(&format!("p{}", i), "记录", Some(10.0)))
            .collect();
        let store = setup(pages).await;
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        // 每次调用后暂停，让取消任务有机会执行
        let migrator = FieldRenameMigrator::new(
            store.clone(),
            Arc::new(RateLimiter::new(1, Duration::from_millis(10))),
        )
        .with_events(events);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let AppEvent::MigrationProgress { processed, .. } = event {
                    if processed >= 1 {
                        trigger.cancel();
                        break;
                    }
                }
            }
        });

        let stats = migrator.migrate(DB, &renames(), &cancel).await.unwrap();
        assert!(stats.cancelled);
        assert!(stats.updated < stats.total);
        assert!(stats.pauses > 0);
    }

    async fn pauses_for(records: usize, skip_every: Option<usize>) -> FieldMigrationStats {
        let pages = (0..records)
            .map(|i| {
                let skip = skip_every.map_or(false, |n| i % n == 0);
                if skip {
                    legacy_page(&format!("p{}", i), "", None)
                } else {
                    legacy_page(&format!("p{}", i), "记录", Some(15.0))
                }
            })
            .collect();
        let store = setup(pages).await;
        migrator(store)
            .migrate(DB, &renames(), &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_follow_records() {
        let stats = pauses_for(10, None).await;
        assert_eq!(stats.updated, 10);
        assert_eq!(stats.pauses, 1);

        let stats = pauses_for(25, None).await;
        assert_eq!(stats.pauses, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_records_count_toward_batches() {
        let started = tokio::time::Instant::now();
        let stats = pauses_for(23, Some(3)).await;
        assert_eq!(stats.skipped, 8);
        assert_eq!(stats.updated, 15);
        assert_eq!(stats.pauses, 4);
        assert!(started.elapsed() >= Duration::from_millis(4 * 350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_current_values_are_kept() {
        let mut properties = Properties::new();
        properties.insert("标题".to_string(), PropertyValue::title(""));
        properties.insert(activity::NAME.to_string(), PropertyValue::rich_text("已有名称"));
        properties.insert(activity::DURATION.to_string(), PropertyValue::Number(Some(45.0)));
        properties.insert("价值分类".to_string(), PropertyValue::Select(None));
        properties.insert(
            activity::VALUE.to_string(),
            PropertyValue::Select(Some("高价值".to_string())),
        );
        let store = setup(vec![Page {
            id: "p1".to_string(),
            properties,
        }])
        .await;

        let stats = migrator(store.clone())
            .migrate(DB, &renames(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(store.call_count("update_page").await, 0);
        let page = store.page("p1").await.unwrap();
        assert_eq!(page.text(activity::NAME), Some("已有名称"));
        assert_eq!(page.number(activity::DURATION), Some(45.0));
        assert_eq!(
            page.get(activity::VALUE),
            Some(&PropertyValue::Select(Some("高价值".to_string())))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_is_error() {
        let store = Arc::new(InMemoryStore::new());
        let err = migrator(store)
            .migrate("missing", &renames(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Remote { .. }));
    }
}

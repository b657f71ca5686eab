// 追加迁移 - 只向目标数据库添加缺失字段，从不删除或修改已有字段
//
// 不做预检查：再次提交已存在的字段由远程端视为无变化。

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::rate_limiter::RateLimiter;
use super::report::{MigrationOutcome, MigrationSummary};
use crate::error::{LedgerError, Result};
use crate::event_bus::{AppEvent, EventBus};
use crate::notion::RemoteStore;
use crate::schema::{FieldType, SchemaDiffReport};

/// 一个数据库要追加的字段
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaPlan {
    pub database_id: String,
    pub fields: BTreeMap<String, FieldType>,
}

impl SchemaPlan {
    /// 取差异报告中目标缺少的字段
    ///
    /// 标题字段不能追加（每个数据库只有一个），这类差异只记录警告。
    pub fn from_report(report: &SchemaDiffReport) -> Self {
        let mut fields = report.missing_in_target();
        fields.retain(|name, ft| {
            let keep = !matches!(ft, FieldType::Title);
            if !keep {
                warn!("跳过标题字段 {}：数据库 {} 已有标题字段", name, report.target_id);
            }
            keep
        });
        Self {
            database_id: report.target_id.clone(),
            fields,
        }
    }
}

pub struct AdditiveMigrator {
    store: Arc<dyn RemoteStore>,
    limiter: Arc<RateLimiter>,
    events: Option<Arc<EventBus>>,
}

impl AdditiveMigrator {
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

    /// 一次请求追加全部字段；字段为空时不发请求
    pub async fn add_fields(
        &self,
        database_id: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Vec<String>> {
        if fields.is_empty() {
            info!("数据库 {} 无需追加字段", database_id);
            return Ok(Vec::new());
        }

        let names: Vec<String> = fields.keys().cloned().collect();
        info!("向数据库 {} 追加字段: {}", database_id, names.join(", "));

        self.limiter.tick().await;
        match self.store.update_database(database_id, fields).await {
            Ok(_) => {
                self.publish(AppEvent::SchemaUpdated {
                    database_id: database_id.to_string(),
                    added: names.clone(),
                });
                Ok(names)
            }
            Err(e) => {
                error!("数据库 {} 结构更新失败: {}", database_id, e);
                self.publish(AppEvent::SchemaUpdateFailed {
                    database_id: database_id.to_string(),
                    error: e.to_string(),
                });
                Err(LedgerError::remote(
                    format!("update_database {}", database_id),
                    e,
                ))
            }
        }
    }

    /// 依次处理多个数据库，各自独立成败
    pub async fn migrate_all(
        &self,
        plans: &[SchemaPlan],
        cancel: &CancellationToken,
    ) -> MigrationSummary {
        let mut summary = MigrationSummary::default();
        for plan in plans {
            if cancel.is_cancelled() {
                summary.push(&plan.database_id, MigrationOutcome::Cancelled);
                continue;
            }
            let outcome = match self.add_fields(&plan.database_id, &plan.fields).await {
                Ok(_) => MigrationOutcome::FullyMigrated,
                Err(e) => MigrationOutcome::SchemaUpdateFailed {
                    error: e.to_string(),
                },
            };
            summary.push(&plan.database_id, outcome);
        }
        summary
    }
}

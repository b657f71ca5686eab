// 结构读取器 - 按 ID 读取远程数据库的结构和全部记录

use std::sync::Arc;
use tracing::{error, info};

use super::diff::{diff_with_direction, SchemaDiffReport, SyncDirection};
use super::model::Schema;
use crate::error::{LedgerError, Result};
use crate::migration::RateLimiter;
use crate::notion::{Page, RemoteStore};

pub struct SchemaFetcher {
    store: Arc<dyn RemoteStore>,
    limiter: Option<Arc<RateLimiter>>,
}

impl SchemaFetcher {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            limiter: None,
        }
    }

    /// 每次读取前经过限流器
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.tick().await;
        }
    }

    /// 读取数据库结构
    pub async fn fetch_schema(&self, database_id: &str) -> Result<Schema> {
        self.pace().await;
        let schema = self
            .store
            .retrieve_database(database_id)
            .await
            .map_err(|e| {
                error!("读取数据库 {} 结构失败: {}", database_id, e);
                LedgerError::remote(format!("retrieve_database {}", database_id), e)
            })?;
        info!(
            "数据库 {}（{}）共 {} 个字段",
            database_id,
            schema.title,
            schema.fields.len()
        );
        Ok(schema)
    }

    /// 读取数据库中的全部记录
    pub async fn fetch_records(&self, database_id: &str) -> Result<Vec<Page>> {
        self.pace().await;
        self.store
            .query_database(database_id, None)
            .await
            .map_err(|e| {
                error!("查询数据库 {} 记录失败: {}", database_id, e);
                LedgerError::remote(format!("query_database {}", database_id), e)
            })
    }

    /// 读取两个数据库并按方向比较
    pub async fn compare(
        &self,
        a_id: &str,
        b_id: &str,
        direction: SyncDirection,
    ) -> Result<SchemaDiffReport> {
        let a = self.fetch_schema(a_id).await?;
        let b = self.fetch_schema(b_id).await?;
        let report = diff_with_direction(&a, &b, direction);
        info!(
            "{} → {}: {} 处差异",
            report.source_id,
            report.target_id,
            report.differences.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::InMemoryStore;
    use crate::schema::FieldType;

    #[tokio::test]
    async fn test_compare_reads_both_sides() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_database(Schema::new("a").with_field("Name", FieldType::Title))
            .await;
        store
            .insert_database(
                Schema::new("b")
                    .with_field("Name", FieldType::Title)
                    .with_field("Date", FieldType::Date),
            )
            .await;

        let fetcher = SchemaFetcher::new(store.clone());
        let report = fetcher.compare("b", "a", SyncDirection::AToB).await.unwrap();
        assert_eq!(report.source_id, "b");
        assert_eq!(report.missing_in_target().get("Date"), Some(&FieldType::Date));
        assert_eq!(store.call_count("retrieve_database").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_go_through_limiter() {
        let store = Arc::new(InMemoryStore::new());
        for id in ["a", "b", "c"] {
            store.insert_database(Schema::new(id)).await;
        }
        let limiter = Arc::new(RateLimiter::new(2, tokio::time::Duration::from_millis(350)));
        let fetcher = SchemaFetcher::new(store).with_limiter(limiter.clone());

        for id in ["a", "b", "c"] {
            fetcher.fetch_schema(id).await.unwrap();
        }
        fetcher.fetch_records("a").await.unwrap();
        assert_eq!(limiter.calls(), 4);
        assert_eq!(limiter.pauses(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_is_remote() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = SchemaFetcher::new(store);
        let err = fetcher.fetch_schema("missing").await.unwrap_err();
        assert!(matches!(err, LedgerError::Remote { .. }));
    }
}

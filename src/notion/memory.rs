// 内存版远程存储
//
// 行为上模拟远程服务：未知字段或类型不匹配的写入返回 400，不存在的数据库/页面返回 404。
// 用于单元测试，以及命令行 --dry-run（先把远程数据镜像到内存，再在内存里执行迁移）。

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{Page, Properties, QueryFilter, RemoteStore};
use crate::error::RemoteError;
use crate::migration::RateLimiter;
use crate::schema::{FieldType, Schema};

#[derive(Default)]
struct StoreState {
    databases: HashMap<String, Schema>,
    /// (所属数据库, 页面)，保持插入顺序
    pages: Vec<(String, Page)>,
    /// 调用日志，按顺序记录操作名
    calls: Vec<String>,
    failing_databases: HashSet<String>,
    failing_retrievals: HashSet<String>,
    failing_creates: HashSet<(String, String)>,
    failing_page_updates: HashSet<String>,
}

/// 内存存储
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个数据库结构
    pub async fn insert_database(&self, schema: Schema) {
        let mut state = self.state.write().await;
        state.databases.insert(schema.database_id.clone(), schema);
    }

    /// 直接插入页面（不经过字段校验）
    pub async fn insert_page(&self, database_id: &str, page: Page) {
        let mut state = self.state.write().await;
        state.pages.push((database_id.to_string(), page));
    }

    /// 把远程数据库的结构和全部页面复制到内存，每次读取前经过限流器
    pub async fn mirror(
        remote: &dyn RemoteStore,
        database_ids: &[String],
        limiter: &RateLimiter,
    ) -> Result<Self, RemoteError> {
        let store = Self::new();
        for id in database_ids {
            limiter.tick().await;
            let schema = remote.retrieve_database(id).await?;
            limiter.tick().await;
            let pages = remote.query_database(id, None).await?;
            info!("镜像数据库 {}：{} 个字段，{} 条记录", id, schema.fields.len(), pages.len());
            store.insert_database(schema).await;
            for page in pages {
                store.insert_page(id, page).await;
            }
        }
        Ok(store)
    }

    pub async fn schema(&self, database_id: &str) -> Option<Schema> {
        self.state.read().await.databases.get(database_id).cloned()
    }

    pub async fn page(&self, page_id: &str) -> Option<Page> {
        let state = self.state.read().await;
        state
            .pages
            .iter()
            .find(|(_, p)| p.id == page_id)
            .map(|(_, p)| p.clone())
    }

    pub async fn pages_in(&self, database_id: &str) -> Vec<Page> {
        let state = self.state.read().await;
        state
            .pages
            .iter()
            .filter(|(db, _)| db == database_id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// 已执行的调用（操作名）
    pub async fn calls(&self) -> Vec<String> {
        self.state.read().await.calls.clone()
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// 让该数据库的结构更新失败
    pub async fn fail_database_update(&self, database_id: &str) {
        self.state
            .write()
            .await
            .failing_databases
            .insert(database_id.to_string());
    }

    /// 让该数据库的结构读取失败
    pub async fn fail_retrieve(&self, database_id: &str) {
        self.state
            .write()
            .await
            .failing_retrievals
            .insert(database_id.to_string());
    }

    /// 在该数据库中创建标题为 `title` 的页面时失败
    pub async fn fail_create(&self, database_id: &str, title: &str) {
        self.state
            .write()
            .await
            .failing_creates
            .insert((database_id.to_string(), title.to_string()));
    }

    /// 更新该页面时失败
    pub async fn fail_page_update(&self, page_id: &str) {
        self.state
            .write()
            .await
            .failing_page_updates
            .insert(page_id.to_string());
    }
}

fn validate_properties(schema: &Schema, properties: &Properties) -> Result<(), RemoteError> {
    for (name, value) in properties {
        match schema.get(name) {
            None => {
                return Err(RemoteError::Http {
                    status: 400,
                    body: format!("{} is not a property that exists.", name),
                })
            }
            Some(field) if field.type_name() != value.type_name() => {
                return Err(RemoteError::Http {
                    status: 400,
                    body: format!(
                        "{} is expected to be {}, got {}.",
                        name,
                        field.type_name(),
                        value.type_name()
                    ),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn title_of(schema: &Schema, properties: &Properties) -> Option<String> {
    schema
        .fields
        .iter()
        .find(|(_, ft)| matches!(ft, FieldType::Title))
        .and_then(|(name, _)| properties.get(name))
        .and_then(|v| v.as_text())
        .map(|s| s.to_string())
}

fn not_found(what: &str, id: &str) -> RemoteError {
    RemoteError::NotFound(format!("Could not find {} with ID: {}", what, id))
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn retrieve_database(&self, database_id: &str) -> Result<Schema, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push("retrieve_database".to_string());
        if state.failing_retrievals.contains(database_id) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        state
            .databases
            .get(database_id)
            .cloned()
            .ok_or_else(|| not_found("database", database_id))
    }

    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<Page>, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push("query_database".to_string());
        if !state.databases.contains_key(database_id) {
            return Err(not_found("database", database_id));
        }
        Ok(state
            .pages
            .iter()
            .filter(|(db, page)| db == database_id && filter.map_or(true, |f| f.matches(page)))
            .map(|(_, page)| page.clone())
            .collect())
    }

    async fn update_database(
        &self,
        database_id: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Schema, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push("update_database".to_string());
        if state.failing_databases.contains(database_id) {
            return Err(RemoteError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        let schema = state
            .databases
            .get_mut(database_id)
            .ok_or_else(|| not_found("database", database_id))?;
        for (name, field_type) in fields {
            schema.fields.insert(name.clone(), field_type.clone());
        }
        Ok(schema.clone())
    }

    async fn create_database(
        &self,
        parent_page_id: &str,
        title: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Schema, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push("create_database".to_string());
        if parent_page_id.is_empty() {
            return Err(not_found("page", parent_page_id));
        }
        let schema = Schema {
            database_id: Uuid::new_v4().simple().to_string(),
            title: title.to_string(),
            fields: fields.clone(),
        };
        state
            .databases
            .insert(schema.database_id.clone(), schema.clone());
        Ok(schema)
    }

    async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
    ) -> Result<Page, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push("create_page".to_string());
        let schema = state
            .databases
            .get(database_id)
            .ok_or_else(|| not_found("database", database_id))?;
        validate_properties(schema, properties)?;

        if let Some(title) = title_of(schema, properties) {
            if state
                .failing_creates
                .contains(&(database_id.to_string(), title.clone()))
            {
                return Err(RemoteError::Http {
                    status: 409,
                    body: format!("conflict while saving {}", title),
                });
            }
        }

        let page = Page {
            id: Uuid::new_v4().to_string(),
            properties: properties.clone(),
        };
        state.pages.push((database_id.to_string(), page.clone()));
        Ok(page)
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &Properties,
    ) -> Result<Page, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push("update_page".to_string());
        if state.failing_page_updates.contains(page_id) {
            return Err(RemoteError::Http {
                status: 409,
                body: format!("conflict while updating {}", page_id),
            });
        }

        let database_id = state
            .pages
            .iter()
            .find(|(_, p)| p.id == page_id)
            .map(|(db, _)| db.clone())
            .ok_or_else(|| not_found("page", page_id))?;
        let schema = state
            .databases
            .get(&database_id)
            .ok_or_else(|| not_found("database", &database_id))?;
        validate_properties(schema, properties)?;

        let (_, page) = state
            .pages
            .iter_mut()
            .find(|(_, p)| p.id == page_id)
            .ok_or_else(|| not_found("page", page_id))?;
        for (name, value) in properties {
            page.properties.insert(name.clone(), value.clone());
        }
        Ok(page.clone())
    }
}

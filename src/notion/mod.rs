// Notion 集成模块
// 提供远程存储的统一访问接口：数据库结构、页面查询、页面写入

pub mod client;
pub mod memory;
pub mod property;

pub use client::NotionClient;
pub use memory::InMemoryStore;
pub use property::{decode_properties, encode_properties, DateValue, Properties, PropertyValue};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::RemoteError;
use crate::schema::{FieldType, Schema};

/// 远程页面（一条记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub properties: Properties,
}

impl Page {
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_text())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_number())
    }

    pub fn relation(&self, name: &str) -> &[String] {
        self.get(name).map(|v| v.as_relation()).unwrap_or(&[])
    }

    /// 解析 `{ id, properties }` 页面对象
    pub fn from_json(page: &Value) -> Option<Self> {
        Some(Self {
            id: page["id"].as_str()?.to_string(),
            properties: decode_properties(&page["properties"]),
        })
    }
}

/// 数据库查询过滤条件
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    TitleEquals { property: String, value: String },
    RichTextEquals { property: String, value: String },
    DateEquals { property: String, date: NaiveDate },
    RelationContains { property: String, page_id: String },
}

impl QueryFilter {
    /// 编码为查询请求中的 `filter`
    pub fn to_json(&self) -> Value {
        match self {
            QueryFilter::TitleEquals { property, value } => json!({
                "property": property,
                "title": { "equals": value }
            }),
            QueryFilter::RichTextEquals { property, value } => json!({
                "property": property,
                "rich_text": { "equals": value }
            }),
            QueryFilter::DateEquals { property, date } => json!({
                "property": property,
                "date": { "equals": date.format("%Y-%m-%d").to_string() }
            }),
            QueryFilter::RelationContains { property, page_id } => json!({
                "property": property,
                "relation": { "contains": page_id }
            }),
        }
    }

    /// 本地判断页面是否满足条件（内存存储使用）
    pub fn matches(&self, page: &Page) -> bool {
        match self {
            QueryFilter::TitleEquals { property, value }
            | QueryFilter::RichTextEquals { property, value } => {
                page.text(property) == Some(value.as_str())
            }
            QueryFilter::DateEquals { property, date } => match page.get(property) {
                Some(PropertyValue::Date(Some(d))) => d.start_date() == Some(*date),
                _ => false,
            },
            QueryFilter::RelationContains { property, page_id } => {
                page.relation(property).iter().any(|id| id == page_id)
            }
        }
    }
}

/// 远程存储操作接口 - 账本写入和迁移工具共用同一套底层调用
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 获取数据库结构
    async fn retrieve_database(&self, database_id: &str) -> Result<Schema, RemoteError>;

    /// 查询数据库中的页面（自动翻页，返回全部结果）
    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<Page>, RemoteError>;

    /// 追加字段（只增不删）
    async fn update_database(
        &self,
        database_id: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Schema, RemoteError>;

    /// 在父页面下创建数据库
    async fn create_database(
        &self,
        parent_page_id: &str,
        title: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Schema, RemoteError>;

    /// 创建页面，返回带 id 的页面
    async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
    ) -> Result<Page, RemoteError>;

    /// 局部更新页面属性
    async fn update_page(&self, page_id: &str, properties: &Properties)
        -> Result<Page, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_json() {
        let filter = QueryFilter::RelationContains {
            property: "主记录".to_string(),
            page_id: "p1".to_string(),
        };
        assert_eq!(
            filter.to_json(),
            json!({ "property": "主记录", "relation": { "contains": "p1" } })
        );
    }

    #[test]
    fn test_filter_matches_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let mut properties = Properties::new();
        properties.insert(
            "日期".to_string(),
            PropertyValue::Date(Some(DateValue::date(date))),
        );
        let page = Page {
            id: "p".to_string(),
            properties,
        };
        let filter = QueryFilter::DateEquals {
            property: "日期".to_string(),
            date,
        };
        assert!(filter.matches(&page));
    }
}

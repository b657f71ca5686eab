// Notion API 客户端模块
// 负责与 Notion API 交互，实现 RemoteStore 的 HTTP 版本

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{encode_properties, Page, Properties, QueryFilter, RemoteStore};
use crate::error::{LedgerError, RemoteError};
use crate::models::NotionConfig;
use crate::schema::{FieldType, Schema};

/// 单次查询的最大页大小
const QUERY_PAGE_SIZE: u32 = 100;

/// 从链接或带连字符的 ID 中提取 32 位十六进制 ID（取第一个匹配，链接里的视图 ID 在后面）
pub fn normalize_id(raw: &str) -> Option<String> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = ID_RE.get_or_init(|| {
        Regex::new(r"([0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12})")
            .expect("静态正则表达式")
    });
    re.captures(raw)
        .map(|c| c[1].replace('-', "").to_lowercase())
}

/// Notion API 客户端
#[derive(Clone)]
pub struct NotionClient {
    config: NotionConfig,
    client: Client,
}

impl NotionClient {
    /// 创建新的 Notion 客户端
    pub fn new(config: NotionConfig) -> Result<Self, LedgerError> {
        if config.api_token.trim().is_empty() {
            return Err(LedgerError::Config("Notion API Token 不能为空".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self { config, client })
    }

    /// 获取配置信息（用于调试）
    pub fn get_config(&self) -> &NotionConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// 附带鉴权、协议版本和内容类型请求头
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {}", self.config.api_token))
            .header("Notion-Version", &self.config.api_version)
            .header("Content-Type", "application/json")
    }

    /// 发送请求并解析 JSON；非 2xx 状态返回带响应正文的错误
    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Value, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "无法读取错误信息".to_string());
            error!("Notion 请求失败 ({}): {} {}", operation, status.as_u16(), body);
            if status.as_u16() == 404 {
                return Err(RemoteError::NotFound(body));
            }
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        Ok(value)
    }

    fn parse_schema(value: &Value) -> Result<Schema, RemoteError> {
        Schema::from_database_json(value)
            .ok_or_else(|| RemoteError::Decode("数据库对象缺少 id".to_string()))
    }

    fn parse_page(value: &Value) -> Result<Page, RemoteError> {
        Page::from_json(value).ok_or_else(|| RemoteError::Decode("页面对象缺少 id".to_string()))
    }
}

#[async_trait]
impl RemoteStore for NotionClient {
    async fn retrieve_database(&self, database_id: &str) -> Result<Schema, RemoteError> {
        let path = format!("databases/{}", database_id);
        let value = self
            .send(self.request(Method::GET, &path), "retrieve_database")
            .await?;
        Self::parse_schema(&value)
    }

    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<Page>, RemoteError> {
        let path = format!("databases/{}/query", database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": QUERY_PAGE_SIZE });
            if let Some(f) = filter {
                body["filter"] = f.to_json();
            }
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let result = self
                .send(self.request(Method::POST, &path).json(&body), "query_database")
                .await?;

            if let Some(results) = result["results"].as_array() {
                pages.extend(results.iter().filter_map(Page::from_json));
            }

            match (result["has_more"].as_bool(), result["next_cursor"].as_str()) {
                (Some(true), Some(next)) => cursor = Some(next.to_string()),
                _ => break,
            }
        }

        debug!("查询数据库 {} 返回 {} 条记录", database_id, pages.len());
        Ok(pages)
    }

    async fn update_database(
        &self,
        database_id: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Schema, RemoteError> {
        let path = format!("databases/{}", database_id);
        let payload = json!({ "properties": Schema::definitions(fields) });

        let value = self
            .send(
                self.request(Method::PATCH, &path).json(&payload),
                "update_database",
            )
            .await?;

        info!("数据库 {} 已追加 {} 个字段", database_id, fields.len());
        Self::parse_schema(&value)
    }

    async fn create_database(
        &self,
        parent_page_id: &str,
        title: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> Result<Schema, RemoteError> {
        let payload = json!({
            "parent": {
                "type": "page_id",
                "page_id": parent_page_id
            },
            "title": [{
                "type": "text",
                "text": { "content": title }
            }],
            "properties": Schema::definitions(fields),
        });

        let value = self
            .send(
                self.request(Method::POST, "databases").json(&payload),
                "create_database",
            )
            .await?;

        let schema = Self::parse_schema(&value)?;
        info!("成功创建数据库 {}，ID: {}", title, schema.database_id);
        Ok(schema)
    }

    async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
    ) -> Result<Page, RemoteError> {
        let payload = json!({
            "parent": { "database_id": database_id },
            "properties": encode_properties(properties),
        });

        let value = self
            .send(
                self.request(Method::POST, "pages").json(&payload),
                "create_page",
            )
            .await?;
        Self::parse_page(&value)
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &Properties,
    ) -> Result<Page, RemoteError> {
        let path = format!("pages/{}", page_id);
        let payload = json!({ "properties": encode_properties(properties) });

        let value = self
            .send(
                self.request(Method::PATCH, &path).json(&payload),
                "update_page",
            )
            .await?;
        Self::parse_page(&value)
    }
}

// 配置模型 - 定义注入到各组件的配置结构

use serde::{Deserialize, Serialize};

use crate::schema::EntityKind;

/// Notion API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// API 密钥
    #[serde(default)]
    pub api_token: String,
    /// API 基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 协议版本请求头
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.notion.com/v1".to_string()
}

fn default_api_version() -> String {
    "2022-06-28".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: default_base_url(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 每类实体对应的数据库 ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseIds {
    #[serde(default)]
    pub main_record: String,
    #[serde(default)]
    pub activity_detail: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub todo: String,
    #[serde(default)]
    pub daily_status: String,
}

impl DatabaseIds {
    pub fn get(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::MainRecord => &self.main_record,
            EntityKind::ActivityDetail => &self.activity_detail,
            EntityKind::Goal => &self.goal,
            EntityKind::Todo => &self.todo,
            EntityKind::DailyStatus => &self.daily_status,
        }
    }

    pub fn set(&mut self, kind: EntityKind, id: String) {
        match kind {
            EntityKind::MainRecord => self.main_record = id,
            EntityKind::ActivityDetail => self.activity_detail = id,
            EntityKind::Goal => self.goal = id,
            EntityKind::Todo => self.todo = id,
            EntityKind::DailyStatus => self.daily_status = id,
        }
    }

    /// 未配置的实体
    pub fn missing(&self) -> Vec<EntityKind> {
        EntityKind::CREATION_ORDER
            .into_iter()
            .filter(|k| self.get(*k).trim().is_empty())
            .collect()
    }
}

/// 租户（一套独立演进的数据库）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    #[serde(default)]
    pub databases: DatabaseIds,
}

/// 迁移节流设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// 每批请求数
    pub batch_size: usize,
    /// 批次之间的暂停（毫秒）
    pub pause_ms: u64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pause_ms: 350,
        }
    }
}

/// 持久化的应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAppConfig {
    #[serde(default)]
    pub notion: NotionConfig,
    /// 已知租户，第一个为账本写入使用的默认租户
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
    #[serde(default)]
    pub migration: MigrationSettings,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PersistedAppConfig {
    fn default() -> Self {
        Self {
            notion: NotionConfig::default(),
            tenants: vec![TenantConfig {
                name: "default".to_string(),
                databases: DatabaseIds::default(),
            }],
            migration: MigrationSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl PersistedAppConfig {
    pub fn tenant(&self, name: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.name == name)
    }

    pub fn default_tenant(&self) -> Option<&TenantConfig> {
        self.tenants.first()
    }
}

/// 配置的局部更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub notion: Option<NotionConfig>,
    pub tenant: Option<TenantConfig>,
    pub migration: Option<MigrationSettings>,
    pub log_level: Option<String>,
}

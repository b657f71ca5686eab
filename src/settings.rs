// 配置管理 - 读写 JSON 配置文件，环境变量中的 API 密钥只在内存中覆盖

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::warn;

use crate::models::{AppConfig, PersistedAppConfig};

/// 覆盖配置文件中 API 密钥的环境变量
pub const API_KEY_ENV: &str = "NOTION_API_KEY";

/// 默认配置文件路径
pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    if cfg!(target_os = "macos") {
        PathBuf::from(home).join("Library/Application Support/time-ledger/config.json")
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("time-ledger").join("config.json")
    } else {
        PathBuf::from(home).join(".config/time-ledger/config.json")
    }
}

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<PersistedAppConfig>,
    /// 来自环境变量，不写入配置文件
    env_api_key: Option<String>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        Self::load(path, std::env::var(API_KEY_ENV).ok()).await
    }

    async fn load(path: PathBuf, env_api_key: Option<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                serde_json::from_slice::<PersistedAppConfig>(&bytes).unwrap_or_else(|e| {
                    warn!("配置文件 {:?} 解析失败，使用默认配置: {}", path, e);
                    PersistedAppConfig::default()
                })
            }
            _ => {
                let default = PersistedAppConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("写入默认配置 {:?} 失败", path))?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
            env_api_key: env_api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// 生效的配置（已应用环境变量覆盖）
    pub async fn get(&self) -> PersistedAppConfig {
        let config = self.data.read().await.clone();
        self.with_overrides(config)
    }

    fn with_overrides(&self, mut config: PersistedAppConfig) -> PersistedAppConfig {
        if let Some(key) = &self.env_api_key {
            config.notion.api_token = key.clone();
        }
        config
    }

    pub async fn update(&self, update: AppConfig) -> Result<PersistedAppConfig> {
        let mut config = self.data.write().await;

        if let Some(mut notion) = update.notion {
            // 从 get() 取回的环境变量密钥不落盘
            if self.env_api_key.as_deref() == Some(notion.api_token.as_str()) {
                notion.api_token = config.notion.api_token.clone();
            }
            config.notion = notion;
        }
        if let Some(tenant) = update.tenant {
            match config.tenants.iter_mut().find(|t| t.name == tenant.name) {
                Some(existing) => *existing = tenant,
                None => config.tenants.push(tenant),
            }
        }
        if let Some(migration) = update.migration {
            config.migration = migration;
        }
        if let Some(level) = update.log_level {
            config.log_level = level;
        }

        self.save(&config).await?;
        Ok(self.with_overrides(config.clone()))
    }

    async fn save(&self, config: &PersistedAppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

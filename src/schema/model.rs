// 数据库结构模型 - 字段名到字段类型的映射

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// 字段类型（封闭集合，未知类型保留原始类型名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Title,
    RichText,
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Select {
        #[serde(default)]
        options: Vec<String>,
    },
    MultiSelect {
        #[serde(default)]
        options: Vec<String>,
    },
    Date,
    Checkbox,
    Relation {
        database_id: String,
    },
    Other {
        type_name: String,
    },
}

impl FieldType {
    pub fn number() -> Self {
        FieldType::Number {
            format: Some("number".to_string()),
        }
    }

    pub fn select(options: &[&str]) -> Self {
        FieldType::Select {
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn multi_select(options: &[&str]) -> Self {
        FieldType::MultiSelect {
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn relation(database_id: &str) -> Self {
        FieldType::Relation {
            database_id: database_id.to_string(),
        }
    }

    /// 远程声明的类型名，差异比较只看这个值
    pub fn type_name(&self) -> &str {
        match self {
            FieldType::Title => "title",
            FieldType::RichText => "rich_text",
            FieldType::Number { .. } => "number",
            FieldType::Select { .. } => "select",
            FieldType::MultiSelect { .. } => "multi_select",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::Relation { .. } => "relation",
            FieldType::Other { type_name } => type_name,
        }
    }

    /// 生成用于创建数据库 / PATCH 数据库结构的字段定义
    pub fn to_definition(&self) -> Value {
        match self {
            FieldType::Title => json!({ "title": {} }),
            FieldType::RichText => json!({ "rich_text": {} }),
            FieldType::Number { format } => json!({
                "number": { "format": format.as_deref().unwrap_or("number") }
            }),
            FieldType::Select { options } => json!({
                "select": { "options": options_json(options) }
            }),
            FieldType::MultiSelect { options } => json!({
                "multi_select": { "options": options_json(options) }
            }),
            FieldType::Date => json!({ "date": {} }),
            FieldType::Checkbox => json!({ "checkbox": {} }),
            FieldType::Relation { database_id } => json!({
                "relation": {
                    "database_id": database_id,
                    "type": "single_property",
                    "single_property": {}
                }
            }),
            FieldType::Other { type_name } => {
                let mut def = serde_json::Map::new();
                def.insert(type_name.clone(), json!({}));
                Value::Object(def)
            }
        }
    }

    /// 从 `GET /databases/{id}` 返回的单个字段定义解析
    pub fn from_definition(def: &Value) -> Option<Self> {
        let type_name = def["type"].as_str()?;
        let config = &def[type_name];

        let field = match type_name {
            "title" => FieldType::Title,
            "rich_text" => FieldType::RichText,
            "number" => FieldType::Number {
                format: config["format"].as_str().map(|s| s.to_string()),
            },
            "select" => FieldType::Select {
                options: option_names(config),
            },
            "multi_select" => FieldType::MultiSelect {
                options: option_names(config),
            },
            "date" => FieldType::Date,
            "checkbox" => FieldType::Checkbox,
            "relation" => FieldType::Relation {
                database_id: config["database_id"].as_str().unwrap_or("").to_string(),
            },
            other => FieldType::Other {
                type_name: other.to_string(),
            },
        };
        Some(field)
    }
}

fn options_json(options: &[String]) -> Vec<Value> {
    options.iter().map(|name| json!({ "name": name })).collect()
}

fn option_names(config: &Value) -> Vec<String> {
    config["options"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o["name"].as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// 远程数据库结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub database_id: String,
    #[serde(default)]
    pub title: String,
    /// 字段名唯一，BTreeMap 保证遍历顺序稳定
    pub fields: BTreeMap<String, FieldType>,
}

impl Schema {
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            title: String::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(name.to_string(), field_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// 解析数据库对象（`{ id, title, properties }`）
    pub fn from_database_json(database: &Value) -> Option<Self> {
        let database_id = database["id"].as_str()?.to_string();
        let title = database["title"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t["plain_text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let mut fields = BTreeMap::new();
        if let Some(props) = database["properties"].as_object() {
            for (name, def) in props {
                if let Some(field_type) = FieldType::from_definition(def) {
                    fields.insert(name.clone(), field_type);
                }
            }
        }

        Some(Self {
            database_id,
            title,
            fields,
        })
    }

    /// 字段定义集合，作为 PATCH / 创建数据库请求中的 `properties`
    pub fn definitions(fields: &BTreeMap<String, FieldType>) -> Value {
        let map: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(name, ft)| (name.clone(), ft.to_definition()))
            .collect();
        Value::Object(map)
    }
}

// 页面属性值 - 远程存储按字段类型包装的属性信封
//
// 每个变体对应一种信封格式，各自负责编码（写入请求）和解码（读取响应）。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// 单个 rich_text 文本对象的最大长度
const TEXT_CHUNK_LIMIT: usize = 2000;

/// 日期属性值（ISO 8601 字符串）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl DateValue {
    pub fn date(date: NaiveDate) -> Self {
        Self {
            start: date.format("%Y-%m-%d").to_string(),
            end: None,
        }
    }

    pub fn datetime(dt: NaiveDateTime) -> Self {
        Self {
            start: dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            end: None,
        }
    }

    /// 取起始值中的日期部分
    pub fn start_date(&self) -> Option<NaiveDate> {
        let date_part = self.start.get(..10)?;
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }

    /// 取起始值的时间；带时区偏移时取该偏移下的钟面时间
    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.start) {
            return Some(dt.naive_local());
        }
        NaiveDateTime::parse_from_str(&self.start, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}

/// 属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Number(Option<f64>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Date(Option<DateValue>),
    Checkbox(bool),
    Relation(Vec<String>),
}

/// 页面属性集合
pub type Properties = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    pub fn title(s: impl Into<String>) -> Self {
        PropertyValue::Title(s.into())
    }

    pub fn rich_text(s: impl Into<String>) -> Self {
        PropertyValue::RichText(s.into())
    }

    pub fn select(name: impl Into<String>) -> Self {
        PropertyValue::Select(Some(name.into()))
    }

    pub fn relation_one(id: impl Into<String>) -> Self {
        PropertyValue::Relation(vec![id.into()])
    }

    /// 对应的字段类型名
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Title(_) => "title",
            PropertyValue::RichText(_) => "rich_text",
            PropertyValue::Number(_) => "number",
            PropertyValue::Select(_) => "select",
            PropertyValue::MultiSelect(_) => "multi_select",
            PropertyValue::Date(_) => "date",
            PropertyValue::Checkbox(_) => "checkbox",
            PropertyValue::Relation(_) => "relation",
        }
    }

    /// 值是否为空（未勾选的复选框视为空）
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Title(s) | PropertyValue::RichText(s) => s.trim().is_empty(),
            PropertyValue::Number(n) => n.is_none(),
            PropertyValue::Select(s) => s.as_deref().map_or(true, |s| s.is_empty()),
            PropertyValue::MultiSelect(v) => v.is_empty(),
            PropertyValue::Date(d) => d.is_none(),
            PropertyValue::Checkbox(b) => !b,
            PropertyValue::Relation(ids) => ids.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Title(s) | PropertyValue::RichText(s) => Some(s),
            PropertyValue::Select(Some(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => *n,
            _ => None,
        }
    }

    pub fn as_relation(&self) -> &[String] {
        match self {
            PropertyValue::Relation(ids) => ids,
            _ => &[],
        }
    }

    /// 编码为请求中的属性信封
    pub fn encode(&self) -> Value {
        match self {
            PropertyValue::Title(s) => json!({ "title": text_objects(s) }),
            PropertyValue::RichText(s) => json!({ "rich_text": text_objects(s) }),
            PropertyValue::Number(n) => json!({ "number": n }),
            PropertyValue::Select(Some(name)) => json!({ "select": { "name": name } }),
            PropertyValue::Select(None) => json!({ "select": null }),
            PropertyValue::MultiSelect(names) => json!({
                "multi_select": names.iter().map(|n| json!({ "name": n })).collect::<Vec<_>>()
            }),
            PropertyValue::Date(Some(d)) => json!({ "date": { "start": d.start, "end": d.end } }),
            PropertyValue::Date(None) => json!({ "date": null }),
            PropertyValue::Checkbox(b) => json!({ "checkbox": b }),
            PropertyValue::Relation(ids) => json!({
                "relation": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>()
            }),
        }
    }

    /// 从响应中的属性信封解码；不支持的类型返回 None
    pub fn decode(envelope: &Value) -> Option<Self> {
        let type_name = match envelope["type"].as_str() {
            Some(t) => t,
            // 请求体格式没有 type 字段，按信封键判断
            None => envelope.as_object()?.keys().find(|k| k.as_str() != "id")?.as_str(),
        };
        let body = &envelope[type_name];

        let value = match type_name {
            "title" => PropertyValue::Title(plain_text(body)),
            "rich_text" => PropertyValue::RichText(plain_text(body)),
            "number" => PropertyValue::Number(body.as_f64()),
            "select" => PropertyValue::Select(body["name"].as_str().map(|s| s.to_string())),
            "multi_select" => PropertyValue::MultiSelect(
                body.as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|o| o["name"].as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            "date" => PropertyValue::Date(body["start"].as_str().map(|start| DateValue {
                start: start.to_string(),
                end: body["end"].as_str().map(|s| s.to_string()),
            })),
            "checkbox" => PropertyValue::Checkbox(body.as_bool().unwrap_or(false)),
            "relation" => PropertyValue::Relation(
                body.as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|o| o["id"].as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            _ => return None,
        };
        Some(value)
    }
}

/// 编码属性集合为 `properties` 对象
pub fn encode_properties(properties: &Properties) -> Value {
    let map: serde_json::Map<String, Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), value.encode()))
        .collect();
    Value::Object(map)
}

/// 解码页面的 `properties` 对象
pub fn decode_properties(properties: &Value) -> Properties {
    properties
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(name, envelope)| {
                    PropertyValue::decode(envelope).map(|v| (name.clone(), v))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn text_objects(s: &str) -> Vec<Value> {
    if s.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(TEXT_CHUNK_LIMIT)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "text": { "content": content } })
        })
        .collect()
}

fn plain_text(body: &Value) -> String {
    body.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| {
                    t["plain_text"]
                        .as_str()
                        .or_else(|| t["text"]["content"].as_str())
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

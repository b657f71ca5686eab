// 结构差异计算
//
// 只比较字段名集合和声明的类型名，不深入比较选项列表或关联目标。

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::model::{FieldType, Schema};

/// 单条差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaDifference {
    /// 源有、目标没有
    MissingInTarget { field: String, field_type: FieldType },
    /// 目标有、源没有
    MissingInSource { field: String, field_type: FieldType },
    /// 两边都有但类型不同
    TypeMismatch {
        field: String,
        source_type: FieldType,
        target_type: FieldType,
    },
}

impl SchemaDifference {
    pub fn field(&self) -> &str {
        match self {
            SchemaDifference::MissingInTarget { field, .. }
            | SchemaDifference::MissingInSource { field, .. }
            | SchemaDifference::TypeMismatch { field, .. } => field,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            SchemaDifference::MissingInTarget { .. } => "missing_in_target",
            SchemaDifference::MissingInSource { .. } => "missing_in_source",
            SchemaDifference::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

impl fmt::Display for SchemaDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaDifference::MissingInTarget { field, field_type }
            | SchemaDifference::MissingInSource { field, field_type } => {
                write!(f, "{}: {} ({})", self.kind_label(), field, field_type.type_name())
            }
            SchemaDifference::TypeMismatch {
                field,
                source_type,
                target_type,
            } => write!(
                f,
                "type_mismatch: {} ({} ≠ {})",
                field,
                source_type.type_name(),
                target_type.type_name()
            ),
        }
    }
}

/// 以哪一侧为准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    /// A 为源，B 为目标
    #[default]
    AToB,
    /// B 为源，A 为目标
    BToA,
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a-to-b" | "atob" => Ok(SyncDirection::AToB),
            "b-to-a" | "btoa" => Ok(SyncDirection::BToA),
            other => Err(format!("未知的同步方向: {}（可选 a-to-b / b-to-a）", other)),
        }
    }
}

/// 差异报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDiffReport {
    pub source_id: String,
    pub target_id: String,
    pub differences: Vec<SchemaDifference>,
}

impl SchemaDiffReport {
    /// 目标缺少的字段（可直接交给追加迁移）
    pub fn missing_in_target(&self) -> BTreeMap<String, FieldType> {
        self.differences
            .iter()
            .filter_map(|d| match d {
                SchemaDifference::MissingInTarget { field, field_type } => {
                    Some((field.clone(), field_type.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn missing_in_source(&self) -> BTreeMap<String, FieldType> {
        self.differences
            .iter()
            .filter_map(|d| match d {
                SchemaDifference::MissingInSource { field, field_type } => {
                    Some((field.clone(), field_type.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn type_mismatches(&self) -> Vec<&SchemaDifference> {
        self.differences
            .iter()
            .filter(|d| matches!(d, SchemaDifference::TypeMismatch { .. }))
            .collect()
    }

    pub fn is_converged(&self) -> bool {
        self.differences.is_empty()
    }
}

/// 计算 source 与 target 的差异
///
/// 顺序：先 missing_in_target，再 missing_in_source，最后 type_mismatch，组内按字段名排序。
pub fn diff_schemas(source: &Schema, target: &Schema) -> SchemaDiffReport {
    let mut differences = Vec::new();

    for (name, field_type) in &source.fields {
        if !target.contains(name) {
            differences.push(SchemaDifference::MissingInTarget {
                field: name.clone(),
                field_type: field_type.clone(),
            });
        }
    }

    for (name, field_type) in &target.fields {
        if !source.contains(name) {
            differences.push(SchemaDifference::MissingInSource {
                field: name.clone(),
                field_type: field_type.clone(),
            });
        }
    }

    for (name, source_type) in &source.fields {
        if let Some(target_type) = target.get(name) {
            if source_type.type_name() != target_type.type_name() {
                differences.push(SchemaDifference::TypeMismatch {
                    field: name.clone(),
                    source_type: source_type.clone(),
                    target_type: target_type.clone(),
                });
            }
        }
    }

    SchemaDiffReport {
        source_id: source.database_id.clone(),
        target_id: target.database_id.clone(),
        differences,
    }
}

/// 按同步方向比较两个结构
pub fn diff_with_direction(a: &Schema, b: &Schema, direction: SyncDirection) -> SchemaDiffReport {
    match direction {
        SyncDirection::AToB => diff_schemas(a, b),
        SyncDirection::BToA => diff_schemas(b, a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_a() -> Schema {
        Schema::new("user2")
            .with_field("Name", FieldType::Title)
            .with_field("Summary", FieldType::RichText)
    }

    fn schema_b() -> Schema {
        Schema::new("user1")
            .with_field("Title", FieldType::Title)
            .with_field("Summary", FieldType::RichText)
            .with_field("Date", FieldType::Date)
    }

    #[test]
    fn test_diff_scenario() {
        // B 为源、A 为目标：A 缺少 Title 和 Date，A 多出 Name，Summary 类型一致
        let report = diff_schemas(&schema_b(), &schema_a());
        let missing = report.missing_in_target();
        assert_eq!(missing.get("Date"), Some(&FieldType::Date));
        assert_eq!(missing.get("Title"), Some(&FieldType::Title));
        assert_eq!(report.missing_in_source().keys().collect::<Vec<_>>(), vec!["Name"]);
        assert!(report.type_mismatches().is_empty());

        // A 为源、B 为目标：B 缺少 Name，A 缺少 Date/Title
        let report = diff_schemas(&schema_a(), &schema_b());
        assert_eq!(report.missing_in_source().get("Date"), Some(&FieldType::Date));
        assert!(report.type_mismatches().is_empty());
    }

    #[test]
    fn test_diff_is_symmetric() {
        let a = schema_a().with_field("Score", FieldType::number());
        let b = schema_b().with_field("Score", FieldType::RichText);

        let ab = diff_schemas(&a, &b);
        let ba = diff_schemas(&b, &a);
        assert_eq!(ab.missing_in_target(), ba.missing_in_source());
        assert_eq!(ab.missing_in_source(), ba.missing_in_target());
        assert_eq!(ab.type_mismatches().len(), 1);
        assert_eq!(ba.type_mismatches().len(), 1);
    }

    #[test]
    fn test_options_are_not_compared() {
        let a = Schema::new("a").with_field("价值", FieldType::select(&["高价值"]));
        let b = Schema::new("b").with_field("价值", FieldType::select(&["高价值", "低价值"]));
        assert!(diff_schemas(&a, &b).is_converged());
    }

    #[test]
    fn test_ordering_and_display() {
        let report = diff_schemas(&schema_b(), &schema_a());
        let kinds: Vec<_> = report.differences.iter().map(|d| d.kind_label()).collect();
        assert_eq!(
            kinds,
            vec!["missing_in_target", "missing_in_target", "missing_in_source"]
        );
        assert_eq!(report.differences[0].to_string(), "missing_in_target: Date (date)");
    }

    #[test]
    fn test_direction() {
        let a = schema_a();
        let b = schema_b();
        assert_eq!(
            diff_with_direction(&a, &b, SyncDirection::BToA),
            diff_schemas(&b, &a)
        );
        assert_eq!("b-to-a".parse::<SyncDirection>(), Ok(SyncDirection::BToA));
        assert!("sideways".parse::<SyncDirection>().is_err());
    }
}

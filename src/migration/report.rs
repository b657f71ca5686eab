// 迁移结果汇总

use serde::Serialize;
use std::fmt;

use super::field_rename::FieldMigrationStats;

/// 单个数据库的迁移结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    FullyMigrated,
    PartiallyMigrated { failed: usize },
    SchemaUpdateFailed { error: String },
    Cancelled,
}

impl MigrationOutcome {
    pub fn from_stats(stats: &FieldMigrationStats) -> Self {
        if stats.cancelled {
            MigrationOutcome::Cancelled
        } else if stats.failed > 0 {
            MigrationOutcome::PartiallyMigrated {
                failed: stats.failed,
            }
        } else {
            MigrationOutcome::FullyMigrated
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MigrationOutcome::FullyMigrated)
    }
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOutcome::FullyMigrated => f.write_str("完成"),
            MigrationOutcome::PartiallyMigrated { failed } => {
                write!(f, "部分完成（{} 条失败）", failed)
            }
            MigrationOutcome::SchemaUpdateFailed { error } => write!(f, "结构更新失败: {}", error),
            MigrationOutcome::Cancelled => f.write_str("已取消"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseOutcome {
    pub database_id: String,
    pub outcome: MigrationOutcome,
}

/// 多个数据库的结果汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub outcomes: Vec<DatabaseOutcome>,
}

impl MigrationSummary {
    pub fn push(&mut self, database_id: impl Into<String>, outcome: MigrationOutcome) {
        self.outcomes.push(DatabaseOutcome {
            database_id: database_id.into(),
            outcome,
        });
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_success()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.succeeded() < self.outcomes.len()
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| format!("  {}: {}", o.database_id, o.outcome))
            .collect();
        lines.push(format!(
            "共 {} 个数据库，{} 个完成",
            self.outcomes.len(),
            self.succeeded()
        ));
        lines.join("\n")
    }
}

// 数据库结构模块 - 结构模型、读取、差异比较和声明式目标结构

pub mod diff;
pub mod fetcher;
pub mod model;
pub mod target;

pub use diff::{diff_schemas, diff_with_direction, SchemaDiffReport, SchemaDifference, SyncDirection};
pub use fetcher::SchemaFetcher;
pub use model::{FieldType, Schema};
pub use target::{target_fields, target_schema, EntityKind};

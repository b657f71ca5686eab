// 迁移工具 - 结构追加迁移、字段改名数据迁移、调用节流和结果汇总

pub mod additive;
pub mod field_rename;
pub mod rate_limiter;
pub mod report;

pub use additive::{AdditiveMigrator, SchemaPlan};
pub use field_rename::{FieldMigrationStats, FieldRenameMigrator, RecordFailure, RenameTable};
pub use rate_limiter::RateLimiter;
pub use report::{DatabaseOutcome, MigrationOutcome, MigrationSummary};

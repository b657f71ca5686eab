// ledger-admin - 数据库结构比较与迁移命令行

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use time_ledger::event_bus::{AppEvent, EventBus};
use time_ledger::logger;
use time_ledger::migration::{
    AdditiveMigrator, FieldRenameMigrator, MigrationOutcome, MigrationSummary, RateLimiter,
    RenameTable, SchemaPlan,
};
use time_ledger::models::{AppConfig, DatabaseIds, TenantConfig};
use time_ledger::notion::client::normalize_id;
use time_ledger::notion::{InMemoryStore, NotionClient, RemoteStore};
use time_ledger::schema::{
    diff_schemas, target_fields, target_schema, EntityKind, SchemaDiffReport, SchemaFetcher,
    SyncDirection,
};
use time_ledger::settings::{self, SettingsManager};

#[derive(Parser)]
#[command(name = "ledger-admin")]
#[command(about = "时间账本数据库结构比较与迁移工具")]
struct Cli {
    /// Notion API 密钥
    #[arg(long, env = "NOTION_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 使用的租户（默认取配置中的第一个）
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// 先把相关数据库镜像到内存，只在内存中执行
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 比较两个数据库的结构
    Diff {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// a-to-b 以 source 为准，b-to-a 以 target 为准
        #[arg(long, default_value = "a-to-b")]
        direction: SyncDirection,
    },
    /// 比较数据库与声明的目标结构
    DiffDeclared {
        /// 不指定时使用租户配置中该实体的数据库
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        entity: EntityKind,
    },
    /// 把 source 有而 target 缺少的字段追加到每个 target
    MigrateSchema {
        #[arg(long)]
        source: String,
        #[arg(long, required = true, num_args = 1..)]
        target: Vec<String>,
    },
    /// 把旧字段的值复制到新字段名下
    MigrateFields {
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        entity: EntityKind,
    },
    /// 在父页面下按声明结构创建全部数据库
    CreateDatabases {
        #[arg(long)]
        parent: String,
    },
}

/// 命令执行时共享的上下文
struct CommandContext {
    remote: Arc<NotionClient>,
    tenant: TenantConfig,
    limiter: Arc<RateLimiter>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    dry_run: bool,
}

impl CommandContext {
    /// 演练模式下返回镜像后的内存存储
    async fn store(&self, database_ids: &[String]) -> Result<Arc<dyn RemoteStore>> {
        if !self.dry_run {
            let remote: Arc<dyn RemoteStore> = self.remote.clone();
            return Ok(remote);
        }
        let mirror = InMemoryStore::mirror(self.remote.as_ref(), database_ids, &self.limiter)
            .await
            .context("镜像远程数据库失败")?;
        Ok(Arc::new(mirror))
    }

    fn fetcher(&self, store: Arc<dyn RemoteStore>) -> SchemaFetcher {
        SchemaFetcher::new(store).with_limiter(self.limiter.clone())
    }

    fn database_for(&self, explicit: Option<&str>, entity: EntityKind) -> Result<String> {
        match explicit {
            Some(raw) => resolve_id(raw),
            None => {
                let id = self.tenant.databases.get(entity);
                if id.trim().is_empty() {
                    return Err(anyhow!(
                        "租户 {} 未配置 {} 数据库，请通过 --database 指定",
                        self.tenant.name,
                        entity
                    ));
                }
                Ok(id.to_string())
            }
        }
    }
}

fn resolve_id(raw: &str) -> Result<String> {
    normalize_id(raw).ok_or_else(|| anyhow!("无法识别的数据库/页面 ID: {}", raw))
}

fn print_report(report: &SchemaDiffReport) {
    println!("{} → {}", report.source_id, report.target_id);
    if report.is_converged() {
        println!("  结构一致");
        return;
    }
    for difference in &report.differences {
        println!("  {}", difference);
    }
    println!(
        "  共 {} 处差异（目标缺少 {}，源缺少 {}，类型不一致 {}）",
        report.differences.len(),
        report.missing_in_target().len(),
        report.missing_in_source().len(),
        report.type_mismatches().len()
    );
}

/// 订阅事件并打印实时统计
fn spawn_progress_printer(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AppEvent::MigrationProgress {
                    database_id,
                    processed,
                    total,
                    updated,
                    failed,
                }) => {
                    print!(
                        "\r[{}] {}/{} 更新 {} 失败 {}",
                        database_id, processed, total, updated, failed
                    );
                    if processed == total {
                        println!();
                    }
                    std::io::stdout().flush().ok();
                }
                Ok(AppEvent::SchemaUpdated { database_id, added }) => {
                    println!("[{}] 已追加字段: {}", database_id, added.join(", "));
                }
                Ok(AppEvent::SchemaUpdateFailed { database_id, error }) => {
                    println!("[{}] 结构更新失败: {}", database_id, error);
                }
                Ok(AppEvent::RecordMigrationFailed { page_id, error, .. }) => {
                    println!("\n  记录 {} 失败: {}", page_id, error);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("进度事件积压，丢弃 {} 条", n),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run_diff(
    ctx: &CommandContext,
    source: &str,
    target: &str,
    direction: SyncDirection,
) -> Result<()> {
    let (a, b) = (resolve_id(source)?, resolve_id(target)?);
    let store = ctx.store(&[a.clone(), b.clone()]).await?;
    let report = ctx.fetcher(store).compare(&a, &b, direction).await?;
    print_report(&report);
    Ok(())
}

async fn run_diff_declared(
    ctx: &CommandContext,
    database: Option<&str>,
    entity: EntityKind,
) -> Result<()> {
    let id = ctx.database_for(database, entity)?;
    let store = ctx.store(&[id.clone()]).await?;
    let live = ctx.fetcher(store).fetch_schema(&id).await?;
    let mut declared = target_schema(entity, &ctx.tenant.databases);
    declared.database_id = format!("声明结构:{}", entity);
    print_report(&diff_schemas(&declared, &live));
    Ok(())
}

async fn run_migrate_schema(
    ctx: &CommandContext,
    source: &str,
    targets: &[String],
) -> Result<()> {
    let source_id = resolve_id(source)?;
    let target_ids = targets
        .iter()
        .map(|t| resolve_id(t))
        .collect::<Result<Vec<_>>>()?;

    let mut involved = vec![source_id.clone()];
    involved.extend(target_ids.iter().cloned());
    let store = ctx.store(&involved).await?;

    let fetcher = ctx.fetcher(store.clone());
    let source_schema = fetcher.fetch_schema(&source_id).await?;

    // 读取失败的目标单独记为失败，其余照常迁移
    let mut summary = MigrationSummary::default();
    let mut plans = Vec::new();
    for target_id in &target_ids {
        match fetcher.fetch_schema(target_id).await {
            Ok(target) => {
                let report = diff_schemas(&source_schema, &target);
                print_report(&report);
                plans.push(SchemaPlan::from_report(&report));
            }
            Err(e) => summary.push(
                target_id,
                MigrationOutcome::SchemaUpdateFailed {
                    error: e.to_string(),
                },
            ),
        }
    }

    let migrator =
        AdditiveMigrator::new(store, ctx.limiter.clone()).with_events(ctx.events.clone());
    let results = migrator.migrate_all(&plans, &ctx.cancel).await;
    summary.outcomes.extend(results.outcomes);

    println!("{}", summary.render());
    Ok(())
}

async fn run_migrate_fields(
    ctx: &CommandContext,
    database: Option<&str>,
    entity: EntityKind,
) -> Result<()> {
    let id = ctx.database_for(database, entity)?;
    let table = RenameTable::default_table();
    let renames = table.for_kind(entity);
    if renames.is_empty() {
        println!("{} 没有需要迁移的字段", entity);
        return Ok(());
    }

    let store = ctx.store(&[id.clone()]).await?;
    let migrator =
        FieldRenameMigrator::new(store, ctx.limiter.clone()).with_events(ctx.events.clone());
    let stats = migrator.migrate(&id, renames, &ctx.cancel).await?;

    println!(
        "共 {} 条：更新 {}，跳过 {}，失败 {}，节流暂停 {} 次",
        stats.total, stats.updated, stats.skipped, stats.failed, stats.pauses
    );
    for failure in &stats.failures {
        println!(
            "  {} [{}]: {}",
            failure.page_id,
            failure.fields.join(", "),
            failure.error
        );
    }

    let mut summary = MigrationSummary::default();
    summary.push(&id, MigrationOutcome::from_stats(&stats));
    println!("{}", summary.render());
    Ok(())
}

async fn run_create_databases(
    ctx: &CommandContext,
    settings: &SettingsManager,
    parent: &str,
) -> Result<()> {
    let parent_id = resolve_id(parent)?;
    let store = ctx.store(&[]).await?;

    // 按依赖顺序创建，关联字段指向刚创建的数据库
    let mut ids = DatabaseIds::default();
    for kind in EntityKind::CREATION_ORDER {
        ctx.limiter.tick().await;
        let fields = target_fields(kind, &ids);
        let schema = store
            .create_database(&parent_id, kind.database_title(), &fields)
            .await
            .with_context(|| format!("创建 {} 数据库失败", kind))?;
        info!("已创建 {} 数据库: {}", kind, schema.database_id);
        println!("{:<14} {}", kind.key(), schema.database_id);
        ids.set(kind, schema.database_id);
    }

    if ctx.dry_run {
        println!("（演练模式，未保存到配置）");
        return Ok(());
    }
    settings
        .update(AppConfig {
            tenant: Some(TenantConfig {
                name: ctx.tenant.name.clone(),
                databases: ids,
            }),
            ..Default::default()
        })
        .await?;
    println!("数据库 ID 已写入租户 {} 的配置", ctx.tenant.name);
    Ok(())
}

async fn run(cli: Cli, settings: SettingsManager) -> Result<()> {
    let mut config = settings.get().await;
    if let Some(key) = cli.api_key.filter(|k| !k.trim().is_empty()) {
        config.notion.api_token = key;
    }

    let tenant = match cli.tenant.as_deref() {
        Some(name) => config
            .tenant(name)
            .cloned()
            .ok_or_else(|| anyhow!("配置中没有租户 {}", name))?,
        None => config.default_tenant().cloned().unwrap_or(TenantConfig {
            name: "default".to_string(),
            databases: DatabaseIds::default(),
        }),
    };

    let remote = Arc::new(NotionClient::new(config.notion.clone())?);

    let events = Arc::new(EventBus::default());
    let printer = spawn_progress_printer(&events);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，当前记录处理完后停止");
            trigger.cancel();
        }
    });

    let ctx = CommandContext {
        remote,
        tenant,
        limiter: Arc::new(RateLimiter::from_settings(&config.migration)),
        events,
        cancel,
        dry_run: cli.dry_run,
    };
    if ctx.dry_run {
        info!("演练模式：所有写入只作用于内存镜像");
    }

    let result = match &cli.command {
        Commands::Diff {
            source,
            target,
            direction,
        } => run_diff(&ctx, source, target, *direction).await,
        Commands::DiffDeclared { database, entity } => {
            run_diff_declared(&ctx, database.as_deref(), *entity).await
        }
        Commands::MigrateSchema { source, target } => {
            run_migrate_schema(&ctx, source, target).await
        }
        Commands::MigrateFields { database, entity } => {
            run_migrate_fields(&ctx, database.as_deref(), *entity).await
        }
        Commands::CreateDatabases { parent } => {
            run_create_databases(&ctx, &settings, parent).await
        }
    };

    // 释放事件发送端，打印任务处理完剩余事件后退出
    drop(ctx);
    if let Err(e) = printer.await {
        warn!("进度打印任务异常退出: {}", e);
    }
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(settings::default_config_path);
    let settings = match SettingsManager::new(config_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("加载配置失败: {:#}", e);
            std::process::exit(1);
        }
    };

    let level = settings.get().await.log_level;
    let _guard = match logger::init(&level, &logger::default_log_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("日志初始化失败: {}", e);
            None
        }
    };

    if let Err(e) = run(cli, settings).await {
        error!("执行失败: {:#}", e);
        eprintln!("错误: {:#}", e);
        std::process::exit(1);
    }
}

// 日志初始化 - 同时输出到控制台和按天轮转的日志文件

use std::path::{Path, PathBuf};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// 默认日志目录
pub fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    if cfg!(target_os = "macos") {
        PathBuf::from(home).join("Library/Logs/time-ledger")
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("time-ledger").join("logs")
    } else {
        PathBuf::from(home).join(".local/share/time-ledger/logs")
    }
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("time_ledger={level},ledger_admin={level}"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 构建过滤器：优先使用 RUST_LOG，否则使用配置的级别
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level))
}

/// 初始化日志系统
///
/// 返回的 guard 需要在整个程序生命周期内持有，否则文件日志会丢失尾部内容。
pub fn init(level: &str, log_dir: &Path) -> Result<WorkerGuard, SetGlobalDefaultError> {
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "ledger.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let writer = std::io::stdout.and(non_blocking);

    let timer = LocalTime::new(time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(writer)
        .with_timer(timer)
        .with_ansi(cfg!(debug_assertions))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    eprintln!("日志文件位置: {:?}", log_dir);
    Ok(guard)
}

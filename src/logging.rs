use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "agro_relay.log";

/// ログの出力先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// 標準エラー + 日次ローテーションファイル (HTTPサーバー)
    StderrAndFile,
    /// ファイルのみ (CLI: 標準出力/標準エラーを会話に使うため)
    FileOnly,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop, so keep it alive for the life of the process.
pub fn init(output: LogOutput) -> WorkerGuard {
    let file_appender = rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // ファイルにANSIカラー不要
        .with_target(true);

    let stderr_layer = match output {
        LogOutput::StderrAndFile => Some(fmt::layer().with_target(true).with_writer(std::io::stderr)),
        LogOutput::FileOnly => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

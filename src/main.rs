use agro_relay::{bootstrap, logging, web, RelayConfig};
use color_eyre::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // ログ: 標準エラーと logs/agro_relay.log の両方へ
    // guard はdropするとログが失われるため、main の終わりまで保持
    let _guard = logging::init(logging::LogOutput::StderrAndFile);

    // .env は RelayConfig::from_env の中で読み込む
    let config = RelayConfig::from_env()?;
    let relay = bootstrap::build_relay(&config)?;
    let app = web::router(web::AppState::with_limits(relay, bootstrap::store_limits(&config)));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;
    info!(target: "web", %addr, provider = config.model.provider.as_str(), model = %config.model.model, "server_listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!(target: "web", "server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // シグナルが取れない場合は停止要求を待たずに動き続ける
        tracing::error!(target: "web", error = %e, "ctrl_c_handler_failed");
        std::future::pending::<()>().await;
    }
    info!(target: "web", "shutdown_requested");
}

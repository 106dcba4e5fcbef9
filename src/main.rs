use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use parfor_worker::config::WorkerConfig;
use parfor_worker::worker::handlers::{
    handle_close, handle_configure, handle_execute, handle_registry,
};
use parfor_worker::worker::lifecycle::WorkerRuntime;
use parfor_worker::worker::protocol::*;
use parfor_worker::worker::service::WorkerService;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--scratch <dir>] [--durable <dir>] [--local] \
             [--no-reuse] [--stats] [--memory-budget <cells>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:7070 --durable /data/out", args[0]);
        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut config = WorkerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(value_of(&args, i)?.parse()?);
                i += 2;
            }
            "--scratch" => {
                config.scratch_dir = value_of(&args, i)?.into();
                i += 2;
            }
            "--durable" => {
                config.durable_dir = value_of(&args, i)?.into();
                i += 2;
            }
            "--memory-budget" => {
                config = config.with_memory_budget(value_of(&args, i)?.parse()?);
                i += 2;
            }
            "--local" => {
                config = config.with_local_mode(true);
                i += 1;
            }
            "--no-reuse" => {
                config = config.with_reuse(false);
                i += 1;
            }
            "--stats" => {
                config = config.with_statistics(true);
                i += 1;
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;

    tracing::info!(
        "Starting parfor worker on {} (reuse={}, local={}, stats={})",
        bind_addr,
        config.reuse_workers,
        config.local_mode,
        config.statistics
    );
    tracing::info!("Durable storage: {}", config.durable_dir.display());

    // 1. Process-wide runtime shared by every slot:
    let runtime = WorkerRuntime::new(config);
    let service = WorkerService::new(runtime);

    // 2. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_CONFIGURE, post(handle_configure))
        .route(ENDPOINT_EXECUTE, post(handle_execute))
        .route(ENDPOINT_CLOSE, post(handle_close))
        .route(ENDPOINT_REGISTRY, get(handle_registry))
        .layer(Extension(service.clone()));

    // 3. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    // 4. Close slots the scheduler left open:
    let closed = service.close_all().await;
    tracing::info!("Shutdown complete ({} open slots closed)", closed);

    Ok(())
}

fn value_of(args: &[String], i: usize) -> anyhow::Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("{} expects a value", args[i]))
}

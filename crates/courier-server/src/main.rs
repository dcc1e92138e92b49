use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use courier_db::Database;
use courier_gateway::{Gateway, Notifier, Shutdown, Supervisor, TerminalBell, TracingNotifier};
use courier_server::app;
use courier_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let addr = config.addr()?;

    let db = Database::open(&config.db_path)?;
    info!("Store opened at {}", config.db_path.display());

    let notifier: Arc<dyn Notifier> = if config.bell {
        Arc::new(TerminalBell)
    } else {
        Arc::new(TracingNotifier)
    };
    let gateway = Gateway::new(Arc::new(db), notifier);
    let supervisor = Supervisor::new(gateway.clone(), config.supervisor());

    let router = app::router(gateway);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Courier relay listening on {}", addr);

    let server = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .into_future();

    tokio::select! {
        result = server => result?,
        shutdown = supervisor.run() => match shutdown {
            Shutdown::StoreUnreachable => {
                error!("Store unreachable, shutting down");
                std::process::exit(1);
            }
        },
        _ = shutdown_signal() => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

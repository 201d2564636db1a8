use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use maps_harvest::core::config::load_harvest_config;
use maps_harvest::scraping::chromium::ChromiumLauncher;
use maps_harvest::scraping::Locators;
use maps_harvest::{api, AppState};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting maps-harvest job server");

    let config = load_harvest_config();
    let port = parse_port_from_args().unwrap_or_else(|| config.server.resolve_port());

    let launcher = ChromiumLauncher::new_auto(Locators::default().results_panel)
        .context("No Chromium-family browser found. Install Chrome/Chromium or set CHROME_EXECUTABLE.")?;

    let state = Arc::new(AppState::new(config, Arc::new(launcher)));
    info!("{:?}", state);

    let app = api::router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/HARVEST_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("Job server listening on http://{}", bind_addr);
    info!("  POST /api/search             start a search");
    info!("  GET  /api/search/{{id}}/status  search status");
    info!("  GET  /api/search/{{id}}/results search results");
    info!("  GET  /health                 health check");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    let cancelled = state.jobs.cancel_all();
    if cancelled > 0 {
        warn!("Shutdown: cancelled {} unfinished searches", cancelled);
    }
}

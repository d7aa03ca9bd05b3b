use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

use shepherd::config::{level_filter, Settings};
use shepherd::{api, vault, AppState};

#[tokio::main]
async fn main() {
    let settings = Settings::parse();

    let filter = EnvFilter::new(level_filter(&settings.log_level));
    let (filter_layer, reload_handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut state = match AppState::new(settings.clone()) {
        Ok(s) => s,
        Err(e) => {
            error!("FATAL: can't initialize service core: {}", e);
            std::process::exit(1);
        }
    };
    state.log_reload = Some(reload_handle);

    {
        let params = state.params.read().unwrap();
        info!("shepherd UUID:    {}", params.uuid);
        info!("HTTP listen port: {}", params.http_listen_port);
        info!("HTTP retries:     {}", params.http_retries);
        info!("HTTP timeout:     {}s", params.http_timeout);
        info!("Log level:        {}", params.log_level);
        info!("Task mode local:  {}", params.local_mode);
        info!("Broker URL:       '{}'", params.broker_url);
        info!("State mgr URL:    '{}'", params.smd_url);
        info!("Store enabled:    {}", params.vault_enable);
        info!("Store keypath:    '{}'", settings.vault_keypath);
        info!("CA bundle URI:    '{}'", settings.ca_uri);
    }

    if settings.vault_enable {
        tokio::spawn(vault::setup_store(state.clone()));
    }
    tokio::spawn(Arc::clone(&state.trust).run());

    let app = api::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http_listen_port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("FATAL: HTTP server listen on {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("starting up HTTP server on {}", addr);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("FATAL: HTTP server failed: {}", e);
        std::process::exit(1);
    }

    info!("HTTP server shutdown, idle connections closed; exiting");
}

/// Resolve on SIGINT or SIGTERM; axum then drains in-flight requests.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("can't install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = term.recv() => {},
    }
    info!("shutdown signal received, draining HTTP server");
}

//! `tollgate` binary: serves the health checks and a JWT-protected
//! `GET /whoami` that echoes the caller's claims.

use anyhow::Context as _;
use axum::routing::get;
use clap::Parser;
use tollgate_server::network::handlers::claims_handler;
use tollgate_server::{Application, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::parse();
    let app = Application::new(config).context("invalid configuration")?;

    tracing::dispatcher::set_global_default(app.log().dispatch().clone())
        .context("a global tracing subscriber is already installed")?;

    let whoami = get(claims_handler);
    let whoami = match app.jwt() {
        Some(jwt) => whoami.route_layer(jwt),
        None => {
            app.log()
                .warn("JWT is disabled; /whoami is served without authentication");
            whoami
        }
    };

    let mut app = app.route("/whoami", whoami);
    if let Some(limit) = app.config().rate_limit_config() {
        app = app
            .with_rate_limit(limit)
            .context("invalid rate limit")?;
    }

    app.run(shutdown_signal()).await
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}

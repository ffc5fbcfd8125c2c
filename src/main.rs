mod admin;
mod error;
mod meta;
mod payments;
mod serve;
mod snapshot;
mod state;
mod store;

use anyhow::Context;
use axum::{Router, http::StatusCode, routing::get};
use clap::Parser;
use state::AppState;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use store::PageStore;
use tokio::sync::RwLock;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "cms-server",
    about = "Serve a static site with a page-management admin API"
)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Path to the site root directory holding the HTML pages.
    /// Defaults to a `site` directory adjacent to the server binary.
    #[arg(long, env = "SITE_ROOT")]
    root: Option<PathBuf>,

    /// Admin API username. If unset, the admin API is disabled.
    #[arg(long, env = "ADMIN_USERNAME")]
    admin_username: Option<String>,

    /// Admin API password. If unset, the admin API is disabled.
    #[arg(long, env = "ADMIN_PASSWORD")]
    admin_password: Option<String>,

    /// Stripe secret key. If unset, the payment-intent endpoint is disabled.
    #[arg(long, env = "STRIPE_SECRET_KEY")]
    stripe_secret_key: Option<String>,

    /// Settlement currency for payment intents.
    #[arg(long, env = "CURRENCY", default_value = "usd")]
    currency: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cms_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present (silently ignored if absent).
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let site_root = match args.root {
        Some(path) => path,
        None => {
            let exe = std::env::current_exe().context("Cannot determine binary path")?;
            exe.parent()
                .context("Binary has no parent directory")?
                .join("site")
        }
    };

    tracing::info!("site root: {}", site_root.display());
    if !site_root.exists() {
        tracing::warn!("site root does not exist yet: {}", site_root.display());
    }

    // Resolve symlinks in site_root for security comparisons at request time.
    // Falls back to the lexical path if the directory doesn't exist yet.
    let canonical_root = tokio::fs::canonicalize(&site_root)
        .await
        .unwrap_or_else(|_| site_root.clone());

    let verifier: Option<Arc<dyn admin::CredentialVerifier>> =
        match (args.admin_username, args.admin_password) {
            (Some(u), Some(p)) => {
                tracing::info!("Admin API enabled at /admin-api");
                Some(Arc::new(admin::StaticCredentials::new(u, p)))
            }
            _ => {
                tracing::info!("Admin API disabled (ADMIN_USERNAME/ADMIN_PASSWORD not set)");
                None
            }
        };

    let payments = match args.stripe_secret_key {
        Some(key) => {
            tracing::info!("Payment bridge enabled at /api/create-payment-intent");
            Some(payments::PaymentConfig::new(key, args.currency))
        }
        None => {
            tracing::info!("Payment bridge disabled (STRIPE_SECRET_KEY not set)");
            None
        }
    };

    let state = AppState {
        store: PageStore::new(site_root.clone()),
        site_root,
        canonical_root,
        sessions: Arc::new(RwLock::new(HashMap::new())),
        verifier,
        payments,
    };

    // CatchPanicLayer is outermost so it recovers from panics anywhere in the stack.
    let mut app = Router::new().route("/healthz", get(|| async { StatusCode::OK }));
    if state.verifier.is_some() {
        app = app.merge(admin::router());
    }
    if state.payments.is_some() {
        app = app.merge(payments::router());
    }
    let app = app
        .fallback(serve::handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind to {addr}"))?;

    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result { tracing::error!("ctrl-c error: {}", e); }
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
    tracing::info!("Shutting down gracefully");
}

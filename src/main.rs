use anyhow::{anyhow, Context, Result};
use credbroker::api::{create_integration_router, middleware, IntegrationAppState};
use credbroker::config::{self, ProviderConfig};
use credbroker::integrations;
use credbroker::lifecycle::CredentialManager;
use credbroker::oauth::OAuthProvider;
use credbroker::store::{self, run_expiry_sweep};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn init_tracing() {
    // RUST_LOG wins; LOG_LEVEL is accepted as a plain level fallback
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());
        format!("credbroker={},tower_http={}", level, level).into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Credential broker starting...");

    let config = config::load_from_env().context("Failed to load configuration")?;

    info!(
        bind_addr = %config.server.bind_addr,
        store_backend = ?config.store.backend,
        providers = ?config.oauth.providers,
        "Configuration loaded"
    );

    let store = store::open(&config.store)?;
    info!("Store initialized");

    // Every enabled provider must be fully configured before we serve anything
    let mut managers = Vec::new();
    for name in &config.oauth.providers {
        let descriptor = integrations::descriptor(name)
            .ok_or_else(|| anyhow!("Unknown provider '{}' in configuration", name))?;
        let provider_config = ProviderConfig::from_env(name)
            .with_context(|| format!("Provider '{}' is not configured", name))?;
        let adapter = OAuthProvider::new(descriptor, provider_config)?;

        managers.push(
            CredentialManager::new(Arc::new(adapter), Arc::clone(&store))
                .with_state_ttl(Duration::from_secs(config.oauth.state_ttl_seconds))
                .with_refresh_margin(config.oauth.refresh_margin_seconds),
        );
        info!(provider = %name, "Provider enabled");
    }

    tokio::spawn(run_expiry_sweep(
        Arc::clone(&store),
        config.store.sweep_interval_seconds,
    ));

    let router = create_integration_router(IntegrationAppState::new(managers));
    let app = middleware::apply(router, &config.server)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Credential broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    info!("Credential broker stopped");
    Ok(())
}

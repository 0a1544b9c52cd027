//! HTTP server facade for Shelf with Axum, error handling, and OpenAPI support.

use anyhow::Context;
use axum::{routing::get, Router};
use shelf_authz::{AccessPolicy, Authenticator, Guard};
use shelf_kernel::settings::{AuthSettings, Settings};
use shelf_kernel::ModuleRegistry;

pub mod error;
pub mod router;

use router::RouterBuilder;

/// Start the HTTP server and serve until Ctrl-C
pub async fn start_server(registry: &ModuleRegistry, settings: &Settings) -> anyhow::Result<()> {
    let address = settings.server.bind_address();
    tracing::info!("starting HTTP server on {}", address);

    let app = build_router(registry, settings);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind to {}", address))?;

    tracing::info!("HTTP server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Build the main HTTP router with all module routes mounted
pub fn build_router(registry: &ModuleRegistry, settings: &Settings) -> Router {
    let mut router_builder = RouterBuilder::new().route("/healthz", get(health_check));

    for module in registry.modules() {
        let module_name = module.name();
        tracing::info!(
            module = module_name,
            "mounting module routes under /api/{}",
            module_name
        );
        router_builder = router_builder.mount_module(module_name, module.routes());
    }

    router_builder = router_builder.with_openapi(registry);

    if let Some(guard) = guard(&settings.auth, registry) {
        router_builder = router_builder.with_auth(guard);
    } else {
        tracing::warn!("authentication disabled; every route is public");
    }

    // Request id goes on last so it is the outermost layer and the trace
    // span can read it.
    router_builder
        .with_timeout(settings.server.request_timeout_ms)
        .with_cors()
        .with_tracing()
        .with_request_id()
        .build()
}

/// Guard for the configured user, or `None` when auth is switched off
pub fn guard(auth: &AuthSettings, registry: &ModuleRegistry) -> Option<Guard> {
    if !auth.enabled {
        return None;
    }

    let mut policy = AccessPolicy::new()
        .permit("GET", "/healthz")
        .permit("GET", "/docs/openapi.json")
        .permit_prefix("/swagger-ui")
        .permit_prefix("/api-docs");

    for module in registry.modules() {
        for (method, path) in module.public_routes() {
            let full_path = if path == "/" {
                format!("/api/{}", module.name())
            } else {
                format!("/api/{}{}", module.name(), path)
            };
            policy = policy.permit(method, &full_path);
        }
    }

    Some(Guard::new(
        Authenticator::new(auth.username.clone(), auth.password.clone()),
        policy,
    ))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

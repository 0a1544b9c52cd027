pub mod catalog;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use axum::Router;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use shelf_kernel::settings::CatalogSettings;
use shelf_kernel::{InitCtx, Migration, Module};
use shelf_resilience::{BreakerConfig, Policy, RetryConfig};
use tokio::task::JoinHandle;

use catalog::GoogleBooksClient;
use repository::SqlBookRepository;
use service::BookService;

/// Book catalog: local CRUD plus import from the external catalog
pub struct BooksModule {
    service: OnceCell<Arc<BookService>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BooksModule {
    pub fn new() -> Self {
        Self {
            service: OnceCell::new(),
            listener: Mutex::new(None),
        }
    }

    /// Module with a prebuilt service; `init` keeps it instead of wiring one.
    pub fn with_service(service: Arc<BookService>) -> Self {
        Self {
            service: OnceCell::with_value(service),
            listener: Mutex::new(None),
        }
    }

    pub fn service(&self) -> Option<&Arc<BookService>> {
        self.service.get()
    }
}

impl Default for BooksModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-call budget for the catalog, capped at nine tenths of the server's
/// request timeout so the placeholder is returned before the request is cut.
fn catalog_deadline(settings: &CatalogSettings, request_timeout_ms: u64) -> Duration {
    let ceiling = request_timeout_ms.saturating_mul(9) / 10;
    if settings.deadline_ms > ceiling {
        tracing::warn!(
            deadline_ms = settings.deadline_ms,
            request_timeout_ms,
            "catalog deadline exceeds the request timeout, clamping"
        );
    }
    Duration::from_millis(settings.deadline_ms.min(ceiling).max(1))
}

fn catalog_policy(settings: &CatalogSettings, request_timeout_ms: u64) -> Policy {
    Policy::new(
        "google-books",
        RetryConfig {
            max_attempts: settings.retry.max_attempts,
            initial_backoff: Duration::from_millis(settings.retry.wait_ms),
            multiplier: settings.retry.multiplier,
            max_backoff: Duration::from_millis(settings.retry.max_wait_ms),
        },
        BreakerConfig {
            failure_threshold: settings.breaker.failure_threshold,
            open_duration: Duration::from_millis(settings.breaker.open_ms),
        },
    )
    .with_deadline(catalog_deadline(settings, request_timeout_ms))
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if self.service.get().is_some() {
            tracing::debug!(module = self.name(), "books service supplied up front");
            return Ok(());
        }

        let catalog_settings = &ctx.settings.catalog;
        let catalog = GoogleBooksClient::new(catalog_settings)
            .context("failed to build external catalog client")?;

        let service = BookService::new(
            Arc::new(SqlBookRepository::new(ctx.db.clone())),
            Arc::new(ctx.events.clone()),
            Arc::new(catalog),
            catalog_policy(catalog_settings, ctx.settings.server.request_timeout_ms),
            ctx.settings.events.topic.clone(),
        );
        self.service
            .set(Arc::new(service))
            .map_err(|_| anyhow!("books module initialized twice"))?;

        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            catalog = %catalog_settings.base_url,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        match self.service.get() {
            Some(service) => routes::router(service.clone()),
            None => {
                tracing::warn!(module = self.name(), "routes requested before init");
                Router::new()
            }
        }
    }

    fn public_routes(&self) -> Vec<(&'static str, &'static str)> {
        vec![("GET", "/"), ("GET", "/health")]
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE IF NOT EXISTS books (
                    id             INTEGER PRIMARY KEY AUTOINCREMENT,
                    title          TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 100),
                    author         TEXT NOT NULL CHECK (length(author) BETWEEN 1 AND 100),
                    published_date TEXT NOT NULL
                );
                "#,
        }]
    }

    async fn start(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if ctx.events.is_enabled() {
            let topic = ctx.settings.events.topic.clone();
            tracing::info!(module = self.name(), %topic, "listening for book notifications");
            *self.listener.lock() = Some(ctx.events.spawn_listener(topic));
        }
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn json_response(description: &str, schema: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

fn openapi_fragment() -> serde_json::Value {
    let book = serde_json::json!({ "$ref": "#/components/schemas/Book" });
    let book_request = serde_json::json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/BookRequest" }
            }
        }
    });
    let id_param = serde_json::json!([{
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64" }
    }]);
    let secured = serde_json::json!([{ "basicAuth": [] }]);

    serde_json::json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "responses": {
                        "200": json_response("All books", serde_json::json!({ "type": "array", "items": book }))
                    }
                },
                "post": {
                    "summary": "Add a book",
                    "tags": ["Books"],
                    "security": secured,
                    "requestBody": book_request,
                    "responses": {
                        "201": json_response("Book created", book.clone()),
                        "400": error_response("Validation error"),
                        "401": error_response("Missing or invalid credentials")
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Fetch a book",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": id_param,
                    "responses": {
                        "200": json_response("The book", book.clone()),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Replace a book's fields",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": id_param,
                    "requestBody": book_request,
                    "responses": {
                        "200": json_response("Updated book", book.clone()),
                        "400": error_response("Validation error"),
                        "404": error_response("Book not found")
                    }
                },
                "delete": {
                    "summary": "Remove a book",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": id_param,
                    "responses": {
                        "200": json_response("Book removed", serde_json::json!({
                            "type": "object",
                            "properties": { "message": { "type": "string" } }
                        })),
                        "404": error_response("Book not found")
                    }
                }
            },
            "/search": {
                "get": {
                    "summary": "Search the external catalog by title",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": [{
                        "name": "title",
                        "in": "query",
                        "required": true,
                        "schema": { "type": "string" }
                    }],
                    "responses": {
                        "200": json_response("Matching volumes, or a single placeholder", serde_json::json!({
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/ExternalBook" }
                        })),
                        "400": error_response("Blank title")
                    }
                }
            },
            "/addViaAPI": {
                "post": {
                    "summary": "Import a volume from the external catalog",
                    "tags": ["Books"],
                    "security": secured,
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": { "id": { "type": "string" } },
                                    "required": ["id"]
                                }
                            }
                        }
                    },
                    "responses": {
                        "201": json_response("Imported book", book),
                        "200": json_response("Catalog unavailable placeholder", serde_json::json!({
                            "$ref": "#/components/schemas/PlaceholderBook"
                        })),
                        "404": error_response("Volume not found")
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Books health check",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "OK",
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "publishedDate": { "type": "string", "format": "date" }
                    },
                    "required": ["id", "title", "author", "publishedDate"]
                },
                "BookRequest": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "minLength": 1, "maxLength": 100 },
                        "author": { "type": "string", "minLength": 1, "maxLength": 100 },
                        "publishedDate": { "type": "string", "format": "date" }
                    },
                    "required": ["title", "author", "publishedDate"]
                },
                "ExternalBook": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "title": { "type": "string" },
                        "authors": { "type": "array", "items": { "type": "string" } },
                        "publishedDate": { "type": ["string", "null"], "format": "date" }
                    }
                },
                "PlaceholderBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "publishedDate": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
}

/// Create a new instance of the books module
pub fn create_module() -> Arc<dyn Module> {
    Arc::new(BooksModule::new())
}

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use shelf_http::error::AppError;

use super::models::{BookId, BookRequest, BookResponse, ExternalBook, ImportOutcome, ImportRequest};
use super::service::BookService;

type BookState = State<Arc<BookService>>;

/// Routes relative to the module mount point.
pub fn router(service: Arc<BookService>) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/health", get(health_check))
        .route("/search", get(search_books))
        .route("/addViaAPI", post(import_book))
        .route("/{id}", get(get_book).put(update_book).delete(delete_book))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub title: Option<String>,
}

async fn health_check() -> &'static str {
    "books module is healthy"
}

async fn list_books(State(service): BookState) -> Result<Json<Vec<BookResponse>>, AppError> {
    Ok(Json(service.list().await?))
}

async fn get_book(
    State(service): BookState,
    id: Result<Path<BookId>, PathRejection>,
) -> Result<Json<BookResponse>, AppError> {
    let Path(id) = id.map_err(|err| AppError::bad_request(err.body_text()))?;
    Ok(Json(service.get(id).await?))
}

async fn create_book(
    State(service): BookState,
    body: Result<Json<BookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let Json(request) = body.map_err(|err| AppError::bad_request(err.body_text()))?;
    let book = service.add(request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(service): BookState,
    id: Result<Path<BookId>, PathRejection>,
    body: Result<Json<BookRequest>, JsonRejection>,
) -> Result<Json<BookResponse>, AppError> {
    let Path(id) = id.map_err(|err| AppError::bad_request(err.body_text()))?;
    let Json(request) = body.map_err(|err| AppError::bad_request(err.body_text()))?;
    Ok(Json(service.update(id, request).await?))
}

async fn delete_book(
    State(service): BookState,
    id: Result<Path<BookId>, PathRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Path(id) = id.map_err(|err| AppError::bad_request(err.body_text()))?;
    service.delete(id).await?;
    Ok(Json(json!({ "message": "Book removed" })))
}

async fn search_books(
    State(service): BookState,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<ExternalBook>>, AppError> {
    let Query(params) = params.map_err(|err| AppError::bad_request(err.body_text()))?;
    let title = params
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| AppError::bad_request("query parameter 'title' must not be blank"))?;

    Ok(Json(service.search(title).await))
}

async fn import_book(
    State(service): BookState,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|err| AppError::bad_request(err.body_text()))?;
    let volume_id = request.volume_id();
    if volume_id.is_empty() {
        return Err(AppError::bad_request("field 'id' must not be blank"));
    }

    let response = match service.import(volume_id).await? {
        ImportOutcome::Imported(book) => (StatusCode::CREATED, Json(book)).into_response(),
        ImportOutcome::Unavailable(placeholder) => (StatusCode::OK, Json(placeholder)).into_response(),
    };
    Ok(response)
}

use std::sync::Arc;

use serde_json::json;
use shelf_events::Publisher;
use shelf_http::error::AppError;
use shelf_resilience::{Policy, ResilienceError};

use super::catalog::{BookCatalog, CatalogError};
use super::models::{
    Book, BookId, BookRequest, BookResponse, ExternalBook, FieldError, ImportOutcome,
    PlaceholderBook,
};
use super::repository::{BookRepository, RepositoryError};

#[derive(thiserror::Error, Debug)]
pub enum BookError {
    #[error("Book with ID {0} not found")]
    NotFound(BookId),

    #[error("invalid book: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("No book found for id: {0}")]
    VolumeNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<BookError> for AppError {
    fn from(err: BookError) -> Self {
        let message = err.to_string();
        match err {
            BookError::NotFound(_) | BookError::VolumeNotFound(_) => AppError::not_found(message),
            BookError::Validation(errors) => {
                let details = errors
                    .iter()
                    .map(|e| json!({ "field": e.field, "error": e.message }))
                    .collect();
                AppError::validation(details, join_fields(&errors))
            }
            BookError::Repository(source) => AppError::Internal(source.into()),
        }
    }
}

/// Catalog operations shared by every books route.
pub struct BookService {
    repository: Arc<dyn BookRepository>,
    publisher: Arc<dyn Publisher>,
    catalog: Arc<dyn BookCatalog>,
    policy: Policy,
    topic: String,
}

impl BookService {
    pub fn new(
        repository: Arc<dyn BookRepository>,
        publisher: Arc<dyn Publisher>,
        catalog: Arc<dyn BookCatalog>,
        policy: Policy,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            publisher,
            catalog,
            policy,
            topic: topic.into(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub async fn list(&self) -> Result<Vec<BookResponse>, BookError> {
        let books = self.repository.find_all().await?;
        Ok(books.into_iter().map(BookResponse::from).collect())
    }

    pub async fn get(&self, id: BookId) -> Result<BookResponse, BookError> {
        self.repository
            .find_by_id(id)
            .await?
            .map(BookResponse::from)
            .ok_or(BookError::NotFound(id))
    }

    /// Validate, persist, then announce the new book.
    pub async fn add(&self, request: BookRequest) -> Result<BookResponse, BookError> {
        let book = request.into_new_book().map_err(BookError::Validation)?;
        let saved = self.repository.insert(book).await?;

        tracing::info!(book_id = saved.id, title = %saved.title, "book added");
        metrics::counter!("books_added_total").increment(1);
        self.notify(&saved);

        Ok(saved.into())
    }

    pub async fn update(&self, id: BookId, request: BookRequest) -> Result<BookResponse, BookError> {
        let book = request.into_new_book().map_err(BookError::Validation)?;
        let updated = self
            .repository
            .update(id, book)
            .await?
            .ok_or(BookError::NotFound(id))?;

        tracing::info!(book_id = id, "book updated");
        Ok(updated.into())
    }

    pub async fn delete(&self, id: BookId) -> Result<(), BookError> {
        if !self.repository.delete(id).await? {
            return Err(BookError::NotFound(id));
        }
        tracing::info!(book_id = id, "book removed");
        Ok(())
    }

    /// Search the external catalog; any failure yields the single placeholder.
    pub async fn search(&self, title: &str) -> Vec<ExternalBook> {
        let catalog = &self.catalog;
        match self.policy.call(|| catalog.search(title)).await {
            Ok(books) => books,
            Err(err) => {
                tracing::warn!(%title, error = %err, "external search failed, serving placeholder");
                vec![ExternalBook::unavailable()]
            }
        }
    }

    /// Copy one catalog volume into the local store.
    pub async fn import(&self, volume_id: &str) -> Result<ImportOutcome, BookError> {
        let catalog = &self.catalog;
        let volume = match self.policy.call(|| catalog.volume(volume_id)).await {
            Ok(volume) => volume,
            Err(ResilienceError::Rejected(CatalogError::NotFound(id))) => {
                return Err(BookError::VolumeNotFound(id));
            }
            Err(err) => {
                tracing::warn!(volume = %volume_id, error = %err, "external import failed, serving placeholder");
                return Ok(ImportOutcome::Unavailable(PlaceholderBook::unavailable()));
            }
        };

        let Some(published_date) = volume.published_date else {
            tracing::warn!(volume = %volume_id, "volume has no publication date");
            return Ok(ImportOutcome::Unavailable(PlaceholderBook::unavailable()));
        };
        let author = volume
            .authors
            .into_iter()
            .next()
            .unwrap_or_else(|| "Unknown".to_string());

        let request = BookRequest::new(volume.title, author, published_date);
        self.add(request).await.map(ImportOutcome::Imported)
    }

    fn notify(&self, book: &Book) {
        let message = format!("New Book Added: {} by {}", book.title, book.author);
        if let Err(err) = self.publisher.publish(&self.topic, message) {
            tracing::warn!(book_id = book.id, error = %err, "failed to publish book notification");
        }
    }
}

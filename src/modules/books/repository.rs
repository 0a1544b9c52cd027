use std::collections::BTreeMap;

use parking_lot::Mutex;
use sqlx::SqlitePool;

use super::models::{Book, BookId, NewBook};

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage seam for book records.
#[async_trait::async_trait]
pub trait BookRepository: Send + Sync {
    /// All books ordered by id
    async fn find_all(&self) -> Result<Vec<Book>, RepositoryError>;
    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, RepositoryError>;
    /// Inserts a book; the store assigns the id
    async fn insert(&self, book: NewBook) -> Result<Book, RepositoryError>;
    /// Overwrites every mutable field; `None` when the id does not exist
    async fn update(&self, id: BookId, book: NewBook) -> Result<Option<Book>, RepositoryError>;
    /// Returns false when there was nothing to delete
    async fn delete(&self, id: BookId) -> Result<bool, RepositoryError>;
}

/// SQLite-backed repository over the `books` table.
#[derive(Debug, Clone)]
pub struct SqlBookRepository {
    pool: SqlitePool,
}

impl SqlBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BookRepository for SqlBookRepository {
    async fn find_all(&self) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, published_date FROM books ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, RepositoryError> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, published_date FROM books WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn insert(&self, book: NewBook) -> Result<Book, RepositoryError> {
        let saved = sqlx::query_as::<_, Book>(
            "INSERT INTO books (title, author, published_date) VALUES (?, ?, ?) \
             RETURNING id, title, author, published_date",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.published_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn update(&self, id: BookId, book: NewBook) -> Result<Option<Book>, RepositoryError> {
        let updated = sqlx::query_as::<_, Book>(
            "UPDATE books SET title = ?, author = ?, published_date = ? WHERE id = ? \
             RETURNING id, title, author, published_date",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.published_date)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: BookId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Map-backed repository with the same sequential id semantics.
#[derive(Debug, Default)]
pub struct InMemoryBookRepository {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    books: BTreeMap<BookId, Book>,
    last_id: BookId,
}

impl InMemoryBookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn find_all(&self) -> Result<Vec<Book>, RepositoryError> {
        Ok(self.state.lock().books.values().cloned().collect())
    }

    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, RepositoryError> {
        Ok(self.state.lock().books.get(&id).cloned())
    }

    async fn insert(&self, book: NewBook) -> Result<Book, RepositoryError> {
        let mut state = self.state.lock();
        state.last_id += 1;
        let saved = Book {
            id: state.last_id,
            title: book.title,
            author: book.author,
            published_date: book.published_date,
        };
        state.books.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update(&self, id: BookId, book: NewBook) -> Result<Option<Book>, RepositoryError> {
        let mut state = self.state.lock();
        Ok(state.books.get_mut(&id).map(|existing| {
            existing.title = book.title;
            existing.author = book.author;
            existing.published_date = book.published_date;
            existing.clone()
        }))
    }

    async fn delete(&self, id: BookId) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().books.remove(&id).is_some())
    }
}

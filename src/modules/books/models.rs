use garde::Validate;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

pub type BookId = i64;

/// Title shown in place of real results while the external catalog is down.
pub const UNAVAILABLE_TITLE: &str = "Google Books API is currently unavailable";

/// A persisted book row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub published_date: Date,
}

/// Validated field set written by inserts and updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published_date: Date,
}

/// Body accepted by create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[garde(required, length(chars, min = 1, max = 100))]
    pub title: Option<String>,
    #[garde(required, length(chars, min = 1, max = 100))]
    pub author: Option<String>,
    #[garde(required, custom(not_in_future))]
    pub published_date: Option<Date>,
}

impl BookRequest {
    pub fn new(title: impl Into<String>, author: impl Into<String>, published_date: Date) -> Self {
        Self {
            title: Some(title.into()),
            author: Some(author.into()),
            published_date: Some(published_date),
        }
    }

    /// Run field validation and hand back the persistable field set.
    pub fn into_new_book(self) -> Result<NewBook, Vec<FieldError>> {
        if let Err(report) = self.validate() {
            return Err(report
                .iter()
                .map(|(path, error)| FieldError {
                    field: path.to_string(),
                    message: error.to_string(),
                })
                .collect());
        }

        match (self.title, self.author, self.published_date) {
            (Some(title), Some(author), Some(published_date)) => Ok(NewBook {
                title,
                author,
                published_date,
            }),
            _ => Err(vec![FieldError {
                field: "body".to_string(),
                message: "title, author and publishedDate are required".to_string(),
            }]),
        }
    }
}

fn not_in_future(value: &Option<Date>, _ctx: &()) -> garde::Result {
    match value {
        Some(date) if *date > OffsetDateTime::now_utc().date() => {
            Err(garde::Error::new("must not be in the future"))
        }
        _ => Ok(()),
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Book as returned by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub published_date: Date,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            published_date: book.published_date,
        }
    }
}

/// Volume metadata as reported by the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalBook {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<Date>,
}

impl ExternalBook {
    /// Stand-in search result while the catalog cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            id: "N/A".to_string(),
            title: UNAVAILABLE_TITLE.to_string(),
            authors: vec!["N/A".to_string()],
            published_date: None,
        }
    }
}

/// Body of the import endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub id: String,
}

impl ImportRequest {
    /// Volume id with surrounding double quotes removed.
    pub fn volume_id(&self) -> &str {
        self.id.trim().trim_matches('"')
    }
}

/// Unsaved book returned by the import endpoint while the catalog is down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderBook {
    pub title: String,
    pub author: String,
    pub published_date: Option<Date>,
}

impl PlaceholderBook {
    pub fn unavailable() -> Self {
        Self {
            title: UNAVAILABLE_TITLE.to_string(),
            author: "no author".to_string(),
            published_date: None,
        }
    }
}

/// Result of importing a volume from the external catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(BookResponse),
    Unavailable(PlaceholderBook),
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn valid_request_converts() {
        let book = BookRequest::new("Dune", "Frank Herbert", date!(1965 - 08 - 01))
            .into_new_book()
            .unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.published_date, date!(1965 - 08 - 01));
    }

    #[test]
    fn empty_title_and_author_are_rejected_per_field() {
        let errors = BookRequest::new("", "", date!(2001 - 01 - 01))
            .into_new_book()
            .unwrap_err();
        let mut names = fields(&errors);
        names.sort();
        assert_eq!(names, vec!["author", "title"]);
    }

    #[test]
    fn overlong_title_is_rejected() {
        let errors = BookRequest::new("x".repeat(101), "Author", date!(2001 - 01 - 01))
            .into_new_book()
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["title"]);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let title = "日".repeat(40);
        assert!(title.len() > 100);
        let book = BookRequest::new(title.clone(), "村上春樹", date!(1987 - 09 - 04))
            .into_new_book()
            .unwrap();
        assert_eq!(book.title, title);

        let errors = BookRequest::new("日".repeat(101), "村上春樹", date!(1987 - 09 - 04))
            .into_new_book()
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["title"]);
    }

    #[test]
    fn future_date_is_rejected() {
        let tomorrow = OffsetDateTime::now_utc().date() + time::Duration::days(30);
        let errors = BookRequest::new("Title", "Author", tomorrow)
            .into_new_book()
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["published_date"]);
        assert_eq!(errors[0].message, "must not be in the future");
    }

    #[test]
    fn missing_fields_are_reported() {
        let errors = BookRequest::default().into_new_book().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn request_json_uses_camel_case_dates() {
        let request: BookRequest = serde_json::from_str(
            r#"{"title":"Emma","author":"Jane Austen","publishedDate":"1815-12-23"}"#,
        )
        .unwrap();
        assert_eq!(request.published_date, Some(date!(1815 - 12 - 23)));

        let response = BookResponse {
            id: 1,
            title: "Emma".to_string(),
            author: "Jane Austen".to_string(),
            published_date: date!(1815 - 12 - 23),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["publishedDate"], "1815-12-23");
    }

    #[test]
    fn import_id_strips_quotes() {
        let request = ImportRequest {
            id: "\"zyTCAlFPjgYC\"".to_string(),
        };
        assert_eq!(request.volume_id(), "zyTCAlFPjgYC");
    }
}

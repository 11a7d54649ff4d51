// shelfbase-core/src/dataset.rs
// Bundled sample books and seeding helpers

use serde_json::Value;
use std::path::Path;
use tracing::info;

use crate::collection_core::{CollectionCore, InsertManyResult};
use crate::document::BookRecord;
use crate::error::{Result, ShelfError};
use crate::storage::Storage;

const SAMPLE_BOOKS: &str = include_str!("../data/books.json");

/// Parse a JSON array of book records
pub fn books_from_json(text: &str) -> Result<Vec<BookRecord>> {
    Ok(serde_json::from_str(text)?)
}

/// Read a JSON array of book records from disk
pub fn load_books<P: AsRef<Path>>(path: P) -> Result<Vec<BookRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        ShelfError::Config(format!("cannot read book file {}: {}", path.display(), e))
    })?;
    books_from_json(&text)
}

/// The bookstore sample: seventeen books, some with fields missing
pub fn sample_books() -> Result<Vec<BookRecord>> {
    books_from_json(SAMPLE_BOOKS)
}

/// Insert `books` in order; ids are assigned by the collection
pub fn seed<S: Storage>(
    collection: &CollectionCore<S>,
    books: &[BookRecord],
) -> Result<InsertManyResult> {
    let docs = books
        .iter()
        .map(|book| book.to_fields().map(Value::Object))
        .collect::<Result<Vec<_>>>()?;
    let result = collection.insert_many(docs)?;
    info!(
        namespace = %collection.namespace(),
        inserted = result.inserted_count,
        "seeded books"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseCore;
    use serde_json::json;

    #[test]
    fn test_sample_books_parse() {
        let books = sample_books().unwrap();
        assert_eq!(books.len(), 17);

        let orwell = books
            .iter()
            .filter(|b| b.author.as_deref() == Some("George Orwell"))
            .count();
        assert_eq!(orwell, 3);

        let beowulf = books.iter().find(|b| b.title.as_deref() == Some("Beowulf")).unwrap();
        assert_eq!(beowulf.published_year, None);
        assert_eq!(beowulf.price, None);
    }

    #[test]
    fn test_seed_omits_absent_fields() {
        let db = DatabaseCore::in_memory("plp_bookstore");
        let books = db.collection("books").unwrap();
        let result = seed(&books, &sample_books().unwrap()).unwrap();
        assert_eq!(result.inserted_count, 17);

        assert_eq!(
            books
                .count_documents(&json!({"price": {"$exists": false}}))
                .unwrap(),
            2
        );
        let leaves = books.find_one(&json!({"title": "Leaves of Grass"})).unwrap().unwrap();
        assert!(leaves.get("price").is_none());
    }

    #[test]
    fn test_books_from_json_rejects_non_array() {
        assert!(books_from_json(r#"{"title": "Emma"}"#).is_err());
    }

    #[test]
    fn test_load_books_missing_file() {
        let err = load_books("/no/such/books.json").unwrap_err();
        assert!(matches!(err, ShelfError::Config(_)));
    }
}

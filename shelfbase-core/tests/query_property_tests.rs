//! Query property-based tests
//!
//! Filters, projections, sorting and pagination checked over random book
//! datasets, including books with missing fields.

use proptest::prelude::*;
use serde_json::{json, Value};
use shelfbase_core::storage::MemoryStorage;
use shelfbase_core::{
    BookRecord, CollectionCore, DatabaseCore, FindOptions, IndexModel, SortDirection,
};

const AUTHORS: &[&str] = &["George Orwell", "Jane Austen", "Toni Morrison", "Haruki Murakami"];
const GENRES: &[&str] = &["Fiction", "Dystopian", "Romance", "Poetry"];

fn book_strategy() -> impl Strategy<Value = BookRecord> {
    (
        prop::option::of("[A-Z][a-z]{0,8}"),
        prop::option::of(prop::sample::select(AUTHORS)),
        prop::option::of(prop::sample::select(GENRES)),
        prop::option::of(1800i64..2024),
        prop::option::of(100u32..3000),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(title, author, genre, year, cents, in_stock)| BookRecord {
            title,
            author: author.map(str::to_string),
            genre: genre.map(str::to_string),
            published_year: year,
            price: cents.map(|c| f64::from(c) / 100.0),
            in_stock,
            ..Default::default()
        })
}

fn collection_of(books: &[BookRecord]) -> CollectionCore<MemoryStorage> {
    let db = DatabaseCore::in_memory("plp_bookstore");
    let collection = db.collection("books").unwrap();
    for book in books {
        collection
            .insert_one(Value::Object(book.to_fields().unwrap()))
            .unwrap();
    }
    collection
}

fn year_of(doc: &Value) -> Option<i64> {
    doc.get("published_year").and_then(Value::as_i64)
}

proptest! {
    /// Every returned document satisfies the predicate and every stored
    /// document that satisfies it is returned, in natural order.
    #[test]
    fn prop_filter_is_sound_and_complete(
        books in prop::collection::vec(book_strategy(), 0..40),
        threshold in 1800i64..2024,
    ) {
        let collection = collection_of(&books);
        let found = collection.find(&json!({"published_year": {"$gt": threshold}})).unwrap();

        let expected: Vec<Value> = collection
            .find(&json!({}))
            .unwrap()
            .into_iter()
            .filter(|d| year_of(d).is_some_and(|y| y > threshold))
            .collect();
        prop_assert_eq!(found, expected);
    }

    /// A missing field never satisfies a comparison
    #[test]
    fn prop_missing_fields_never_match_comparisons(
        books in prop::collection::vec(book_strategy(), 0..40),
    ) {
        let collection = collection_of(&books);
        for doc in collection.find(&json!({"price": {"$gte": 0}})).unwrap() {
            prop_assert!(doc.get("price").is_some());
        }
        let missing = books.iter().filter(|b| b.genre.is_none()).count();
        let absent = collection.count_documents(&json!({"genre": {"$exists": false}})).unwrap();
        prop_assert_eq!(absent as usize, missing);
    }

    /// Projection keeps exactly the requested fields that exist
    #[test]
    fn prop_projection_keeps_only_requested_fields(
        books in prop::collection::vec(book_strategy(), 1..30),
    ) {
        let collection = collection_of(&books);
        let options = FindOptions::new().with_fields(&["title", "price"]);
        let projected = collection.find_with_options(&json!({}), &options).unwrap();
        let full = collection.find(&json!({})).unwrap();

        prop_assert_eq!(projected.len(), full.len());
        for (p, f) in projected.iter().zip(&full) {
            let obj = p.as_object().unwrap();
            prop_assert!(obj.keys().all(|k| k == "title" || k == "price"));
            prop_assert_eq!(obj.get("title"), f.get("title"));
            prop_assert_eq!(obj.get("price"), f.get("price"));
        }
    }

    /// Sorting descending reverses ascending order for distinct keys
    #[test]
    fn prop_sort_directions_mirror(
        years in prop::collection::hash_set(1800i64..2024, 0..30),
    ) {
        let books: Vec<BookRecord> = years
            .iter()
            .map(|&y| BookRecord { published_year: Some(y), ..Default::default() })
            .collect();
        let collection = collection_of(&books);

        let by_year = |direction| FindOptions::new().sort_by("published_year", direction);
        let ascending = collection
            .find_with_options(&json!({}), &by_year(SortDirection::Ascending))
            .unwrap();
        let mut descending = collection
            .find_with_options(&json!({}), &by_year(SortDirection::Descending))
            .unwrap();
        descending.reverse();

        prop_assert_eq!(&ascending, &descending);
        let sorted: Vec<i64> = ascending.iter().filter_map(year_of).collect();
        prop_assert!(sorted.windows(2).all(|w| w[0] < w[1]));
    }

    /// Consecutive pages cover the sorted result exactly once
    #[test]
    fn prop_pages_partition_sorted_results(
        books in prop::collection::vec(book_strategy(), 0..40),
        page_size in 1usize..8,
    ) {
        let collection = collection_of(&books);
        let sorted = FindOptions::new().sort_by("title", SortDirection::Ascending);
        let all = collection.find_with_options(&json!({}), &sorted).unwrap();

        let mut paged = Vec::new();
        let mut skip = 0;
        loop {
            let options = sorted.clone().with_skip(skip).with_limit(page_size);
            let page = collection.find_with_options(&json!({}), &options).unwrap();
            prop_assert!(page.len() <= page_size);
            if page.is_empty() {
                break;
            }
            skip += page.len();
            paged.extend(page);
        }
        prop_assert_eq!(paged, all);
    }

    /// An index changes the plan, never the answer
    #[test]
    fn prop_index_does_not_change_results(
        books in prop::collection::vec(book_strategy(), 0..40),
        threshold in 1800i64..2024,
        author in prop::sample::select(AUTHORS),
    ) {
        let collection = collection_of(&books);
        let filters = [
            json!({"published_year": {"$gte": threshold}}),
            json!({"author": author}),
            json!({"author": author, "published_year": {"$lt": threshold}}),
        ];
        let before: Vec<Vec<Value>> =
            filters.iter().map(|f| collection.find(f).unwrap()).collect();

        collection.create_index(IndexModel::ascending("published_year")).unwrap();
        collection
            .create_index(IndexModel::new(vec![
                ("author".to_string(), SortDirection::Ascending),
                ("published_year".to_string(), SortDirection::Descending),
            ]))
            .unwrap();

        for (filter, expected) in filters.iter().zip(before) {
            prop_assert_eq!(collection.find(filter).unwrap(), expected);
        }
    }
}

use booksing_extract::models::Book;
use std::collections::HashMap;

/// Collapse books sharing a hash into one entry: the last one seen wins, but
/// it takes the position of the first.
pub fn dedup_by_hash(books: Vec<Book>) -> Vec<Book> {
    let mut position: HashMap<String, usize> = HashMap::with_capacity(books.len());
    let mut unique: Vec<Book> = Vec::with_capacity(books.len());
    for book in books {
        match position.get(&book.hash) {
            Some(&index) => unique[index] = book,
            None => {
                position.insert(book.hash.clone(), unique.len());
                unique.push(book);
            },
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use booksing_extract::models::{Format, Metadata};

    fn book(hash: &str, title: &str) -> Book {
        Book::new(hash, Metadata::new(title, "", ""), Format::Epub)
    }

    #[test]
    fn test_last_write_wins_in_first_position() {
        let books = vec![book("a", "A1"), book("b", "B"), book("a", "A2"), book("c", "C"), book("a", "A3")];
        let unique = dedup_by_hash(books);
        let summary: Vec<_> = unique.iter().map(|b| (b.hash.as_str(), b.title.as_str())).collect();
        assert_eq!(summary, [("a", "A3"), ("b", "B"), ("c", "C")]);
    }

    #[test]
    fn test_empty() {
        assert!(dedup_by_hash(Vec::new()).is_empty());
    }
}

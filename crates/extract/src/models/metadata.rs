/// Descriptive fields pulled out of a file by a [`FileParser`](crate::FileParser).
///
/// Any field may be empty when extraction only partially succeeds; an empty
/// title is backfilled from the filename before a book is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub description: String,
}
impl Metadata {
    pub fn new(title: impl Into<String>, author: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            description: description.into(),
        }
    }

    /// Fill any empty field from `other`, keeping what is already here.
    pub fn or_else(mut self, other: Metadata) -> Self {
        if self.title.is_empty() {
            self.title = other.title;
        }
        if self.author.is_empty() {
            self.author = other.author;
        }
        if self.description.is_empty() {
            self.description = other.description;
        }
        self
    }
}

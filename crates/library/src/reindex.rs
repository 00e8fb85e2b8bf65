use crate::error::{ErrorKind, Result};
use booksing_catalog::Repository;
use booksing_search::SearchIndex;
use exn::ResultExt;
use tracing::{debug, info, instrument};

/// Push every cataloged book to the search index again, `batch_size` at a
/// time, waiting for each batch to be processed. Closes any freshness gap
/// left by rejected batches.
#[instrument(skip_all, fields(index = index.name(), batch_size))]
pub async fn reindex(catalog: &Repository, index: &dyn SearchIndex, batch_size: usize) -> Result<usize> {
    let books = catalog.all().await.or_raise(|| ErrorKind::Catalog)?;
    for batch in books.chunks(batch_size.max(1)) {
        let task = index.batch_upsert(batch, true).await.or_raise(|| ErrorKind::Index)?;
        debug!(count = batch.len(), task, "batch indexed");
    }
    info!(count = books.len(), "reindex complete");
    Ok(books.len())
}

//! Batching accepted books into the search index.

mod batch;
mod updater;

pub use self::batch::dedup_by_hash;
pub use self::updater::{FlushRequest, IndexUpdater};

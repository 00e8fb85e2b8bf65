//! The ingestion pipeline.
//!
//! ```text
//! Scanner ──paths──▶ parser workers ──results──▶ Aggregator ──books──▶ IndexUpdater ──▶ search index
//!                                                    │
//!                                                    ├──▶ catalog
//!                                                    └──▶ library / quarantine directories
//! ```
//!
//! Every stage is its own task and stages only talk through bounded queues.
//! The aggregator is the only task that writes to the catalog, which makes
//! "first write wins, later copies are duplicates" hold without locks.

pub mod aggregate;
pub mod error;
pub mod index;
pub mod parse;
mod pipeline;
mod reindex;
pub mod scan;
mod status;
mod template;

pub use crate::pipeline::{Pipeline, PipelineOptions};
pub use crate::reindex::reindex;
pub use crate::status::{Counter, IndexingState, Status, StatusSnapshot};
pub use crate::template::{DEFAULT_TEMPLATE, PathGenerator};
use booksing_catalog::Repository;
use booksing_extract::ParserHandle;
use booksing_search::SearchHandle;
use booksing_storage::BackendHandle;

/// Everything the pipeline stages share: where files live, where books are
/// recorded, and how files are parsed and named.
pub struct Context {
    /// The inbox. Files are removed from here once they are consumed.
    pub import: BackendHandle,
    /// Managed by the pipeline; mirrors the catalog.
    pub library: BackendHandle,
    /// Files the parser rejected, kept for manual inspection.
    pub quarantine: BackendHandle,
    pub catalog: Repository,
    pub index: SearchHandle,
    pub parser: ParserHandle,
    pub template: PathGenerator,
}

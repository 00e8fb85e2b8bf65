//! Parser workers: turn a queued path into a [`ParseResult`].

mod result;
mod worker;

pub use self::result::{FailureReason, Outcome, ParseResult};
pub use self::worker::{handle, spawn_workers};

//! Discovers files in the import directory and feeds them to the workers.

mod filter;
mod inflight;
mod scanner;

pub use self::filter::is_candidate;
pub use self::inflight::InFlight;
pub use self::scanner::Scanner;

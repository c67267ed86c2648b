//!
//! The address book: everything the seeder knows about the network, keyed by
//! `ip:port`. Nodes move through a small lifecycle driven by crawl results,
//! and the book decides which of them are worth dialing next.
//!

mod book;
pub use book::{AddressBook, BookConfig, Source, StatusCounts};

mod record;
pub use record::{CrawlOutcome, CrawlResult, NodeRecord, NodeStatus};

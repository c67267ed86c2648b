//!
//! DNS side of the seeder: a thin record-sink contract, the Cloudflare
//! driver implementing it, the reconciler that keeps the published A-record
//! set in step with the address book, and a sequential worker for ad-hoc
//! record changes.
//!

mod sink;
pub use sink::{RecordSink, SinkError};

#[cfg(any(test, feature = "mocks"))]
pub use sink::MockRecordSink;

mod cloudflare;
pub use cloudflare::CloudflareSink;

mod reconcile;
pub use reconcile::{Reconciler, ReconcilerConfig};

mod worker;
pub use worker::{RecordAction, RecordMessage, RecordWorker};

#[cfg(test)]
mod tests;

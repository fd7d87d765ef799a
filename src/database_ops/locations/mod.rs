//! Province → district → ward importer.
//!
//! [`client`] fetches from the upstream API, [`transform`] maps records to
//! rows, [`persist`] writes them in chunks through a [`store::LocationStore`],
//! [`coverage`] audits the result and [`sync`] sequences the whole run.

pub mod client;
pub mod coverage;
pub mod models;
pub mod persist;
pub mod progress;
pub mod store;
pub mod sync;
pub mod transform;

pub use client::{LocationSource, OpenApiClient};
pub use coverage::{CoverageAuditor, ProvinceCoverage, VerificationReport};
pub use store::LocationStore;
pub use sync::{LocationSync, RunMode, SyncStage, SyncSummary};

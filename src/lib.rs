pub mod cli;
pub mod config;
pub mod database_ops;
pub mod error;
pub mod telemetry;

pub mod util {
    pub mod env;
    pub mod retry;
}

pub use config::{SyncConfig, WardScope};
pub use error::{SyncError, SyncResult};

//! motorlog-core: domain layer of the vehicle logbook
//!
//! Builds on [`motorlog_store`] with:
//!
//! - the record types the application persists ([`model`])
//! - the application's declared migration sequence ([`migrations`])
//! - snapshot export and restore ([`backup`])
//! - tracing bootstrap for binaries ([`telemetry`])

pub mod backup;
pub mod migrations;
pub mod model;
pub mod telemetry;

pub use backup::{export_snapshot, import_snapshot, BackupError, ExportReport, ImportReport};
pub use migrations::migrations;
pub use telemetry::init_tracing;

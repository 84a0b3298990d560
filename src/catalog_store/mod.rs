mod audit;
mod backup;
mod error;
mod interchange;
mod models;
pub(crate) mod schema;
mod store;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditTrail};
pub use error::{StoreError, StoreResult};
pub use interchange::{CustomFieldRecord, ImportReport, TrackRecord};
pub use models::*;
pub use store::SqliteCatalogStore;

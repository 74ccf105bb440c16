mod audit;
mod capability;
mod metadata;
mod models;

pub use audit::AuditAction;
pub use capability::Capability;
pub use metadata::MetadataKind;
pub use models::*;

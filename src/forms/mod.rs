//! Form domain: definitions, publishing, access rules, permissions and
//! attached metadata.

mod access;
mod definition;
mod metadata;
mod permissions;
mod publish;

pub use access::FormAccess;
pub use definition::{FormDefinition, Question, normalize_id_string};
pub use metadata::{FormMetadata, MetadataError, UploadedFile};
pub use permissions::{PermissionChange, PermissionError, PermissionManager};
pub use publish::{AlertKind, CLONE_SUFFIX, DUPLICATE_FORM, PublishOutcome, Publisher, Upload};

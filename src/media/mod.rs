mod storage;

pub use storage::{
    DEFINITIONS_AREA, DOCS_AREA, MediaStorage, MediaStorageError, StoredFile, file_name_parts,
};

//! Object store abstraction for job payloads and result assets.
//!
//! The `ObjectStore` trait is the seam between the job-coordination layer and
//! a concrete blob service. Two backends ship with the crate: S3 (or any
//! S3-compatible service) and an in-process store.

mod backend;
mod content_type;
mod error;
mod memory;
mod s3;

pub use backend::{ByteStream, Metadata, ObjectMetadata, ObjectStore, StoredObject};
pub use content_type::{infer_content_type, FILENAME_FIELDS};
pub use error::StorageError;
pub use memory::MemoryObjectStore;
pub use s3::{S3Config, S3ObjectStore};

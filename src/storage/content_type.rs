//! Content-type inference from filename-like metadata fields.

use super::Metadata;

/// Metadata fields consulted, in order, when inferring a content type.
pub const FILENAME_FIELDS: [&str; 3] = ["filename", "file_name", "fileName"];

/// Infers a content type from the first filename-like field in `metadata`.
///
/// Returns `None` when no such field exists or its extension is unknown.
#[must_use]
pub fn infer_content_type(metadata: &Metadata) -> Option<String> {
    let filename = FILENAME_FIELDS
        .iter()
        .find_map(|field| metadata.get(*field))?;

    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

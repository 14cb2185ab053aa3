use std::path::Path;

use entistore_dao::{BinaryProvider, Entity, EntityKey, KeyId, LoadGroup};
use serde::{Deserialize, Serialize};

/// Fields shown by `ls`.
pub const SUMMARY: LoadGroup = LoadGroup::new("summary", &["name", "size", "content_type"]);

/// A file stored by the CLI; the payload lives in chunks listed in
/// `chunk_keys`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredFile {
    #[serde(skip)]
    pub id: Option<KeyId>,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub chunk_keys: Vec<EntityKey>,
}

impl StoredFile {
    pub fn new(name: impl Into<String>, size: u64, content_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: content_type.into(),
            ..Self::default()
        }
    }
}

impl Entity for StoredFile {
    const KIND: &'static str = "StoredFile";

    fn id(&self) -> Option<KeyId> {
        self.id.clone()
    }

    fn set_id(&mut self, id: KeyId) {
        self.id = Some(id);
    }
}

impl BinaryProvider for StoredFile {
    fn chunk_keys(&self) -> &[EntityKey] {
        &self.chunk_keys
    }

    fn set_chunk_keys(&mut self, keys: Vec<EntityKey>) {
        self.chunk_keys = keys;
    }
}

/// Content type guessed from the file extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("txt" | "md") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(guess_content_type(Path::new("a/b/photo.JPG")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("notes.md")), "text/plain");
        assert_eq!(
            guess_content_type(Path::new("archive")),
            "application/octet-stream"
        );
    }

    #[test]
    fn summary_excludes_chunk_keys() {
        assert!(SUMMARY.contains("size"));
        assert!(!SUMMARY.contains("chunk_keys"));
    }

    #[test]
    fn key_uses_stored_file_kind() {
        let mut file = StoredFile::new("a.txt", 3, "text/plain");
        assert_eq!(file.key(), None);
        file.set_id(KeyId::Id(5));
        assert_eq!(file.key(), Some(EntityKey::new("StoredFile", 5)));
    }
}

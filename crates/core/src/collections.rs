use crate::error::ServiceError;
use crate::index::{EmbeddingIndex, SessionState};
use crate::models::{CollectionRecord, DocumentFragment};
use crate::traits::{MetadataStore, ObjectStore};
use chrono::Utc;
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Single top-level directory inside every collection archive. Unpacking
/// expects exactly this layout; there is no nested variant.
pub const ARCHIVE_ROOT: &str = "index";

const FRAGMENTS_ENTRY: &str = "fragments.json";
const VECTORS_ENTRY: &str = "vectors.json";

fn archive_entry(name: &str) -> String {
    format!("{ARCHIVE_ROOT}/{name}")
}

/// Blob key for one user's collection archive.
pub fn storage_path(user_id: &str, collection_name: &str) -> String {
    format!("user_collections/{user_id}/{collection_name}.zip")
}

/// Serializes an index into a zip archive holding its native files under
/// [`ARCHIVE_ROOT`].
pub fn pack_index(index: &EmbeddingIndex) -> Result<Vec<u8>, ServiceError> {
    let (fragments, vectors) = index.clone().into_parts();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(archive_entry(FRAGMENTS_ENTRY), options)?;
    writer.write_all(&serde_json::to_vec(&fragments)?)?;

    writer.start_file(archive_entry(VECTORS_ENTRY), options)?;
    writer.write_all(&serde_json::to_vec(&vectors)?)?;

    Ok(writer.finish()?.into_inner())
}

/// Rebuilds an index from an archive produced by [`pack_index`]. Any other
/// layout is an error.
pub fn unpack_index(bytes: &[u8]) -> Result<EmbeddingIndex, ServiceError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let fragments: Vec<DocumentFragment> =
        serde_json::from_slice(&read_entry(&mut archive, &archive_entry(FRAGMENTS_ENTRY))?)?;
    let vectors: Vec<Vec<f32>> =
        serde_json::from_slice(&read_entry(&mut archive, &archive_entry(VECTORS_ENTRY))?)?;

    EmbeddingIndex::from_parts(fragments, vectors)
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ServiceError> {
    let mut entry = archive.by_name(name)?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    Ok(content)
}

fn require_identity(user_id: &str) -> Result<(), ServiceError> {
    if user_id.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "user is not identified".to_string(),
        ));
    }
    Ok(())
}

/// Archives the session index, uploads it, then writes the metadata record.
///
/// If either remote step fails the error is returned and no metadata record
/// is written. A crash between upload and metadata write can leave an
/// orphaned blob; there is no transaction spanning the two stores.
pub async fn save_collection(
    metadata: &dyn MetadataStore,
    storage: &dyn ObjectStore,
    user_id: &str,
    collection_name: &str,
    session: &SessionState,
) -> Result<CollectionRecord, ServiceError> {
    require_identity(user_id)?;
    if collection_name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "collection name is empty".to_string(),
        ));
    }

    let archive = pack_index(&session.index)?;
    let path = storage_path(user_id, collection_name);

    storage.upload(&path, archive).await?;

    let record = CollectionRecord {
        name: collection_name.to_string(),
        user_id: user_id.to_string(),
        file_names: session.file_names.clone(),
        storage_path: path,
        created_at: Utc::now(),
    };
    metadata.put_collection(user_id, &record).await?;

    Ok(record)
}

/// Fetches a collection's metadata, downloads its archive, and rebuilds the
/// session. The embedder bound by the caller afterward must match the one
/// the vectors were produced with; the archive itself carries the vectors.
pub async fn load_collection(
    metadata: &dyn MetadataStore,
    storage: &dyn ObjectStore,
    user_id: &str,
    collection_name: &str,
) -> Result<SessionState, ServiceError> {
    require_identity(user_id)?;

    let record = metadata
        .get_collection(user_id, collection_name)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("collection '{collection_name}'")))?;

    let archive = storage.download(&record.storage_path).await?;
    let index = unpack_index(&archive)?;

    for source in index.sources() {
        if !record.file_names.contains(&source) {
            return Err(ServiceError::Backend {
                service: "metadata".to_string(),
                details: format!("archived fragment source '{source}' missing from file list"),
            });
        }
    }

    let mut session = SessionState::new(index, record.file_names);
    session.active_collection = Some(record.name);
    Ok(session)
}

/// Collection names owned by one user. Ordering follows the metadata store.
pub async fn list_collections(
    metadata: &dyn MetadataStore,
    user_id: &str,
) -> Result<Vec<String>, ServiceError> {
    require_identity(user_id)?;
    metadata.list_collections(user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, HashingEmbedder};
    use crate::models::{DocumentFragment, ExtractionMethod};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeMetadata {
        records: Mutex<HashMap<(String, String), CollectionRecord>>,
    }

    #[async_trait]
    impl MetadataStore for FakeMetadata {
        async fn put_collection(
            &self,
            user_id: &str,
            record: &CollectionRecord,
        ) -> Result<(), ServiceError> {
            self.records
                .lock()
                .unwrap()
                .insert((user_id.to_string(), record.name.clone()), record.clone());
            Ok(())
        }

        async fn get_collection(
            &self,
            user_id: &str,
            name: &str,
        ) -> Result<Option<CollectionRecord>, ServiceError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), name.to_string()))
                .cloned())
        }

        async fn list_collections(&self, user_id: &str) -> Result<Vec<String>, ServiceError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .keys()
                .filter(|(owner, _)| owner == user_id)
                .map(|(_, name)| name.clone())
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeStorage {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
        fail_uploads: bool,
    }

    #[async_trait]
    impl ObjectStore for FakeStorage {
        async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), ServiceError> {
            if self.fail_uploads {
                return Err(ServiceError::Backend {
                    service: "storage".to_string(),
                    details: "upload refused".to_string(),
                });
            }
            self.blobs.lock().unwrap().insert(path.to_string(), bytes);
            Ok(())
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
            self.blobs
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(path.to_string()))
        }
    }

    async fn sample_session() -> SessionState {
        let embedder = HashingEmbedder::default();
        let index = EmbeddingIndex::build(
            vec![
                DocumentFragment::new(
                    "Ref.pdf",
                    0,
                    ExtractionMethod::Direct,
                    "valor principal de dez mil reais",
                ),
                DocumentFragment::new(
                    "Draft.pdf",
                    0,
                    ExtractionMethod::Direct,
                    "prazo total de doze meses",
                ),
            ],
            &embedder,
        )
        .await
        .unwrap();

        SessionState::new(
            index,
            vec!["Ref.pdf".to_string(), "Draft.pdf".to_string()],
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips_the_session() {
        let metadata = FakeMetadata::default();
        let storage = FakeStorage::default();
        let session = sample_session().await;

        let record = save_collection(&metadata, &storage, "user-1", "empréstimos", &session)
            .await
            .unwrap();
        assert_eq!(record.storage_path, "user_collections/user-1/empréstimos.zip");

        let loaded = load_collection(&metadata, &storage, "user-1", "empréstimos")
            .await
            .unwrap();

        assert_eq!(loaded.file_names, session.file_names);
        assert_eq!(loaded.active_collection.as_deref(), Some("empréstimos"));

        let embedder = HashingEmbedder::default();
        let query = embedder.embed("prazo total de doze meses").await.unwrap();
        let hits = loaded.index.search(&query, 1);
        assert_eq!(hits[0].fragment.source, "Draft.pdf");
    }

    #[tokio::test]
    async fn archive_round_trip_preserves_every_fragment() {
        let session = sample_session().await;
        let bytes = pack_index(&session.index).unwrap();
        let rebuilt = unpack_index(&bytes).unwrap();

        assert_eq!(rebuilt.len(), session.index.len());
        assert_eq!(rebuilt.sources(), session.index.sources());
    }

    #[tokio::test]
    async fn every_archive_entry_lives_under_the_root() {
        let session = sample_session().await;
        let bytes = pack_index(&session.index).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let prefix = format!("{ARCHIVE_ROOT}/");
        for position in 0..archive.len() {
            let entry = archive.by_index(position).unwrap();
            assert!(entry.name().starts_with(&prefix));
        }
    }

    #[tokio::test]
    async fn unknown_collection_is_not_found() {
        let metadata = FakeMetadata::default();
        let storage = FakeStorage::default();

        let result = load_collection(&metadata, &storage, "user-1", "missing").await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_metadata_record() {
        let metadata = FakeMetadata::default();
        let storage = FakeStorage {
            fail_uploads: true,
            ..FakeStorage::default()
        };
        let session = sample_session().await;

        let result = save_collection(&metadata, &storage, "user-1", "contratos", &session).await;

        assert!(result.is_err());
        assert!(metadata.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_owner() {
        let metadata = FakeMetadata::default();
        let storage = FakeStorage::default();
        let session = sample_session().await;

        save_collection(&metadata, &storage, "alice", "contratos", &session)
            .await
            .unwrap();
        save_collection(&metadata, &storage, "alice", "empréstimos", &session)
            .await
            .unwrap();
        save_collection(&metadata, &storage, "bob", "outros", &session)
            .await
            .unwrap();

        let mut names = list_collections(&metadata, "alice").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["contratos".to_string(), "empréstimos".to_string()]);
    }

    #[tokio::test]
    async fn anonymous_user_is_rejected_before_any_remote_call() {
        let metadata = FakeMetadata::default();
        let storage = FakeStorage::default();
        let session = sample_session().await;

        let result = save_collection(&metadata, &storage, "  ", "contratos", &session).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[test]
    fn foreign_archive_layout_is_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file("unzipped/index/fragments.json", options).unwrap();
        writer.write_all(b"[]").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(unpack_index(&bytes).is_err());
    }
}

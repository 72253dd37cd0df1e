use crate::error::ServiceError;
use crate::models::CollectionRecord;
use async_trait::async_trait;

/// Text generation: prompt in, model reply out.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Page transcription by a vision-capable model.
///
/// The service rasterizes the requested page itself; callers only hand over
/// the PDF bytes, the zero-based page index, and the transcription
/// instruction.
#[async_trait]
pub trait VisionOcr: Send + Sync {
    async fn transcribe_page(
        &self,
        pdf_bytes: &[u8],
        page: u32,
        instruction: &str,
    ) -> Result<String, ServiceError>;
}

/// Per-user collection metadata, keyed by collection name.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_collection(
        &self,
        user_id: &str,
        record: &CollectionRecord,
    ) -> Result<(), ServiceError>;

    async fn get_collection(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<CollectionRecord>, ServiceError>;

    async fn list_collections(&self, user_id: &str) -> Result<Vec<String>, ServiceError>;
}

/// Blob upload/download keyed by storage path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), ServiceError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Account creation and lookup in the authentication service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Creates an account and returns its user id. A duplicate email maps
    /// to [`ServiceError::EmailInUse`].
    async fn create_user(&self, email: &str, password: &str) -> Result<String, ServiceError>;

    /// Returns the user id for an email, or `None` when no account exists.
    async fn find_user(&self, email: &str) -> Result<Option<String>, ServiceError>;
}

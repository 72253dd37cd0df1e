pub mod analysis;
pub mod auth;
pub mod chunking;
pub mod collections;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod services;
pub mod traits;

pub use analysis::{
    answer_question, conformity_check, detect_anomalies, executive_summary, extract_contract_data,
    extract_events, risk_analysis, Answer, EventBatch, ExtractionBatch, ANSWER_TOP_K,
};
pub use auth::{login_user, register_user, validate_email, MIN_PASSWORD_LEN};
pub use chunking::{split_fragments, split_text, ChunkingConfig};
pub use collections::{
    list_collections, load_collection, pack_index, save_collection, storage_path, unpack_index,
    ARCHIVE_ROOT,
};
pub use embeddings::{Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, ServiceError};
pub use extractor::{extract_fragments, LopdfExtractor, OcrOptions, PdfExtractor, OCR_INSTRUCTION};
pub use index::{EmbeddingIndex, RetrievedFragment, SessionState};
pub use ingest::{
    build_session, discover_pdf_files, extract_uploads, read_uploads, IngestionReport, PdfUpload,
    ProcessedFile, SkippedUpload,
};
pub use models::{
    CollectionRecord, ContractEvent, ContractInfo, DocumentFragment, EventList, ExtractedEvent,
    ExtractionMethod, ItemFailure,
};
pub use services::{FirebaseStorageClient, FirestoreClient, GeminiClient, IdentityClient};
pub use traits::{AuthBackend, MetadataStore, ObjectStore, TextModel, VisionOcr};

pub mod firestore;
pub mod gemini;
pub mod identity;
pub mod storage;

pub use firestore::FirestoreClient;
pub use gemini::GeminiClient;
pub use identity::IdentityClient;
pub use storage::FirebaseStorageClient;

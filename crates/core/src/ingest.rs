use crate::chunking::{split_fragments, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{extract_fragments, OcrOptions};
use crate::index::{EmbeddingIndex, SessionState};
use crate::models::{DocumentFragment, ExtractionMethod};
use crate::traits::VisionOcr;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// One uploaded file: display name plus raw PDF bytes.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A file that produced fragments, with its content digest and the method
/// that won.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub name: String,
    pub checksum: String,
    pub fragment_count: usize,
    pub method: ExtractionMethod,
}

/// A file dropped from the batch, with the reason shown to the user.
#[derive(Debug, Clone)]
pub struct SkippedUpload {
    pub name: String,
    pub reason: String,
}

/// Outcome of extracting one upload batch. Per-file failures land in
/// `skipped` instead of aborting the batch.
#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub batch_id: Uuid,
    pub fragments: Vec<DocumentFragment>,
    pub processed: Vec<ProcessedFile>,
    pub skipped: Vec<SkippedUpload>,
}

/// Recursively collects `.pdf` files under a folder, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads files from disk into uploads named after their file names.
pub fn read_uploads(paths: &[PathBuf]) -> Result<Vec<PdfUpload>, IngestError> {
    let mut uploads = Vec::with_capacity(paths.len());

    for path in paths {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?;

        uploads.push(PdfUpload {
            name: name.to_string(),
            bytes: std::fs::read(path)?,
        });
    }

    Ok(uploads)
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extracts fragments from every upload. One file's failure (or a file with
/// no readable text by either path) only skips that file; the batch
/// continues. Errors only when the upload list itself is empty.
pub async fn extract_uploads(
    uploads: &[PdfUpload],
    ocr: &dyn VisionOcr,
    options: OcrOptions,
) -> Result<IngestionReport, IngestError> {
    if uploads.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no pdf files in upload batch".to_string(),
        ));
    }

    let mut fragments = Vec::new();
    let mut processed = Vec::new();
    let mut skipped = Vec::new();

    for upload in uploads {
        match extract_fragments(&upload.bytes, &upload.name, ocr, options).await {
            Ok(file_fragments) if !file_fragments.is_empty() => {
                processed.push(ProcessedFile {
                    name: upload.name.clone(),
                    checksum: digest_bytes(&upload.bytes),
                    fragment_count: file_fragments.len(),
                    method: file_fragments[0].method,
                });
                fragments.extend(file_fragments);
            }
            Ok(_) => skipped.push(SkippedUpload {
                name: upload.name.clone(),
                reason: "no readable text by any extraction method".to_string(),
            }),
            Err(error) => skipped.push(SkippedUpload {
                name: upload.name.clone(),
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        batch_id: Uuid::new_v4(),
        fragments,
        processed,
        skipped,
    })
}

/// Chunks an extraction report and builds the session index over it.
///
/// `IngestError::NoDocuments` when every file was skipped.
pub async fn build_session(
    report: &IngestionReport,
    chunking: ChunkingConfig,
    embedder: &dyn Embedder,
) -> Result<SessionState, IngestError> {
    if report.fragments.is_empty() {
        return Err(IngestError::NoDocuments);
    }

    let chunks = split_fragments(&report.fragments, chunking);
    let index = EmbeddingIndex::build(chunks, embedder).await?;
    let file_names = report
        .processed
        .iter()
        .map(|file| file.name.clone())
        .collect();

    Ok(SessionState::new(index, file_names))
}

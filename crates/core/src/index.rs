use crate::embeddings::Embedder;
use crate::error::{IngestError, ServiceError};
use crate::models::DocumentFragment;
use serde::{Deserialize, Serialize};

/// A fragment returned by a nearest-neighbor lookup, with its cosine score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedFragment {
    pub fragment: DocumentFragment,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    fragment: DocumentFragment,
    vector: Vec<f32>,
}

/// Append-only in-memory index of (fragment, vector) pairs with cosine
/// nearest-neighbor lookup.
///
/// Built once per upload batch and read-only afterward; a session replaces
/// its index wholesale instead of mutating it.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

impl EmbeddingIndex {
    /// Embeds every fragment in one batch and builds the index. An empty
    /// fragment sequence is `IngestError::NoDocuments`, which callers
    /// surface as "no documents processed" rather than a fatal error.
    pub async fn build(
        fragments: Vec<DocumentFragment>,
        embedder: &dyn Embedder,
    ) -> Result<Self, IngestError> {
        if fragments.is_empty() {
            return Err(IngestError::NoDocuments);
        }

        let texts: Vec<String> = fragments
            .iter()
            .map(|fragment| fragment.text.clone())
            .collect();
        let vectors = embedder.embed_batch(&texts).await?;

        Self::from_parts(fragments, vectors).map_err(IngestError::Service)
    }

    /// Reassembles an index from its native parts, as produced by
    /// [`EmbeddingIndex::into_parts`] or a loaded archive.
    pub fn from_parts(
        fragments: Vec<DocumentFragment>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, ServiceError> {
        if fragments.len() != vectors.len() {
            return Err(ServiceError::InvalidInput(format!(
                "vector count {} does not match fragment count {}",
                vectors.len(),
                fragments.len()
            )));
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if vectors.iter().any(|vector| vector.len() != dimensions) {
            return Err(ServiceError::InvalidInput(
                "embedding vectors have mixed dimensions".to_string(),
            ));
        }

        let entries = fragments
            .into_iter()
            .zip(vectors)
            .map(|(fragment, vector)| IndexEntry { fragment, vector })
            .collect();

        Ok(Self {
            entries,
            dimensions,
        })
    }

    /// Splits the index into its native parts (fragments, vectors) for
    /// archive serialization.
    pub fn into_parts(self) -> (Vec<DocumentFragment>, Vec<Vec<f32>>) {
        let mut fragments = Vec::with_capacity(self.entries.len());
        let mut vectors = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            fragments.push(entry.fragment);
            vectors.push(entry.vector);
        }
        (fragments, vectors)
    }

    pub fn fragments(&self) -> impl Iterator<Item = &DocumentFragment> {
        self.entries.iter().map(|entry| &entry.fragment)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top-k fragments by cosine similarity to `query_vector`.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Vec<RetrievedFragment> {
        let mut scored: Vec<RetrievedFragment> = self
            .entries
            .iter()
            .map(|entry| RetrievedFragment {
                fragment: entry.fragment.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        scored
    }

    /// Source file names covered by this index, in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources = Vec::new();
        for entry in &self.entries {
            if !sources.contains(&entry.fragment.source) {
                sources.push(entry.fragment.source.clone());
            }
        }
        sources
    }

    /// Full text of one source file: its fragments sorted by ascending page
    /// number and joined with newlines. Stable across calls on the same
    /// index. `None` when the file has no fragments here.
    pub fn full_text(&self, source: &str) -> Option<String> {
        let mut fragments: Vec<&DocumentFragment> = self
            .entries
            .iter()
            .map(|entry| &entry.fragment)
            .filter(|fragment| fragment.source == source)
            .collect();

        if fragments.is_empty() {
            return None;
        }

        fragments.sort_by_key(|fragment| fragment.page);
        Some(
            fragments
                .iter()
                .map(|fragment| fragment.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let norm_left: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let norm_right: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if norm_left == 0.0 || norm_right == 0.0 {
        0.0
    } else {
        dot / (norm_left * norm_right)
    }
}

/// The active working set of one interactive session: the index plus the
/// file names it covers. Replaced wholesale on a new upload or a collection
/// load; threaded explicitly into every analysis call.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub index: EmbeddingIndex,
    pub file_names: Vec<String>,
    pub active_collection: Option<String>,
}

impl SessionState {
    pub fn new(index: EmbeddingIndex, file_names: Vec<String>) -> Self {
        Self {
            index,
            file_names,
            active_collection: None,
        }
    }

    pub fn full_text(&self, source: &str) -> Option<String> {
        self.index.full_text(source)
    }
}

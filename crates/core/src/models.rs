use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a page's text was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded text layer read directly from the PDF.
    Direct,
    /// Page transcribed by a vision-capable model.
    VisionOcr,
}

/// A unit of extracted (or chunked) document text with its source metadata.
///
/// Fragments are immutable once created. Page numbers are zero-based and
/// define the reassembly order for full-document text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFragment {
    pub source: String,
    pub page: u32,
    pub method: ExtractionMethod,
    pub text: String,
}

impl DocumentFragment {
    pub fn new(
        source: impl Into<String>,
        page: u32,
        method: ExtractionMethod,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            page,
            method,
            text: text.into(),
        }
    }
}

/// Metadata record for a persisted collection, keyed by user id + name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionRecord {
    pub name: String,
    pub user_id: String,
    pub file_names: Vec<String>,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

/// Structured fields extracted from one contract.
///
/// Wire names keep the Portuguese schema the extraction prompt asks the
/// model to produce, so a reply deserializes directly into this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContractInfo {
    #[serde(rename = "arquivo_fonte", default)]
    pub source_file: String,
    #[serde(rename = "nome_banco_emissor", default)]
    pub issuing_bank: Option<String>,
    #[serde(rename = "valor_principal_numerico", default)]
    pub principal_amount: Option<f64>,
    #[serde(rename = "prazo_total_meses", default)]
    pub term_months: Option<u32>,
    #[serde(rename = "taxa_juros_anual_numerica", default)]
    pub annual_interest_rate: Option<f64>,
    #[serde(rename = "possui_clausula_rescisao_multa", default)]
    pub termination_penalty: Option<String>,
    #[serde(rename = "condicao_limite_credito", default)]
    pub credit_limit_terms: Option<String>,
    #[serde(rename = "condicao_juros_rotativo", default)]
    pub revolving_interest_terms: Option<String>,
    #[serde(rename = "condicao_anuidade", default)]
    pub annuity_terms: Option<String>,
    #[serde(rename = "condicao_cancelamento", default)]
    pub cancellation_terms: Option<String>,
}

/// One contractual event or deadline, as the model reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractEvent {
    #[serde(rename = "descricao_evento")]
    pub description: String,
    #[serde(rename = "data_evento_str", default)]
    pub date: Option<String>,
    #[serde(rename = "trecho_relevante", default)]
    pub excerpt: Option<String>,
}

/// The event list the deadline-extraction prompt asks for, per file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventList {
    #[serde(rename = "eventos")]
    pub events: Vec<ContractEvent>,
    #[serde(rename = "arquivo_fonte", default)]
    pub source_file: String,
}

/// An event flattened with the file it came from, for aggregate output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractedEvent {
    pub source_file: String,
    pub description: String,
    pub date: Option<String>,
    pub excerpt: Option<String>,
}

/// A per-item failure inside a batch operation. Batch analyses report these
/// instead of aborting on the first bad document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemFailure {
    pub source_file: String,
    pub reason: String,
}

use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::traits::{TextModel, VisionOcr};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde_json::{json, Value};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_VISION_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Google Generative Language API client covering the three model roles the
/// pipeline needs: text generation, page transcription, and embedding.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    text_model: String,
    vision_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            temperature: 0.2,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.endpoint, model, action, self.api_key
        )
    }

    async fn generate_content(&self, model: &str, parts: Value) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.model_url(model, "generateContent"))
            .json(&json!({
                "contents": [{ "parts": parts }],
                "generationConfig": { "temperature": self.temperature },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "gemini".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let text = parsed
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Backend {
                service: "gemini".to_string(),
                details: "reply has no candidate text".to_string(),
            })?;

        Ok(text.to_string())
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.generate_content(&self.text_model, json!([{ "text": prompt }]))
            .await
    }
}

#[async_trait]
impl VisionOcr for GeminiClient {
    async fn transcribe_page(
        &self,
        pdf_bytes: &[u8],
        page: u32,
        instruction: &str,
    ) -> Result<String, ServiceError> {
        let directive = format!(
            "{instruction}\n\nTranscreva somente a página {} do documento anexo.",
            page + 1
        );

        self.generate_content(
            &self.vision_model,
            json!([
                { "text": directive },
                {
                    "inline_data": {
                        "mime_type": "application/pdf",
                        "data": STANDARD.encode(pdf_bytes),
                    }
                }
            ]),
        )
        .await
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.embedding_model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let response = self
            .client
            .post(self.model_url(&self.embedding_model, "batchEmbedContents"))
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "gemini".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let embeddings = parsed
            .pointer("/embeddings")
            .and_then(Value::as_array)
            .ok_or_else(|| ServiceError::Backend {
                service: "gemini".to_string(),
                details: "reply has no embeddings".to_string(),
            })?;

        let mut vectors = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            let values = embedding
                .pointer("/values")
                .and_then(Value::as_array)
                .ok_or_else(|| ServiceError::Backend {
                    service: "gemini".to_string(),
                    details: "embedding entry has no values".to_string(),
                })?;

            vectors.push(
                values
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|value| value as f32)
                    .collect::<Vec<f32>>(),
            );
        }

        if vectors.len() != texts.len() {
            return Err(ServiceError::Backend {
                service: "gemini".to_string(),
                details: format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ),
            });
        }

        Ok(vectors)
    }
}

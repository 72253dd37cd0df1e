use crate::error::ServiceError;
use crate::models::CollectionRecord;
use crate::traits::MetadataStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};

const COLLECTION_GROUP: &str = "ia_collections";

/// Firestore REST client for per-user collection metadata, stored under
/// `users/{user_id}/ia_collections/{collection_name}`.
pub struct FirestoreClient {
    client: Client,
    endpoint: String,
    project_id: String,
    auth_token: Option<String>,
}

impl FirestoreClient {
    pub fn new(project_id: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: "https://firestore.googleapis.com/v1".to_string(),
            project_id: project_id.into(),
            auth_token,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn documents_url(&self, suffix: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.endpoint, self.project_id, suffix
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn record_fields(record: &CollectionRecord) -> Value {
        let file_names: Vec<Value> = record
            .file_names
            .iter()
            .map(|name| json!({ "stringValue": name }))
            .collect();

        json!({
            "fields": {
                "nomes_arquivos": { "arrayValue": { "values": file_names } },
                "storage_path": { "stringValue": record.storage_path },
                "created_at": { "timestampValue": record.created_at.to_rfc3339() },
            }
        })
    }

    fn parse_record(
        document: &Value,
        user_id: &str,
        name: &str,
    ) -> Result<CollectionRecord, ServiceError> {
        let file_names = document
            .pointer("/fields/nomes_arquivos/arrayValue/values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.pointer("/stringValue"))
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let storage_path = document
            .pointer("/fields/storage_path/stringValue")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Backend {
                service: "firestore".to_string(),
                details: format!("record for '{name}' has no storage_path"),
            })?
            .to_string();

        let created_at = document
            .pointer("/fields/created_at/timestampValue")
            .and_then(Value::as_str)
            .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
            .map(|stamp| stamp.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(CollectionRecord {
            name: name.to_string(),
            user_id: user_id.to_string(),
            file_names,
            storage_path,
            created_at,
        })
    }
}

#[async_trait]
impl MetadataStore for FirestoreClient {
    async fn put_collection(
        &self,
        user_id: &str,
        record: &CollectionRecord,
    ) -> Result<(), ServiceError> {
        let url = self.documents_url(&format!(
            "users/{user_id}/{COLLECTION_GROUP}/{}",
            record.name
        ));

        let response = self
            .authorized(self.client.patch(url))
            .json(&Self::record_fields(record))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "firestore".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn get_collection(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<CollectionRecord>, ServiceError> {
        let url = self.documents_url(&format!("users/{user_id}/{COLLECTION_GROUP}/{name}"));
        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "firestore".to_string(),
                details: response.status().to_string(),
            });
        }

        let document: Value = response.json().await?;
        Self::parse_record(&document, user_id, name).map(Some)
    }

    async fn list_collections(&self, user_id: &str) -> Result<Vec<String>, ServiceError> {
        let url = self.documents_url(&format!("users/{user_id}/{COLLECTION_GROUP}"));
        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "firestore".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let names = parsed
            .pointer("/documents")
            .and_then(Value::as_array)
            .map(|documents| {
                documents
                    .iter()
                    .filter_map(|document| document.pointer("/name"))
                    .filter_map(Value::as_str)
                    .filter_map(|path| path.rsplit('/').next())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(names)
    }
}

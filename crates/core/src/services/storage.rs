use crate::error::ServiceError;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};

/// Firebase Storage REST client. Object names are percent-encoded into the
/// URL, so nested blob keys like `user_collections/{user}/{name}.zip` work
/// unchanged.
pub struct FirebaseStorageClient {
    client: Client,
    endpoint: String,
    bucket: String,
    auth_token: Option<String>,
}

impl FirebaseStorageClient {
    pub fn new(bucket: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: "https://firebasestorage.googleapis.com/v0".to_string(),
            bucket: bucket.into(),
            auth_token,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn encoded(path: &str) -> String {
        url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for FirebaseStorageClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), ServiceError> {
        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            self.bucket,
            Self::encoded(path)
        );

        let response = self
            .authorized(self.client.post(url))
            .header("content-type", "application/zip")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "storage".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        let url = format!(
            "{}/b/{}/o/{}?alt=media",
            self.endpoint,
            self.bucket,
            Self::encoded(path)
        );

        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(path.to_string()));
        }

        if !response.status().is_success() {
            return Err(ServiceError::Backend {
                service: "storage".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

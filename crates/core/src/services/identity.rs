use crate::error::ServiceError;
use crate::traits::AuthBackend;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Identity Toolkit REST client: account creation with the web API key,
/// email lookup with an admin bearer token.
pub struct IdentityClient {
    client: Client,
    endpoint: String,
    api_key: String,
    admin_token: Option<String>,
}

impl IdentityClient {
    pub fn new(api_key: impl Into<String>, admin_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: "https://identitytoolkit.googleapis.com/v1".to_string(),
            api_key: api_key.into(),
            admin_token,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn accounts_url(&self, action: &str) -> String {
        format!("{}/accounts:{}?key={}", self.endpoint, action, self.api_key)
    }
}

#[async_trait]
impl AuthBackend for IdentityClient {
    async fn create_user(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.accounts_url("signUp"))
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": false,
            }))
            .send()
            .await?;

        let status = response.status();
        let parsed: Value = response.json().await?;

        if !status.is_success() {
            let message = parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or_default();

            if message.starts_with("EMAIL_EXISTS") {
                return Err(ServiceError::EmailInUse(email.to_string()));
            }
            return Err(ServiceError::Backend {
                service: "identity".to_string(),
                details: format!("{status}: {message}"),
            });
        }

        parsed
            .pointer("/localId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Backend {
                service: "identity".to_string(),
                details: "sign-up reply has no localId".to_string(),
            })
    }

    async fn find_user(&self, email: &str) -> Result<Option<String>, ServiceError> {
        let mut request = self
            .client
            .post(self.accounts_url("lookup"))
            .json(&json!({ "email": [email] }));

        if let Some(token) = &self.admin_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let parsed: Value = response.json().await?;

        if !status.is_success() {
            let message = parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or_default();

            if message.starts_with("USER_NOT_FOUND") || message.starts_with("EMAIL_NOT_FOUND") {
                return Ok(None);
            }
            return Err(ServiceError::Backend {
                service: "identity".to_string(),
                details: format!("{status}: {message}"),
            });
        }

        Ok(parsed
            .pointer("/users/0/localId")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

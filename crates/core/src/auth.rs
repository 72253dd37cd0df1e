use crate::error::ServiceError;
use crate::traits::AuthBackend;
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 6;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$";

fn email_regex() -> Result<Regex, ServiceError> {
    Ok(Regex::new(EMAIL_PATTERN)?)
}

pub fn validate_email(email: &str) -> Result<(), ServiceError> {
    if !email_regex()?.is_match(email) {
        return Err(ServiceError::InvalidInput(
            "invalid email address".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Registers a new account. Email shape and password length are validated
/// locally before the backend is called; a duplicate email surfaces as
/// [`ServiceError::EmailInUse`].
pub async fn register_user(
    backend: &dyn AuthBackend,
    email: &str,
    password: &str,
) -> Result<String, ServiceError> {
    validate_email(email)?;
    validate_password(password)?;
    backend.create_user(email, password).await
}

/// Resolves an email to its user id for login.
///
/// Only account existence is verified server-side; the password is not
/// checked against the backend. This mirrors the admin-credential flow the
/// product uses and is a known gap: real credential verification belongs to
/// a client-side sign-in step, and per-user data isolation relies on the
/// stores' access rules.
pub async fn login_user(
    backend: &dyn AuthBackend,
    email: &str,
    password: &str,
) -> Result<String, ServiceError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ServiceError::InvalidInput(
            "email and password are required".to_string(),
        ));
    }

    match backend.find_user(email).await? {
        Some(user_id) => Ok(user_id),
        None => Err(ServiceError::InvalidCredentials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        users: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn create_user(&self, email: &str, _password: &str) -> Result<String, ServiceError> {
            let mut users = self.users.lock().unwrap();
            if users.contains_key(email) {
                return Err(ServiceError::EmailInUse(email.to_string()));
            }
            let user_id = format!("uid-{}", users.len() + 1);
            users.insert(email.to_string(), user_id.clone());
            Ok(user_id)
        }

        async fn find_user(&self, email: &str) -> Result<Option<String>, ServiceError> {
            Ok(self.users.lock().unwrap().get(email).cloned())
        }
    }

    #[tokio::test]
    async fn register_then_login_resolves_the_same_user_id() {
        let backend = FakeBackend::default();

        let registered = register_user(&backend, "ana@example.com", "segredo1")
            .await
            .unwrap();
        let logged_in = login_user(&backend, "ana@example.com", "segredo1")
            .await
            .unwrap();

        assert_eq!(registered, logged_in);
    }

    #[tokio::test]
    async fn malformed_email_is_rejected_locally() {
        let backend = FakeBackend::default();
        let result = register_user(&backend, "not-an-email", "segredo1").await;

        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert!(backend.users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_password_is_rejected_locally() {
        let backend = FakeBackend::default();
        let result = register_user(&backend, "ana@example.com", "12345").await;

        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn duplicate_email_maps_to_email_in_use() {
        let backend = FakeBackend::default();
        register_user(&backend, "ana@example.com", "segredo1")
            .await
            .unwrap();

        let result = register_user(&backend, "ana@example.com", "outro-segredo").await;
        assert!(matches!(result, Err(ServiceError::EmailInUse(_))));
    }

    #[tokio::test]
    async fn unknown_account_is_invalid_credentials() {
        let backend = FakeBackend::default();
        let result = login_user(&backend, "ghost@example.com", "whatever").await;

        assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn blank_credentials_short_circuit() {
        let backend = FakeBackend::default();
        let result = login_user(&backend, "", "").await;

        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}

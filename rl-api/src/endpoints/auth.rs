//! Login endpoint.

use tracing::info;

use rl_core::error::{RlError, RlResult};
use rl_models::Credential;

use crate::client::ApiClient;
use crate::response::LoginBody;

impl ApiClient {
    /// Log in with username and password.
    ///
    /// On success the returned credential is also installed on this client,
    /// so every following request is authenticated.
    pub async fn login(&self, user: &str, password: &str) -> RlResult<Credential> {
        let body = serde_json::json!({ "user": user, "password": password });
        let resp = self.post("/login", &body).await.map_err(|e| match e {
            RlError::Auth(reason) | RlError::ServerError { message: reason, .. } => {
                RlError::Auth(reason)
            }
            other => other,
        })?;
        let parsed: LoginBody = Self::parse_response(resp)
            .await
            .map_err(|e| match e {
                RlError::ServerError { message, .. } => RlError::Auth(message),
                other => other,
            })?;
        let data = parsed
            .data
            .ok_or_else(|| RlError::Auth("login response carried no token".into()))?;

        let credential = Credential::new(data.user_id, data.auth_token);
        info!("logged in as {user} ({})", credential.user_id);
        self.set_credential(credential.clone()).await;
        Ok(credential)
    }

    /// Drop the credential held by this client.
    pub async fn logout(&self) {
        self.clear_credential().await;
    }
}

use super::{
    client::{error_from_response, ApiClient},
    types::{ApiError, LoginRequest, SsoRequest, TokenResponse},
};
use crate::{state::session::keys, utils::storage::KeyValueStore};

impl ApiClient {
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let request = LoginRequest {
            username: email.to_string(),
            password: password.to_string(),
        };
        let base_url = self.resolved_base_url().await;
        let response = self
            .http_client()
            .post(format!("{}/auth/login", base_url))
            .form(&request)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        self.finish_sign_in(response).await
    }

    pub async fn sso_login(&self, email: &str) -> Result<TokenResponse, ApiError> {
        let request = SsoRequest {
            email: email.to_string(),
        };
        let base_url = self.resolved_base_url().await;
        let response = self
            .http_client()
            .post(format!("{}/auth/sso", base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        self.finish_sign_in(response).await
    }

    async fn finish_sign_in(&self, response: reqwest::Response) -> Result<TokenResponse, ApiError> {
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::unknown(format!("Failed to parse response: {}", e)))?;
        persist_session(self.session().storage(), &token)?;
        log::info!("signed in as {}", token.role.as_str());
        Ok(token)
    }
}

pub(crate) fn persist_session(
    storage: &dyn KeyValueStore,
    response: &TokenResponse,
) -> Result<(), ApiError> {
    let user_json = serde_json::to_string(&response.session_user())
        .map_err(|_| ApiError::unknown("Failed to serialize user profile"))?;
    storage
        .set(keys::TOKEN, &response.access_token)
        .map_err(|e| ApiError::unknown(e.to_string()))?;
    storage
        .set(keys::USER, &user_json)
        .map_err(|e| ApiError::unknown(e.to_string()))?;
    Ok(())
}

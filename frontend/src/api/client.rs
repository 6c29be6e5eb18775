use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    api::types::{ApiError, ErrorBody},
    config,
    state::session::SessionStore,
};

/// Cheap authenticated endpoint used to confirm a stored token.
pub const SESSION_PROBE_PATH: &str = "/api/attendance/today-status";

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Option<String>,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(session: SessionStore) -> Self {
        Self {
            client: Client::new(),
            base_url: None,
            session,
        }
    }

    pub fn new_with_base_url(base_url: impl Into<String>, session: SessionStore) -> Self {
        Self {
            client: Client::new(),
            base_url: Some(config::normalize_base_url(&base_url.into())),
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    pub(crate) async fn resolved_base_url(&self) -> String {
        if let Some(base) = &self.base_url {
            base.clone()
        } else {
            config::await_api_base_url().await
        }
    }

    fn get_auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let token = self
            .session
            .read()
            .token
            .ok_or_else(|| ApiError::unauthorized("No token"))?;
        bearer_headers(&token)
    }

    fn handle_unauthorized_status(&self, status: StatusCode) {
        if status == StatusCode::UNAUTHORIZED {
            self.session.clear();
            redirect_to_login_if_needed();
        }
    }

    /// Sends one authenticated request and reports the status it came back
    /// with. `Err` means the request never completed.
    pub async fn probe_session(&self, token: &str) -> Result<StatusCode, ApiError> {
        let headers = bearer_headers(token)?;
        let base_url = self.resolved_base_url().await;
        let response = self
            .client
            .get(format!("{}{}", base_url, SESSION_PROBE_PATH))
            .headers(headers)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        Ok(response.status())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let headers = self.get_auth_headers()?;
        let base_url = self.resolved_base_url().await;
        let response = self
            .client
            .get(format!("{}{}", base_url, path))
            .headers(headers)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;

        let status = response.status();
        self.handle_unauthorized_status(status);
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ApiError::unknown(format!("Failed to parse response: {}", e)))
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Today's check-in record, or `None` when the user has not checked in.
    pub async fn today_status(&self) -> Result<Option<Value>, ApiError> {
        let value: Value = self.get_json(SESSION_PROBE_PATH).await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }
}

pub(crate) fn bearer_headers(token: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ApiError::unauthorized("Invalid token format"))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

pub(crate) async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message(),
        Err(_) => format!("Request failed with status {}", status.as_u16()),
    };
    if status == StatusCode::UNAUTHORIZED {
        ApiError::unauthorized(message)
    } else {
        ApiError {
            error: message,
            code: format!("HTTP_{}", status.as_u16()),
            details: None,
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn redirect_to_login_if_needed() {
    if let Some(window) = web_sys::window() {
        let location = window.location();
        if let Ok(pathname) = location.pathname() {
            if pathname == crate::router::LOGIN_PATH {
                return;
            }
        }
        let _ = location.set_href(crate::router::LOGIN_PATH);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn redirect_to_login_if_needed() {}

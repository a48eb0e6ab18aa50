use crate::error::TransportError;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use runctl_core::settings::{parse_optional_positive_u64_env, SettingsError};
use runctl_core::{RUNCTL_ENV_CONNECT_TIMEOUT_MS, RUNCTL_ENV_REQUEST_TIMEOUT_MS};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

const CONNECT_TIMEOUT_MS_DEFAULT: u64 = 5_000;
const REQUEST_TIMEOUT_MS_DEFAULT: u64 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical request. Bodies are always JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: None,
        }
    }

    pub fn post_json<B: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &B,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        let body = serde_json::to_vec(body).map_err(|err| TransportError::InvalidRequest {
            url: url.clone(),
            message: err.to_string(),
        })?;
        Ok(Self {
            method: HttpMethod::Post,
            url,
            body: Some(body),
        })
    }
}

/// Sends a request exactly once. Retrying is layered on top by
/// [`crate::Transport`].
pub trait HttpSend: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS_DEFAULT),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS_DEFAULT),
        }
    }
}

pub fn resolve_client_settings_from_env() -> Result<ClientSettings, SettingsError> {
    let mut settings = ClientSettings::default();
    if let Some(connect_timeout_ms) = parse_optional_positive_u64_env(RUNCTL_ENV_CONNECT_TIMEOUT_MS)?
    {
        settings.connect_timeout = Duration::from_millis(connect_timeout_ms);
    }
    if let Some(request_timeout_ms) = parse_optional_positive_u64_env(RUNCTL_ENV_REQUEST_TIMEOUT_MS)?
    {
        settings.request_timeout = Duration::from_millis(request_timeout_ms);
    }
    Ok(settings)
}

#[derive(Clone)]
pub struct ReqwestSender {
    client: HttpClient,
    bearer_token: Option<String>,
}

impl ReqwestSender {
    pub fn new(
        settings: &ClientSettings,
        bearer_token: Option<String>,
    ) -> Result<Self, TransportError> {
        let client = HttpClient::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| TransportError::InvalidRequest {
                url: String::new(),
                message: format!("failed to build http client: {}", err),
            })?;
        Ok(Self {
            client,
            bearer_token,
        })
    }

    fn reqwest_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl HttpSend for ReqwestSender {
    fn send(&self, request: &ApiRequest) -> Result<Vec<u8>, TransportError> {
        let network_error = |err: reqwest::Error| TransportError::Network {
            method: request.method,
            url: request.url.clone(),
            message: err.to_string(),
        };
        let mut builder = self
            .client
            .request(Self::reqwest_method(request.method), &request.url);
        if let Some(token) = self.bearer_token.as_ref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        let response = builder.send().map_err(network_error)?;
        let status = response.status();
        let bytes = response.bytes().map_err(network_error)?;
        if !status.is_success() {
            return Err(TransportError::Status {
                method: request.method,
                url: request.url.clone(),
                code: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

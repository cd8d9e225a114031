//! REST client
//!
//! Every request carries `Authorization: Bot <token>` and targets the
//! versioned API root; `path` is the part after it, e.g. `/users/@me`.

use std::time::Duration;

use discobra_common::RestConfig;
use discobra_core::{entities, User};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Serialize;
use serde_json::Value;

use crate::error::{RestError, RestResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP method with the statuses the API returns on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// Check whether `status` counts as success for this method
    #[must_use]
    pub fn accepts(self, status: u16) -> bool {
        match self {
            Self::Get | Self::Delete => matches!(status, 200 | 204),
            Self::Post => matches!(status, 200 | 201 | 204),
            Self::Patch => matches!(status, 200 | 204),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Successful response: status plus JSON body (`Null` for empty bodies)
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Value,
}

impl RestResponse {
    /// Decode the body into an entity schema
    pub fn decode<T: serde::de::DeserializeOwned>(&self, kind: &'static str) -> RestResult<T> {
        Ok(entities::decode(kind, Some(&self.body))?)
    }
}

/// Authenticated REST client
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for the versioned API root in `config`
    pub fn new(config: &RestConfig, token: &str) -> RestResult<Self> {
        Self::with_base_url(config.versioned_url(), token)
    }

    /// Create a client against an explicit API root
    pub fn with_base_url(base_url: impl Into<String>, token: &str) -> RestResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|e| RestError::InvalidToken(e.to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "DiscordBot (discobra, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Get the API root requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> RestResult<RestResponse> {
        self.request::<()>(Method::Get, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RestResult<RestResponse> {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RestResult<RestResponse> {
        self.request(Method::Patch, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> RestResult<RestResponse> {
        self.request::<()>(Method::Delete, path, None).await
    }

    /// Fetch the full profile of the account behind the token
    pub async fn current_user(&self) -> RestResult<User> {
        self.get("/users/@me").await?.decode("user")
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> RestResult<RestResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.to_reqwest(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        let body = if bytes.is_empty() {
            Value::Null
        } else if method.accepts(status) {
            serde_json::from_slice(&bytes).map_err(RestError::InvalidBody)?
        } else {
            // Error bodies are best effort; the status alone is enough
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        tracing::debug!(method = method.as_str(), path = %path, status, "REST request completed");

        if method.accepts(status) {
            Ok(RestResponse { status, body })
        } else {
            tracing::warn!(method = method.as_str(), path = %path, status, "REST request rejected");
            Err(RestError::from_response(status, &body))
        }
    }
}

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments")]
    BaseUrl,
    #[error("key is empty")]
    EmptyKey,
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Client for a single key-value namespace.
#[derive(Clone)]
pub struct KvClient {
    http: Client,
    base_url: Url,
    account_id: String,
    namespace_id: String,
    token: String,
}

impl KvClient {
    pub fn new(
        account_id: impl Into<String>,
        namespace_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, KvError> {
        Self::with_base_url(DEFAULT_BASE_URL, account_id, namespace_id, token)
    }

    pub fn with_base_url(
        base_url: &str,
        account_id: impl Into<String>,
        namespace_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, KvError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(KvError::BaseUrl);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            account_id: account_id.into(),
            namespace_id: namespace_id.into(),
            token: token.into(),
        })
    }

    /// Stores `body` under `key`, overwriting any previous value.
    pub async fn put_value(&self, key: &str, body: &str) -> Result<(), KvError> {
        let url = self.value_url(key)?;
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body.to_string())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_value(&self, key: &str) -> Result<(), KvError> {
        let url = self.value_url(key)?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    // The key is a single path segment, so `/` inside it is percent-encoded.
    fn value_url(&self, key: &str) -> Result<Url, KvError> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| KvError::BaseUrl)?
            .pop_if_empty()
            .extend([
                "client",
                "v4",
                "accounts",
                self.account_id.as_str(),
                "storage",
                "kv",
                "namespaces",
                self.namespace_id.as_str(),
                "values",
            ])
            .push(key);
        Ok(url)
    }

    async fn handle_response(response: reqwest::Response) -> Result<(), KvError> {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let envelope = serde_json::from_str::<Envelope>(&text).ok();
        match envelope {
            Some(envelope)
                if status.is_success() && (envelope.success || envelope.errors.is_empty()) =>
            {
                Ok(())
            }
            None if status.is_success() => Ok(()),
            Some(envelope) => Err(KvError::Api {
                status,
                body: envelope
                    .describe()
                    .unwrap_or_else(|| truncate_body(&text)),
            }),
            None => Err(KvError::Api {
                status,
                body: truncate_body(&text),
            }),
        }
    }
}

// Non-envelope bodies are often whole proxy error pages.
fn truncate_body(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

impl Envelope {
    fn describe(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|err| format!("{} ({})", err.message, err.code))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

//! HTTP client for the regvaultd API.

use regvault_core::types::{ErrorBody, ListedStudent, StudentAck};
use regvault_core::FieldMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx response; `message` comes from the `{ message }` body when present.
    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status(),
        }
    }
}

pub struct ApiClient {
    client: Client,
    base: String,
}

impl ApiClient {
    /// `base` is the API root, e.g. `http://localhost:5000/api`.
    pub fn new(base: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub async fn register(&self, fields: &FieldMap) -> ClientResult<StudentAck> {
        let req = self.client.post(self.url("/register")).json(fields);
        self.send(req).await
    }

    pub async fn list(&self) -> ClientResult<Vec<ListedStudent>> {
        self.send(self.client.get(self.url("/students"))).await
    }

    pub async fn update(&self, id: &str, fields: &FieldMap) -> ClientResult<StudentAck> {
        let req = self
            .client
            .put(self.url(&format!("/student/{id}")))
            .json(fields);
        self.send(req).await
    }

    pub async fn delete(&self, id: &str) -> ClientResult<StudentAck> {
        let req = self.client.delete(self.url(&format!("/student/{id}")));
        self.send(req).await
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<StudentAck> {
        let req = self
            .client
            .post(self.url("/login"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        self.send(req).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        let resp = req.send().await?;
        let status = resp.status();
        debug!(status = %status, url = %resp.url(), "api response");

        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        Err(ClientError::Api { status, message })
    }
}

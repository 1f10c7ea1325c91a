//! Authenticated, retrying HTTP client for the in-container automation
//! server.
//!
//! Every call attaches the session password header, goes through the
//! retry layer, and turns non-success statuses into [`SandboxError::Rpc`]
//! carrying the response body. Requests are rebuilt from owned data on
//! each attempt, so multipart uploads retry cleanly. The server takes
//! most arguments as query parameters; a few routes take JSON bodies.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::error::SandboxError;
use crate::retry::{RetryPolicy, retry};

const SESSION_PASSWORD_HEADER: &str = "X-Session-Password";

pub type Query = Vec<(&'static str, String)>;

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
    session_password: Option<String>,
    policy: RetryPolicy,
}

/// One multipart file upload: field contents plus the destination path
/// the server writes it to.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub remote_path: String,
}

#[derive(Debug, Clone)]
enum Payload {
    None,
    Json(serde_json::Value),
    File(FileUpload),
}

impl RpcClient {
    pub fn new(base_url: &str, session_password: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_password,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SandboxError> {
        let body = self
            .send(Method::GET, path, Vec::new(), Payload::None, None)
            .await?;
        decode(&body)
    }

    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
    ) -> Result<T, SandboxError> {
        let body = self.send(Method::GET, path, query, Payload::None, None).await?;
        decode(&body)
    }

    /// GET returning the raw body (screenshots, file downloads).
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        self.send(Method::GET, path, Vec::new(), Payload::None, None)
            .await
    }

    pub async fn get_bytes_query(
        &self,
        path: &str,
        query: Query,
    ) -> Result<Vec<u8>, SandboxError> {
        self.send(Method::GET, path, query, Payload::None, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T, SandboxError> {
        let body = self
            .send(Method::POST, path, Vec::new(), Payload::None, None)
            .await?;
        decode(&body)
    }

    pub async fn post_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
    ) -> Result<T, SandboxError> {
        let body = self.send(Method::POST, path, query, Payload::None, None).await?;
        decode(&body)
    }

    /// POST whose response body the caller does not care about.
    pub async fn post_query_unit(&self, path: &str, query: Query) -> Result<(), SandboxError> {
        self.send(Method::POST, path, query, Payload::None, None)
            .await?;
        Ok(())
    }

    /// POST with a per-request timeout override, for calls whose duration
    /// the caller controls (e.g. command execution).
    pub async fn post_query_with_timeout<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
        timeout: Option<Duration>,
    ) -> Result<T, SandboxError> {
        let body = self
            .send(Method::POST, path, query, Payload::None, timeout)
            .await?;
        decode(&body)
    }

    /// POST a JSON body; the body may be any JSON value, not only an
    /// object (the key-press route takes a bare string or array).
    pub async fn post_json_unit(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), SandboxError> {
        self.send(Method::POST, path, Vec::new(), Payload::Json(body), None)
            .await?;
        Ok(())
    }

    /// POST a multipart file upload.
    pub async fn post_file(&self, path: &str, upload: FileUpload) -> Result<(), SandboxError> {
        self.send(Method::POST, path, Vec::new(), Payload::File(upload), None)
            .await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Query,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, SandboxError> {
        let url = self.url(path);
        let op = format!("{method} {path}");
        retry(&self.policy, &op, || {
            let url = url.clone();
            let method = method.clone();
            let query = query.clone();
            let payload = payload.clone();
            async move {
                let mut request = self.http.request(method.clone(), &url);
                if let Some(password) = &self.session_password {
                    request = request.header(SESSION_PASSWORD_HEADER, password);
                }
                if !query.is_empty() {
                    request = request.query(&query);
                }
                if let Some(timeout) = timeout {
                    request = request.timeout(timeout);
                }
                request = match payload {
                    Payload::None => request,
                    Payload::Json(value) => request.json(&value),
                    Payload::File(upload) => {
                        let part = reqwest::multipart::Part::bytes(upload.data)
                            .file_name(upload.file_name);
                        let form = reqwest::multipart::Form::new()
                            .part("file_data", part)
                            .text("file_path", upload.remote_path);
                        request.multipart(form)
                    }
                };
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SandboxError::Rpc {
                        method: method.to_string(),
                        url,
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
        })
        .await
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, SandboxError> {
    serde_json::from_slice(body).map_err(|e| SandboxError::Serde(e.to_string()))
}

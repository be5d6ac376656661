//! The pluggable HTTP transport (§2 component 2, §4.6) plus the bundled
//! `reqwest`-backed implementation (§4.7).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::Result;

/// What a Chunk needs back from a request: just enough to decide "server has
/// this chunk" (status == 200) or "upload succeeded" (status is 2xx). No
/// response body is consumed by the protocol, but it is exposed for callers
/// who plug in their own transport and want it.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET/POST requests. Implementations must be safe for concurrent use
/// across scheduler workers (§5).
#[async_trait]
pub trait HttpSession: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse>;

    /// `fields` are sent as multipart text parts; `file_bytes` as a part
    /// named `file_field`.
    async fn post(
        &self,
        url: &str,
        fields: &[(String, String)],
        file_field: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
    ) -> Result<HttpResponse>;
}

/// Lets a type-erased `Arc<dyn HttpSession>` be used anywhere a concrete
/// `HttpSession` is expected, so `Session` can hold one boxed transport
/// instead of being generic over it.
#[async_trait]
impl HttpSession for Arc<dyn HttpSession> {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse> {
        self.as_ref().get(url, query).await
    }

    async fn post(
        &self,
        url: &str,
        fields: &[(String, String)],
        file_field: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
    ) -> Result<HttpResponse> {
        self.as_ref()
            .post(url, fields, file_field, file_name, file_bytes)
            .await
    }
}

/// A `Session`-bound transport: the shared `HttpSession`, fixed to the
/// upload target URL.
pub type BoundSession = UrlFixedSession<Arc<dyn HttpSession>>;

/// Thin adapter that sits between a Chunk and the shared `HttpSession`,
/// sparing Chunk code from knowing the target URL (§4.6).
#[derive(Clone)]
pub struct UrlFixedSession<S> {
    session: S,
    url: String,
}

impl<S> UrlFixedSession<S>
where
    S: HttpSession,
{
    pub fn new(session: S, url: impl Into<String>) -> Self {
        Self {
            session,
            url: url.into(),
        }
    }

    pub async fn get(&self, query: &[(String, String)]) -> Result<HttpResponse> {
        self.session.get(&self.url, query).await
    }

    pub async fn post(
        &self,
        fields: &[(String, String)],
        file_field: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
    ) -> Result<HttpResponse> {
        self.session
            .post(&self.url, fields, file_field, file_name, file_bytes)
            .await
    }
}

/// Bundled `HttpSession` backed by a shared `reqwest::Client`. Cheaply
/// cloned: the underlying client is itself `Arc`-backed, so every scheduler
/// worker can hold its own `ReqwestSession` without extra synchronization.
#[derive(Clone)]
pub struct ReqwestSession {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl ReqwestSession {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            client: reqwest::Client::new(),
            headers,
        }
    }
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::user_agent())
            .headers(self.headers.clone())
            .query(query)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }

    async fn post(
        &self,
        url: &str,
        fields: &[(String, String)],
        file_field: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
    ) -> Result<HttpResponse> {
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in fields {
            form = form.text(key.clone(), value.clone());
        }
        let part = reqwest::multipart::Part::bytes(file_bytes).file_name(file_name.to_string());
        form = form.part(file_field.to_string(), part);

        let response = self
            .client
            .post(url)
            .header(reqwest::header::USER_AGENT, crate::user_agent())
            .headers(self.headers.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}

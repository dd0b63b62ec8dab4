//! Interactive session eviction
//!
//! Notebook kernels may hold the motor bus open. Before the daemon starts,
//! every kernel on the local notebook server is shut down. The server wants a
//! CSRF token, which it hands out as the `_xsrf` cookie on its landing page.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Notebook server on the robot
pub const DEFAULT_SESSION_URL: &str = "http://localhost:8888";

const XSRF_COOKIE: &str = "_xsrf";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session server request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session server returned {0}")]
    Status(reqwest::StatusCode),
}

/// Something that can evict interactive sessions
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Shut down every session; returns how many were evicted
    ///
    /// A session that refuses to go is logged and skipped.
    async fn evict_all(&self) -> Result<usize, SessionError>;
}

#[derive(Debug, Deserialize)]
struct Kernel {
    id: String,
}

/// Kernel eviction against a local notebook server
pub struct NotebookSessions {
    client: reqwest::Client,
    base_url: String,
}

impl NotebookSessions {
    pub fn new(base_url: &str) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_token(&self) -> Result<Option<String>, SessionError> {
        let response = self.client.get(format!("{}/", self.base_url)).send().await?;
        Ok(xsrf_from_headers(response.headers()))
    }
}

/// Extract the `_xsrf` value from `Set-Cookie` headers
fn xsrf_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == XSRF_COOKIE).then(|| value.to_string())
        })
}

#[async_trait]
impl SessionManager for NotebookSessions {
    async fn evict_all(&self) -> Result<usize, SessionError> {
        let token = self.fetch_token().await?;

        let response = self
            .client
            .get(format!("{}/api/kernels", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SessionError::Status(response.status()));
        }
        let kernels: Vec<Kernel> = response.json().await?;

        let mut evicted = 0;
        for kernel in &kernels {
            let mut request = self
                .client
                .delete(format!("{}/api/kernels/{}", self.base_url, kernel.id));
            if let Some(token) = &token {
                request = request
                    .header("X-XSRFToken", token)
                    .header(reqwest::header::COOKIE, format!("{}={}", XSRF_COOKIE, token));
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Evicted kernel {}", kernel.id);
                    evicted += 1;
                }
                Ok(response) => warn!("Kernel {} not evicted: {}", kernel.id, response.status()),
                Err(e) => warn!("Kernel {} not evicted: {}", kernel.id, e),
            }
        }

        if evicted > 0 {
            info!("Evicted {} interactive sessions", evicted);
        }
        Ok(evicted)
    }
}

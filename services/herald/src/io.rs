//! I/O abstractions for testability
//!
//! [`HttpClient`] covers the HTTP calls made by built-in notifiers and the
//! catalog client; [`ExtensionRunner`] covers running extension artifacts.
//! Both are mocked with mockall in unit tests.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::HeraldError;

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a GET request to the given URL
    async fn get(&self, url: &str) -> crate::Result<HttpResponse>;

    /// Send a POST request with form-encoded body
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> crate::Result<HttpResponse>;

    /// Send a POST request with a JSON body
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> crate::Result<HttpResponse>;
}

/// A timed-out request keeps its timeout classification.
fn request_error(method: &str, url: &str, e: reqwest::Error) -> HeraldError {
    if e.is_timeout() {
        HeraldError::Timeout(format!("{} {}: {}", method, url, e))
    } else {
        HeraldError::Http(format!("{} {} failed: {}", method, url, e))
    }
}

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Client whose requests fail once `timeout` elapses
    pub fn with_timeout(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeraldError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn finish(
        method: &str,
        url: &str,
        response: reqwest::Response,
    ) -> crate::Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| request_error("Reading response body from", url, e))?;

        tracing::debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;
        Self::finish("GET", url, response).await
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| request_error("POST", url, e))?;
        Self::finish("POST", url, response).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {} (json)", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error("POST", url, e))?;
        Self::finish("POST", url, response).await
    }
}

/// Runs an extension artifact as a child process
///
/// The artifact receives `command` as its only argument and `input` on
/// stdin; its stdout is returned. The child is killed if `timeout` elapses.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ExtensionRunner: Send + Sync {
    async fn run(
        &self,
        artifact: &Path,
        command: &str,
        input: &str,
        timeout: Duration,
    ) -> crate::Result<String>;
}

/// Tokio implementation of ExtensionRunner
#[derive(Debug, Default, Clone)]
pub struct ProcessExtensionRunner;

impl ProcessExtensionRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtensionRunner for ProcessExtensionRunner {
    async fn run(
        &self,
        artifact: &Path,
        command: &str,
        input: &str,
        timeout: Duration,
    ) -> crate::Result<String> {
        tracing::debug!("Running extension {} {}", artifact.display(), command);

        let mut child = Command::new(artifact)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HeraldError::Extension(format!("Failed to start {}: {}", artifact.display(), e))
            })?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                if !input.is_empty() {
                    if let Err(e) = stdin.write_all(input.as_bytes()).await {
                        // The artifact may exit without reading its input.
                        if e.kind() != std::io::ErrorKind::BrokenPipe {
                            return Err(e);
                        }
                    }
                }
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| {
                HeraldError::Timeout(format!(
                    "{} {} did not finish within {:?}",
                    artifact.display(),
                    command,
                    timeout
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HeraldError::Extension(format!(
                "{} {} exited with {}: {}",
                artifact.display(),
                command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

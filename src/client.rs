//! HTTP client for the job API, used by the `jobworker job` subcommands.

use std::path::{Path, PathBuf};

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::types::{
    ErrorResponse, ListResponse, OutputResponse, StartRequest, StartResponse, StatusResponse,
    StopResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://localhost:8443";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to read CA certificate {path}: {source}")]
    CaCert {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job not found")]
    NotFound,

    #[error("Unauthorized: check the bearer token")]
    Unauthorized,

    #[error("Server error ({status}): {message}")]
    Server { status: StatusCode, message: String },
}

pub struct JobClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl JobClient {
    /// Build a client for `base_url`. When `ca_pem` is given it is added to
    /// the trusted roots, so self-signed deployments can be reached.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        ca_pem: Option<&[u8]>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(pem) = ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Like [`JobClient::new`], reading the CA certificate from a file.
    pub async fn with_ca_file(
        base_url: impl Into<String>,
        token: impl Into<String>,
        ca_path: Option<&Path>,
    ) -> Result<Self, ClientError> {
        let ca_pem = match ca_path {
            Some(path) => Some(tokio::fs::read(path).await.map_err(|source| {
                ClientError::CaCert {
                    path: path.to_path_buf(),
                    source,
                }
            })?),
            None => None,
        };
        Self::new(base_url, token, ca_pem.as_deref())
    }

    pub async fn start(&self, program: &str, args: &[String]) -> Result<StartResponse, ClientError> {
        let body = StartRequest {
            program: program.to_string(),
            args: args.to_vec(),
        };
        self.send(self.http.post(self.url("/jobs/start")).json(&body))
            .await
    }

    pub async fn stop(&self, id: &str) -> Result<StopResponse, ClientError> {
        self.send(self.http.post(self.url(&format!("/jobs/{id}/stop"))))
            .await
    }

    pub async fn status(&self, id: &str) -> Result<StatusResponse, ClientError> {
        self.send(self.http.get(self.url(&format!("/jobs/{id}"))))
            .await
    }

    pub async fn output(&self, id: &str) -> Result<OutputResponse, ClientError> {
        self.send(self.http.get(self.url(&format!("/jobs/{id}/output"))))
            .await
    }

    pub async fn list(&self) -> Result<ListResponse, ClientError> {
        self.send(self.http.get(self.url("/jobs"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound,
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            _ => ClientError::Server { status, message },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = JobClient::new("https://localhost:8443/", "t", None).unwrap();
        assert_eq!(client.url("/jobs"), "https://localhost:8443/jobs");
    }

    #[tokio::test]
    async fn missing_ca_file_is_reported() {
        let result =
            JobClient::with_ca_file(DEFAULT_BASE_URL, "t", Some(Path::new("/nonexistent/ca.pem")))
                .await;
        assert!(matches!(result, Err(ClientError::CaCert { .. })));
    }
}

use crate::codec::Compressor;
use crate::constants::{
    DEFAULT_REMOTE_ENDPOINT, REMOTE_SHRINK_PATH, REMOTE_USER, REMOTE_WORKER_THREADS,
};
use crate::error::{RemoteError, Result, SqueezeError};
use crate::processing::read_source;
use crate::router::Codec;
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Connection settings for the remote compression service.
///
/// Built by the entry point from flags, environment and the persisted
/// config, then handed to [`RemoteCompressor::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            api_key: None,
            timeout: None,
        }
    }
}

impl RemoteSettings {
    pub fn new(endpoint: Option<String>, api_key: Option<String>, timeout: Option<Duration>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_REMOTE_ENDPOINT.to_string()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShrinkResponse {
    output: ShrinkOutput,
}

#[derive(Debug, Deserialize)]
struct ShrinkOutput {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Tinify-compatible HTTP client: upload the source, download the result.
pub struct RemoteCompressor {
    client: Client,
    runtime: Runtime,
    endpoint: String,
    api_key: String,
}

impl RemoteCompressor {
    /// Fails with [`SqueezeError::MissingApiKey`] when no credential is set.
    pub fn new(settings: &RemoteSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or(SqueezeError::MissingApiKey)?;

        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SqueezeError::Remote(RemoteError::Network(e.to_string())))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(REMOTE_WORKER_THREADS)
            .thread_name("squeeze-remote")
            .enable_all()
            .build()?;

        Ok(Self {
            client,
            runtime,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn shrink_async(&self, data: Vec<u8>) -> std::result::Result<Vec<u8>, RemoteError> {
        let response = self
            .client
            .post(format!("{}{}", self.endpoint, REMOTE_SHRINK_PATH))
            .basic_auth(REMOTE_USER, Some(&self.api_key))
            .body(data)
            .send()
            .await?;

        let response = check_status(response).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let output_url = match location {
            Some(url) => url,
            None => {
                let body: ShrinkResponse = response
                    .json()
                    .await
                    .map_err(|e| RemoteError::Protocol(format!("missing output location: {}", e)))?;
                body.output.url
            }
        };

        let download = self
            .client
            .get(&output_url)
            .basic_auth(REMOTE_USER, Some(&self.api_key))
            .send()
            .await?;
        let download = check_status(download).await?;
        let bytes = download.bytes().await?;
        if bytes.is_empty() {
            return Err(RemoteError::Protocol("empty download".to_string()));
        }

        Ok(bytes.to_vec())
    }

    /// Blocking wrapper, callable from worker threads outside the runtime.
    pub fn shrink(&self, data: Vec<u8>) -> std::result::Result<Vec<u8>, RemoteError> {
        self.runtime.block_on(self.shrink_async(data))
    }
}

async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(RemoteError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(RemoteError::QuotaExceeded),
        _ => {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let message = match (body.error.is_empty(), body.message.is_empty()) {
                (false, false) => format!("{}: {}", body.error, body.message),
                (false, true) => body.error,
                (true, false) => body.message,
                (true, true) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            if status.is_server_error() {
                Err(RemoteError::Server {
                    status: status.as_u16(),
                    message,
                })
            } else {
                Err(RemoteError::Client {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

impl Compressor for RemoteCompressor {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn compress(&self, source: &Path, codec: &Codec) -> Result<Vec<u8>> {
        let data = read_source(source)?;
        tracing::debug!(path = %source.display(), ?codec, bytes = data.len(), "uploading to remote service");
        Ok(self.shrink(data)?)
    }
}

// NetStorage HTTP API client: signed dir/download requests against one
// storage hostname. https://techdocs.akamai.com/netstorage-usage/reference

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

const ACTION_HEADER: &str = "X-Akamai-ACS-Action";
const AUTH_DATA_HEADER: &str = "X-Akamai-ACS-Auth-Data";
const AUTH_SIGN_HEADER: &str = "X-Akamai-ACS-Auth-Sign";

const DIR_ACTION: &str = "version=1&action=dir&format=xml&encoding=utf-8";
const DOWNLOAD_ACTION: &str = "version=1&action=download";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("netstorage path must begin with /: {0}")]
    InvalidPath(String),
    #[error("invalid netstorage url for {path}: {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("netstorage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("netstorage returned {status} for {path}")]
    Status { path: String, status: StatusCode },
    #[error("failed to write {}: {source}", dest.display())]
    Io {
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The two storage capabilities the downloader needs. Substitute
/// implementations stand in for the network in tests.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetches the raw XML listing for `directory`.
    async fn list_dir(&self, directory: &str) -> Result<String, StorageError>;

    /// Fetches the remote file at `path` into the client's destination and
    /// returns the number of bytes written. Fails on any non-success status.
    async fn download(&self, path: &str) -> Result<u64, StorageError>;
}

/// Client for one NetStorage account, holding the upload-account key used
/// to sign every request.
pub struct NetstorageClient {
    http: reqwest::Client,
    hostname: String,
    keyname: String,
    key: String,
    ssl: bool,
    output_dir: PathBuf,
}

impl NetstorageClient {
    pub fn new(
        hostname: impl Into<String>,
        keyname: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            hostname: hostname.into(),
            keyname: keyname.into(),
            key: key.into(),
            ssl: true,
            output_dir: PathBuf::from("."),
        }
    }

    /// Plain HTTP instead of HTTPS. Tests point this at a local stand-in
    /// server; production stays on TLS.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Directory downloaded files are written into.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    fn url_for(&self, path: &str) -> Result<Url, StorageError> {
        if !path.starts_with('/') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        let scheme = if self.ssl { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}{path}", self.hostname)).map_err(|source| {
            StorageError::InvalidUrl {
                path: path.to_string(),
                source,
            }
        })
    }

    fn auth_data(&self) -> String {
        format!(
            "5, 0.0.0.0, 0.0.0.0, {}, {}, {}",
            Utc::now().timestamp(),
            rand::random::<u32>(),
            self.keyname
        )
    }

    async fn signed_get(&self, path: &str, action: &str) -> Result<reqwest::Response, StorageError> {
        let url = self.url_for(path)?;
        let auth_data = self.auth_data();
        // Sign over the percent-encoded path, which is what goes on the wire.
        let auth_sign = sign(&self.key, &auth_data, url.path(), action);

        let response = self
            .http
            .get(url)
            .header(ACTION_HEADER, action)
            .header(AUTH_DATA_HEADER, auth_data)
            .header(AUTH_SIGN_HEADER, auth_sign)
            .header("User-Agent", USER_AGENT)
            // Log payloads are already gzip; keep the transport from
            // re-coding them.
            .header("Accept-Encoding", "identity")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                path: path.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl StorageClient for NetstorageClient {
    async fn list_dir(&self, directory: &str) -> Result<String, StorageError> {
        let response = self.signed_get(directory, DIR_ACTION).await?;
        Ok(response.text().await?)
    }

    async fn download(&self, path: &str) -> Result<u64, StorageError> {
        let response = self.signed_get(path, DOWNLOAD_ACTION).await?;
        let dest = self.output_dir.join(basename(path));
        let written = persist(response.bytes_stream().boxed(), &dest).await?;
        log::debug!("wrote {} ({} bytes)", dest.display(), written);
        Ok(written)
    }
}

/// Version 5 request signature: HMAC-SHA256 over the auth data, the request
/// path and the action header, standard base64.
fn sign(key: &str, auth_data: &str, path: &str, action: &str) -> String {
    let message = format!("{auth_data}{path}\nx-akamai-acs-action:{action}\n");
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

async fn persist(
    mut stream: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    dest: &Path,
) -> Result<u64, StorageError> {
    use futures::stream::TryStreamExt; // for `try_next`

    let io_err = |source| StorageError::Io {
        dest: dest.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
    let mut written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;

    Ok(written)
}

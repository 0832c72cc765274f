// Audiocine - Audio description cinema for mobile
// Copyright (C) 2025 Audiocine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP access to media files
//!
//! Media is served behind HTTP Basic auth. The download worker talks to the
//! network only through [`MediaFetcher`], so tests can substitute a fake
//! byte source.

use crate::config::NetworkConfig;
use crate::error::{AudiocineError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Stored account credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Build the shared reqwest client
pub fn build_http_client(config: &NetworkConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(credentials) = &config.credentials {
        let mut value = HeaderValue::from_str(&credentials.authorization_header())
            .map_err(|e| AudiocineError::ConfigurationError(format!("Invalid credentials: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    let client = Client::builder()
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;

    Ok(client)
}

/// An opened media response
pub struct MediaBody {
    /// `Content-Length`, when the server sent one
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

impl fmt::Debug for MediaBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens a GET for a media URL
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fails with `UnexpectedStatusCode` on a non-2xx response
    async fn open(&self, url: &str) -> Result<MediaBody>;
}

pub struct HttpMediaFetcher {
    client: Client,
    read_timeout: Duration,
}

impl HttpMediaFetcher {
    pub fn new(client: Client, read_timeout: Duration) -> Self {
        Self { client, read_timeout }
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        Ok(Self::new(build_http_client(config)?, config.read_timeout()))
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn open(&self, url: &str) -> Result<MediaBody> {
        debug!(url, "Opening media stream");

        let response = tokio::time::timeout(self.read_timeout, self.client.get(url).send())
            .await
            .map_err(|_| AudiocineError::Timeout(self.read_timeout.as_secs()))?
            .map_err(|e| {
                let transient = e.is_timeout() || e.is_connect();
                AudiocineError::network_error(format!("Request failed: {}", e), transient)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AudiocineError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| AudiocineError::network_error(format!("Stream error: {}", e), true))
            })
            .boxed();

        Ok(MediaBody { content_length, stream })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let credentials = Credentials::new("Aladdin", "open sesame");
        assert_eq!(
            credentials.authorization_header(),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn test_debug_masks_password() {
        let credentials = Credentials::new("user", "hunter2");
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_sends_basic_auth_and_rejects_non_2xx() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/ok.mp3")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;
        let missing = server.mock("GET", "/missing.mp3").with_status(404).create_async().await;

        let config = NetworkConfig {
            credentials: Some(Credentials::new("user", "pass")),
            ..NetworkConfig::default()
        };
        let fetcher = HttpMediaFetcher::from_config(&config).expect("Failed to build client");

        let mut body = fetcher
            .open(&format!("{}/ok.mp3", server.url()))
            .await
            .expect("Failed to open");
        assert_eq!(body.content_length, Some(3));
        let mut received = Vec::new();
        while let Some(chunk) = body.stream.next().await {
            received.extend_from_slice(&chunk.expect("Failed to read chunk"));
        }
        assert_eq!(received, b"abc");

        let err = fetcher
            .open(&format!("{}/missing.mp3", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AudiocineError::UnexpectedStatusCode { status_code: 404, .. }));

        ok.assert_async().await;
        missing.assert_async().await;
    }
}

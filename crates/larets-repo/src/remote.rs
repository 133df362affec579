//! HTTP client for proxy origins
//!
//! Redirects are followed by hand so every hop is visible in the logs and a
//! hop to another origin is reported. Downloads stream straight into a
//! staged file; nothing becomes visible at the target path unless the whole
//! body arrived within the fetch timeout.

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, LOCATION};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{RepoError, Result};
use crate::paths::{WrittenFile, stage};

const MAX_REDIRECTS: u32 = 10;

/// Check if two URLs are same-origin
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}

/// Origin HTTP client
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpOrigin {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("larets/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .build()
            .map_err(|e| RepoError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    fn timed_out(&self, url: &str) -> RepoError {
        RepoError::Timeout {
            operation: format!("fetch {}", url),
            seconds: self.timeout.as_secs(),
        }
    }

    fn transport(url: &str, err: reqwest::Error) -> RepoError {
        RepoError::remote(url, err.status().map(|s| s.as_u16()), err.to_string())
    }

    /// GET `url`, following redirects; non-2xx is a remote fetch error
    pub async fn get(&self, url: &str, accept: Option<&str>) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::transport(&current_url, e))?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::remote(
                        url,
                        None,
                        format!("too many redirects (max {})", MAX_REDIRECTS),
                    ));
                }

                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        RepoError::remote(&current_url, None, "redirect without Location header")
                    })?;
                let next = Url::parse(&current_url)?.join(location)?.to_string();

                if !same_origin(url, &next) {
                    warn!("Cross-origin redirect from {} to {}", url, next);
                } else {
                    debug!(from = %current_url, to = %next, "following redirect");
                }
                current_url = next;
                continue;
            }

            if !status.is_success() {
                let reason = match status {
                    StatusCode::NOT_FOUND => "not found at origin".to_string(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        format!("origin refused access ({})", status)
                    }
                    _ => format!("origin returned {}", status),
                };
                return Err(RepoError::remote(&current_url, Some(status.as_u16()), reason));
            }

            return Ok(response);
        }
    }

    /// Fetch the whole body into memory
    pub async fn get_bytes(&self, url: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        let fetch = async {
            let response = self.get(url, accept).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Self::transport(url, e))?;
            Ok(bytes.to_vec())
        };

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| self.timed_out(url))?
    }

    /// Stream the body into `target` atomically
    ///
    /// On any failure, including the timeout, the partial file is removed
    /// and `target` is left untouched.
    pub async fn download(
        &self,
        url: &str,
        accept: Option<&str>,
        target: &Path,
    ) -> Result<WrittenFile> {
        let fetch = async {
            let response = self.get(url, accept).await?;
            let mut staged = stage(target).await?;

            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| Self::transport(url, e))?;
                staged.write(&chunk).await?;
            }
            staged.commit().await
        };

        let written = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| self.timed_out(url))??;

        debug!(%url, size = written.size, "downloaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_same_origin() {
        assert!(same_origin("https://example.com/a", "https://example.com/b"));
        assert!(same_origin("https://example.com:443/a", "https://example.com/b"));
        assert!(!same_origin("https://example.com/a", "http://example.com/a"));
        assert!(!same_origin("https://example.com/a", "https://cdn.example.com/a"));
        assert!(!same_origin("not a url", "https://example.com"));
    }

    #[tokio::test]
    async fn test_download_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .and(header("accept", "application/test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out/file.bin");
        let origin = HttpOrigin::new(Duration::from_secs(10)).unwrap();

        let written = origin
            .download(&format!("{}/old", server.uri()), Some("application/test"), &target)
            .await
            .unwrap();
        assert_eq!(written.size, 7);
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_not_found_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("file.bin");
        let origin = HttpOrigin::new(Duration::from_secs(10)).unwrap();

        let err = origin
            .download(&format!("{}/missing", server.uri()), None, &target)
            .await
            .unwrap_err();
        assert!(err.is_remote_not_found());
        assert_eq!(err.status_code(), 404);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_server_error_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let origin = HttpOrigin::new(Duration::from_secs(10)).unwrap();
        let err = origin
            .get_bytes(&format!("{}/index.yaml", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::RemoteFetch { status: Some(500), .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_timeout_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("file.bin");
        let origin = HttpOrigin::new(Duration::from_millis(200)).unwrap();

        let err = origin
            .download(&format!("{}/slow", server.uri()), None, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Timeout { .. }));
        assert_eq!(err.status_code(), 504);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}

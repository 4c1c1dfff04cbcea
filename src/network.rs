use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{HeaderValue, LOCATION, USER_AGENT};
use hyper::{Body, Client, Request, Response, StatusCode};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tracing::debug;

use crate::error::{NasaError, Result};

/// Status and body of a completed GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }
}

/// Outbound HTTP, behind a trait so fetchers can run against stubs.
///
/// Implementations must bound every request with a timeout and report
/// transport failures (including the timeout) as [`NasaError::Network`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// HTTPS client that follows up to [`MAX_REDIRECTS`] redirects, all within one timeout.
pub struct HyperClient {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
}

impl HyperClient {
    pub fn new(timeout: Duration) -> Self {
        let https = HttpsConnector::new();
        Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .build::<_, Body>(https),
            timeout,
        }
    }

    async fn send(&self, url: &str) -> Result<Response<Body>> {
        let req = Request::builder()
            .method("GET")
            .uri(url)
            .header(USER_AGENT, concat!("nasa_apod/", env!("CARGO_PKG_VERSION")))
            .body(Body::empty())
            .map_err(|e| NasaError::Network(format!("invalid request: {}", e)))?;

        self.client
            .request(req)
            .await
            .map_err(|e| NasaError::Network(format!("unable to connect to {}: {}", strip_api_key(url), e)))
    }

    async fn follow(&self, url: &str) -> Result<HttpResponse> {
        let mut current = url.to_string();
        for _ in 0..=MAX_REDIRECTS {
            let resp = self.send(&current).await?;
            if let Some(next) = redirect_target(&current, resp.status(), resp.headers().get(LOCATION)) {
                debug!("{} redirected to {}", strip_api_key(&current), strip_api_key(&next));
                current = next;
                continue;
            }

            let status = resp.status();
            let body = hyper::body::to_bytes(resp.into_body())
                .await
                .map_err(|e| NasaError::Network(e.to_string()))?;
            return Ok(HttpResponse { status, body });
        }
        Err(NasaError::Network(format!(
            "more than {} redirects from {}",
            MAX_REDIRECTS,
            strip_api_key(url)
        )))
    }
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let resp = tokio::time::timeout(self.timeout, self.follow(url))
            .await
            .map_err(|_| NasaError::Network(format!("request timed out after {:?}", self.timeout)))??;

        debug!("GET {} -> {} ({} bytes)", strip_api_key(url), resp.status, resp.body.len());
        Ok(resp)
    }
}

/// Absolute URL to go to next when `status` is a redirect with a usable
/// `Location`, resolved against `current`.
fn redirect_target(current: &str, status: StatusCode, location: Option<&HeaderValue>) -> Option<String> {
    if !status.is_redirection() || status == StatusCode::NOT_MODIFIED {
        return None;
    }
    let location = location?.to_str().ok()?;
    let base = url::Url::parse(current).ok()?;
    base.join(location).ok().map(String::from)
}

/// Keeps the key out of logs.
pub fn strip_api_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if k == "api_key" { "***".to_string() } else { v.into_owned() };
                    (k.into_owned(), v)
                })
                .collect();
            if pairs.is_empty() {
                return parsed.to_string();
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

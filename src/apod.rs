//! Astronomy Picture of the Day client.
//!
//! [`ApodClient::fetch`] performs a single request for a date. Fetching the
//! current day also refreshes the shared [`TodayCache`], which
//! [`ApodClient::today`] reads before going to the network.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::TodayCache;
use crate::config::ApiConfig;
use crate::error::{NasaError, Result};
use crate::network::HttpClient;
use crate::utils::{format_date, parse_date, Clock, SystemClock};

/// One APOD entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "hdurl")]
    pub hd_url: String,
    #[serde(default)]
    pub explanation: String,

    #[serde(skip)]
    pub parsed_date: Option<NaiveDate>,
}

impl Image {
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() || !self.hd_url.is_empty()
    }

    /// HD link when there is one, the standard one otherwise.
    pub fn best_url(&self) -> &str {
        if self.hd_url.is_empty() {
            &self.url
        } else {
            &self.hd_url
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title: {}", self.title)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f, "Image: {}", self.url)?;
        writeln!(f, "HD Image: {}", self.hd_url)?;
        writeln!(f, "About:")?;
        writeln!(f, "{}", self.explanation)
    }
}

/// Which day to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApodDate {
    Today,
    On(NaiveDate),
}

impl From<NaiveDate> for ApodDate {
    fn from(date: NaiveDate) -> Self {
        ApodDate::On(date)
    }
}

pub struct ApodClient {
    http: Arc<dyn HttpClient>,
    api_key: String,
    endpoint: String,
    cache: Arc<TodayCache>,
    clock: Arc<dyn Clock>,
}

impl ApodClient {
    pub fn new(http: Arc<dyn HttpClient>, config: &ApiConfig, cache: Arc<TodayCache>) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.apod_endpoint.clone(),
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &Arc<TodayCache> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Today's APOD, served from the cache while it still holds today's date.
    pub async fn today(&self) -> Result<Image> {
        let today = format_date(self.clock.today());
        if let Some(image) = self.cache.read_today(&today).await {
            return Ok(image);
        }
        self.fetch(ApodDate::Today).await
    }

    /// Fetches the APOD for `date`. Dates after today are clamped to today,
    /// and a successful fetch of today's picture refreshes the cache.
    pub async fn fetch(&self, date: impl Into<ApodDate>) -> Result<Image> {
        let today = self.clock.today();
        let day = match date.into() {
            ApodDate::Today => today,
            ApodDate::On(d) if d > today => {
                debug!("Requested date {} is in the future, using {}", d, today);
                today
            }
            ApodDate::On(d) => d,
        };
        let is_today = day == today;

        let url = self.request_url(day, is_today)?;
        let resp = self.http.get(url.as_str()).await?;
        if !resp.status.is_success() {
            warn!("APOD request for {} returned {}", day, resp.status);
            return Err(NasaError::UpstreamInvalid(format!("HTTP status {}", resp.status)));
        }

        let image = parse_image(&resp.body)?;
        if is_today {
            self.cache.update(image.clone()).await;
        }
        info!("Fetched APOD {} ({})", image.date, image.title);
        Ok(image)
    }

    fn request_url(&self, day: NaiveDate, is_today: bool) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| NasaError::ConfigInvalid(format!("invalid APOD endpoint: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api_key", &self.api_key);
            // the API defaults to today
            if !is_today {
                query.append_pair("date", &format_date(day));
            }
        }
        Ok(url)
    }
}

/// Decodes and validates an APOD response body.
pub fn parse_image(body: &[u8]) -> Result<Image> {
    let mut image: Image = serde_json::from_slice(body)?;
    if !image.is_valid() {
        return Err(NasaError::UpstreamInvalid(format!(
            "no image url for {:?}",
            image.date
        )));
    }
    image.parsed_date = parse_date(&image.date);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::stub::{StubClient, StubResponse};
    use crate::utils::test_clock::FixedClock;
    use hyper::StatusCode;

    const SAMPLE: &str = r#"{"date":"2017-05-11","title":"T","url":"http://x/img.jpg","hdurl":"","explanation":"E"}"#;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn body_for(date: &str, title: &str) -> String {
        format!(
            r#"{{"date":"{}","title":"{}","url":"http://x/{}.jpg","hdurl":"http://x/{}_hd.jpg","explanation":"E"}}"#,
            date, title, title, title
        )
    }

    fn client(stub: Arc<StubClient>, clock: Arc<FixedClock>) -> ApodClient {
        ApodClient::new(stub, &ApiConfig::default(), Arc::new(TodayCache::new())).with_clock(clock)
    }

    #[tokio::test]
    async fn test_fetch_past_date() {
        let stub = Arc::new(StubClient::with_json(SAMPLE));
        let clock = Arc::new(FixedClock::new(ymd(2020, 1, 1)));
        let apod = client(stub.clone(), clock);

        let image = apod.fetch(ymd(2017, 5, 11)).await.unwrap();
        assert_eq!(image.date, "2017-05-11");
        assert_eq!(image.title, "T");
        assert_eq!(image.explanation, "E");
        assert_eq!(image.parsed_date, Some(ymd(2017, 5, 11)));
        assert_eq!(image.best_url(), "http://x/img.jpg");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("https://api.nasa.gov/planetary/apod?"));
        assert!(requests[0].contains("api_key=DEMO_KEY"));
        assert!(requests[0].contains("date=2017-05-11"));

        // past dates leave the today cache alone
        assert!(apod.cache().snapshot().await.cached_image.is_none());
    }

    #[tokio::test]
    async fn test_empty_urls_are_upstream_invalid() {
        let stub = Arc::new(StubClient::with_json(
            r#"{"date":"2017-05-11","title":"T","url":"","hdurl":""}"#,
        ));
        let clock = Arc::new(FixedClock::new(ymd(2017, 5, 11)));
        let apod = client(stub, clock);

        let err = apod.fetch(ApodDate::Today).await.unwrap_err();
        assert!(matches!(err, NasaError::UpstreamInvalid(_)));
        assert!(apod.cache().snapshot().await.cached_image.is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let stub = Arc::new(StubClient::with_json("<html>rate limited</html>"));
        let apod = client(stub, Arc::new(FixedClock::new(ymd(2020, 1, 1))));

        let err = apod.fetch(ymd(2017, 5, 11)).await.unwrap_err();
        assert!(matches!(err, NasaError::Parse(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_invalid() {
        let stub = Arc::new(StubClient::new());
        stub.push(StubResponse::Body(
            StatusCode::SERVICE_UNAVAILABLE,
            bytes::Bytes::from_static(b"{}"),
        ));
        let apod = client(stub, Arc::new(FixedClock::new(ymd(2020, 1, 1))));

        let err = apod.fetch(ymd(2017, 5, 11)).await.unwrap_err();
        assert!(matches!(err, NasaError::UpstreamInvalid(_)));
    }

    #[tokio::test]
    async fn test_network_error_propagates() {
        let stub = Arc::new(StubClient::new());
        stub.push(StubResponse::Fail("connection refused".into()));
        let apod = client(stub, Arc::new(FixedClock::new(ymd(2020, 1, 1))));

        let err = apod.today().await.unwrap_err();
        assert!(matches!(err, NasaError::Network(_)));
    }

    #[tokio::test]
    async fn test_unparsable_date_is_not_fatal() {
        let stub = Arc::new(StubClient::with_json(
            r#"{"date":"May 11","title":"T","url":"http://x/img.jpg"}"#,
        ));
        let apod = client(stub, Arc::new(FixedClock::new(ymd(2020, 1, 1))));

        let image = apod.fetch(ymd(2017, 5, 11)).await.unwrap();
        assert_eq!(image.parsed_date, None);
        assert_eq!(image.hd_url, "");
    }

    #[tokio::test]
    async fn test_future_date_is_clamped_to_today() {
        let stub = Arc::new(StubClient::with_json(&body_for("2020-01-01", "now")));
        let apod = client(stub.clone(), Arc::new(FixedClock::new(ymd(2020, 1, 1))));

        let image = apod.fetch(ymd(2031, 3, 3)).await.unwrap();
        assert_eq!(image.date, "2020-01-01");

        // same request as fetch(today): no date parameter
        let requests = stub.requests();
        assert!(!requests[0].contains("date="));
        assert_eq!(apod.cache().snapshot().await.cached_date, "2020-01-01");
    }

    #[tokio::test]
    async fn test_today_is_served_from_cache() {
        let stub = Arc::new(StubClient::with_json(&body_for("2020-01-01", "now")));
        let apod = client(stub.clone(), Arc::new(FixedClock::new(ymd(2020, 1, 1))));

        let first = apod.fetch(ApodDate::Today).await.unwrap();
        assert_eq!(stub.calls(), 1);

        for _ in 0..5 {
            let cached = apod.today().await.unwrap();
            assert_eq!(cached, first);
        }
        assert_eq!(stub.calls(), 1);
        assert_eq!(apod.cache().stats().hits, 5);
    }

    #[tokio::test]
    async fn test_day_rollover_forces_fetch() {
        let stub = Arc::new(StubClient::new());
        stub.push_json(&body_for("2020-01-01", "old"));
        stub.push_json(&body_for("2020-01-02", "new"));
        let clock = Arc::new(FixedClock::new(ymd(2020, 1, 1)));
        let apod = client(stub.clone(), clock.clone());

        assert_eq!(apod.today().await.unwrap().title, "old");
        assert_eq!(apod.today().await.unwrap().title, "old");
        assert_eq!(stub.calls(), 1);

        clock.set(ymd(2020, 1, 2));
        assert_eq!(apod.today().await.unwrap().title, "new");
        assert_eq!(stub.calls(), 2);
        assert_eq!(apod.cache().snapshot().await.cached_date, "2020-01-02");
    }

    #[test]
    fn test_display() {
        let image = parse_image(SAMPLE.as_bytes()).unwrap();
        let text = image.to_string();
        assert!(text.starts_with("Title: T\n"));
        assert!(text.contains("Date: 2017-05-11"));
        assert!(text.contains("About:\nE"));
    }
}

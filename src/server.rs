use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use minijinja::{context, Environment};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::apod::{ApodClient, Image};
use crate::error::{NasaError, Result};
use crate::logger::log_request;
use crate::sampler::RandomSampler;
use crate::sink::Sink;

pub const TEMPLATE_NAME: &str = "apod.html";
const TEMPLATE: &str = include_str!("templates/apod.html");

/// Page refresh period when `auto` is set without a usable `interval`.
pub const DEFAULT_AUTO_RELOAD_SECS: u64 = 5 * 60;

const UNAVAILABLE: &str = "NASA API currently unavailable, it's experiencing downtime :(";

/// Display options read from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    pub sd: bool,
    pub auto_reload: bool,
    pub auto_reload_interval: u64,
}

impl PageOptions {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut sd = false;
        let mut auto = false;
        let mut interval: Option<String> = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "sd" => sd = !value.is_empty(),
                "auto" => auto = !value.is_empty(),
                "interval" if !value.is_empty() => interval = Some(value.into_owned()),
                _ => {}
            }
        }

        let auto_reload_interval = interval
            .as_deref()
            .and_then(|i| i.parse::<u64>().ok())
            .filter(|secs| *secs >= 1)
            .unwrap_or(DEFAULT_AUTO_RELOAD_SECS);

        Self {
            sd,
            auto_reload: auto || interval.is_some(),
            auto_reload_interval,
        }
    }
}

/// Latest random APOD served by `/random-apod/` and when it was taken.
#[derive(Debug, Default)]
pub struct RandomSlot {
    state: RwLock<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    last_update: Option<Instant>,
    image: Option<Image>,
}

impl RandomSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn image(&self) -> Option<Image> {
        self.state.read().await.image.clone()
    }

    pub async fn is_stale(&self, max_age: Duration) -> bool {
        match self.state.read().await.last_update {
            Some(last) => last.elapsed() >= max_age,
            None => true,
        }
    }

    /// Replaces the image and restarts the refresh window.
    pub async fn store(&self, image: &Image) {
        let mut state = self.state.write().await;
        state.image = Some(image.clone());
        state.last_update = Some(Instant::now());
    }

    /// Restarts the refresh window without replacing the image, so a failing
    /// upstream is not asked again on every request.
    pub async fn touch(&self) {
        self.state.write().await.last_update = Some(Instant::now());
    }
}

#[async_trait]
impl Sink for RandomSlot {
    fn name(&self) -> &str {
        "random-apod"
    }

    async fn deliver(&self, image: &Image) -> Result<()> {
        self.store(image).await;
        Ok(())
    }
}

/// Everything a request handler needs.
pub struct AppState {
    client: Arc<ApodClient>,
    sampler: Arc<RandomSampler>,
    random: RandomSlot,
    random_refresh: Duration,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(client: Arc<ApodClient>, sampler: Arc<RandomSampler>, random_refresh: Duration) -> Result<Self> {
        let mut templates = Environment::new();
        templates
            .add_template(TEMPLATE_NAME, TEMPLATE)
            .map_err(|e| NasaError::ConfigInvalid(format!("unable to parse template: {}", e)))?;

        Ok(Self {
            client,
            sampler,
            random: RandomSlot::new(),
            random_refresh,
            templates,
        })
    }

    async fn index(&self, options: &PageOptions) -> Response<Body> {
        match self.client.today().await {
            Ok(image) => self.render(&image, options, None),
            Err(e) => {
                warn!("Unable to serve today's APOD: {}", e);
                text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        }
    }

    async fn random(&self, options: &PageOptions) -> Response<Body> {
        if self.random.is_stale(self.random_refresh).await {
            match self.sampler.sample().await {
                Ok(image) => self.random.store(&image).await,
                Err(e) => {
                    warn!("Unable to refresh random APOD: {}", e);
                    self.random.touch().await;
                }
            }
        }

        match self.random.image().await {
            Some(image) => self.render(&image, options, Some("Random NASA Astronomy Picture of the Day")),
            None => text_response(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE),
        }
    }

    fn render(&self, image: &Image, options: &PageOptions, title: Option<&str>) -> Response<Body> {
        if !image.is_valid() {
            return text_response(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE);
        }

        let image_src = if options.sd && !image.url.is_empty() {
            image.url.as_str()
        } else {
            image.best_url()
        };

        let rendered = self.templates.get_template(TEMPLATE_NAME).and_then(|tmpl| {
            tmpl.render(context! {
                apod => image,
                image_src => image_src,
                title => title,
                auto_reload => options.auto_reload,
                auto_reload_interval => options.auto_reload_interval,
            })
        });

        match rendered {
            Ok(html) => response(StatusCode::OK, "text/html; charset=utf-8", html),
            Err(e) => {
                error!("Unable to render page: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "unable to render page")
            }
        }
    }
}

/// HTTP front end.
///
/// - `/` today's APOD, through the cache
/// - `/random-apod/` a random APOD, refreshed at most once per refresh period
pub struct ApodServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl ApodServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        info!("Creating APOD server on {}", addr);
        Self { addr, state }
    }

    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let state = self.state.clone();
        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    debug!("Received request from {}: {} {}", remote_addr, req.method(), req.uri());
                    handle_request(req, state.clone())
                }))
            }
        });

        let server = Server::try_bind(&self.addr)
            .map_err(|e| NasaError::Network(format!("unable to listen on {}: {}", self.addr, e)))?
            .http1_header_read_timeout(Duration::from_secs(30))
            .serve(make_svc)
            .with_graceful_shutdown(shutdown);
        info!("Launching http server at http://{}", self.addr);

        server.await.map_err(|e| {
            error!("Server error: {}", e);
            NasaError::Network(e.to_string())
        })
    }
}

#[tracing::instrument(skip(req, state), fields(path = %req.uri().path()))]
pub async fn handle_request(req: Request<Body>, state: Arc<AppState>) -> std::result::Result<Response<Body>, Infallible> {
    let started = Instant::now();
    let path = req.uri().path().to_string();
    let options = PageOptions::from_query(req.uri().query());

    let resp = match path.as_str() {
        "/" => state.index(&options).await,
        "/random-apod/" => state.random(&options).await,
        _ => text_response(StatusCode::NOT_FOUND, "404 page not found"),
    };

    log_request(&path, resp.status().as_u16(), started.elapsed());
    Ok(resp)
}

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut resp = Response::new(body.into());
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    response(status, "text/plain; charset=utf-8", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TodayCache;
    use crate::config::ApiConfig;
    use crate::network::stub::StubClient;
    use crate::utils::test_clock::FixedClock;
    use chrono::NaiveDate;

    const TODAY: &str = r#"{"date":"2020-01-01","title":"Pillars <of> Creation","url":"http://x/sd.jpg","hdurl":"http://x/hd.jpg","explanation":"Dust."}"#;

    fn state(stub: Arc<StubClient>, refresh: Duration) -> Arc<AppState> {
        let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()));
        let client = Arc::new(
            ApodClient::new(stub, &ApiConfig::default(), Arc::new(TodayCache::new())).with_clock(clock),
        );
        let sampler = Arc::new(RandomSampler::with_seed(client.clone(), 1));
        Arc::new(AppState::new(client, sampler, refresh).unwrap())
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = handle_request(req, state.clone()).await.unwrap();
        let status = resp.status();
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_paths_are_not_found() {
        let stub = Arc::new(StubClient::with_json(TODAY));
        let state = state(stub.clone(), Duration::from_secs(1));

        for path in ["/abcd", "/random-apod/abcd", "/random-apod"] {
            let (status, _) = get(&state, path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        }
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_index_renders_today_from_cache() {
        let stub = Arc::new(StubClient::with_json(TODAY));
        let state = state(stub.clone(), Duration::from_secs(1));

        let (status, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("#explanation"));
        // minijinja escapes '/' too, so match on the file names
        assert!(body.contains("hd.jpg"));
        assert!(!body.contains("sd.jpg"));
        assert!(body.contains("Pillars &lt;of&gt; Creation"));
        assert!(!body.contains("http-equiv=\"refresh\""));

        let (status, body) = get(&state, "/?sd=1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("sd.jpg"));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_index_unavailable_upstream() {
        let stub = Arc::new(StubClient::with_json(r#"{"date":"2020-01-01","url":"","hdurl":""}"#));
        let state = state(stub, Duration::from_secs(1));

        let (status, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("invalid response"));
    }

    #[tokio::test]
    async fn test_random_is_refreshed_at_most_once_per_period() {
        let stub = Arc::new(StubClient::with_json(TODAY));
        let state = state(stub.clone(), Duration::from_secs(3600));

        let (status, body) = get(&state, "/random-apod/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Random NASA Astronomy Picture of the Day"));

        get(&state, "/random-apod/").await;
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_random_refreshes_when_stale() {
        let stub = Arc::new(StubClient::with_json(TODAY));
        let state = state(stub.clone(), Duration::ZERO);

        get(&state, "/random-apod/").await;
        get(&state, "/random-apod/").await;
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_random_without_any_image() {
        let stub = Arc::new(StubClient::new());
        let state = state(stub, Duration::ZERO);

        let (status, body) = get(&state, "/random-apod/").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_auto_reload() {
        let stub = Arc::new(StubClient::with_json(TODAY));
        let state = state(stub, Duration::from_secs(3600));

        let (_, body) = get(&state, "/random-apod/?auto=1&interval=60").await;
        assert!(body.contains(r#"<meta http-equiv="refresh" content="60">"#));

        let (_, body) = get(&state, "/random-apod/?auto=1").await;
        assert!(body.contains(r#"content="300""#));
    }

    #[tokio::test]
    async fn test_random_slot_store_and_deliver() {
        let slot = RandomSlot::new();
        assert!(slot.is_stale(Duration::from_secs(3600)).await);
        assert!(slot.image().await.is_none());

        let mut image = crate::apod::parse_image(TODAY.as_bytes()).unwrap();
        slot.store(&image).await;
        assert!(!slot.is_stale(Duration::from_secs(3600)).await);
        assert_eq!(slot.image().await.unwrap().date, "2020-01-01");

        image.date = "2019-06-01".into();
        slot.deliver(&image).await.unwrap();
        assert_eq!(slot.image().await.unwrap().date, "2019-06-01");
    }

    #[test]
    fn test_page_options() {
        assert_eq!(
            PageOptions::from_query(None),
            PageOptions { sd: false, auto_reload: false, auto_reload_interval: DEFAULT_AUTO_RELOAD_SECS }
        );
        assert_eq!(
            PageOptions::from_query(Some("sd=1&interval=90")),
            PageOptions { sd: true, auto_reload: true, auto_reload_interval: 90 }
        );
        assert_eq!(
            PageOptions::from_query(Some("auto=yes&interval=0")),
            PageOptions { sd: false, auto_reload: true, auto_reload_interval: DEFAULT_AUTO_RELOAD_SECS }
        );
        assert!(!PageOptions::from_query(Some("sd=")).sd);
    }
}

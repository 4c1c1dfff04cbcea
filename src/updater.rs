//! Periodic image refresh loop used by the wallpaper daemon.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::apod::{ApodClient, Image};
use crate::error::{NasaError, Result};
use crate::retry::{attempt, DEFAULT_MAX_ATTEMPTS};
use crate::sampler::RandomSampler;
use crate::sink::Sink;

/// Shortest interval the loop accepts.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Where the loop gets its images from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn name(&self) -> &str;
    async fn next_image(&self) -> Result<Image>;
}

#[async_trait]
impl ImageSource for RandomSampler {
    fn name(&self) -> &str {
        "random"
    }

    async fn next_image(&self) -> Result<Image> {
        self.sample().await
    }
}

/// Always today's picture, through the cache.
pub struct TodaySource {
    client: Arc<ApodClient>,
}

impl TodaySource {
    pub fn new(client: Arc<ApodClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageSource for TodaySource {
    fn name(&self) -> &str {
        "today"
    }

    async fn next_image(&self) -> Result<Image> {
        self.client.today().await
    }
}

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Stop after this many ticks; `None` runs until shutdown.
    pub iterations: Option<u64>,
}

impl UpdateConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            iterations: None,
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval < MIN_INTERVAL {
            return Err(NasaError::ConfigInvalid(format!(
                "interval {:?} is too low, minimum is {:?}",
                self.interval, MIN_INTERVAL
            )));
        }
        if self.max_attempts == 0 {
            return Err(NasaError::ConfigInvalid("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Updated { image: Image, attempts: u32 },
    Failed { error: NasaError, attempts: u32 },
}

impl TickOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TickOutcome::Updated { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TickOutcome::Updated { attempts, .. } | TickOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub ticks: u64,
    pub successes: u64,
    pub failures: u64,
}

impl LoopReport {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        if outcome.is_success() {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }
}

pub struct UpdateLoop {
    source: Arc<dyn ImageSource>,
    sink: Arc<dyn Sink>,
    config: UpdateConfig,
}

impl UpdateLoop {
    pub fn new(source: Arc<dyn ImageSource>, sink: Arc<dyn Sink>, config: UpdateConfig) -> Self {
        Self { source, sink, config }
    }

    /// Runs until the configured iterations are done or `shutdown` resolves.
    ///
    /// The sink is cleaned up on every return path, including a rejected
    /// configuration.
    pub async fn run<S>(&self, shutdown: S) -> Result<LoopReport>
    where
        S: Future<Output = ()>,
    {
        let result = self.run_ticks(shutdown).await;
        if let Err(e) = self.sink.cleanup().await {
            warn!("Unable to clean up {} sink: {}", self.sink.name(), e);
        }
        result
    }

    async fn run_ticks<S>(&self, shutdown: S) -> Result<LoopReport>
    where
        S: Future<Output = ()>,
    {
        self.config.validate()?;
        info!(
            "Updating {} with a {} APOD every {:?}",
            self.sink.name(),
            self.source.name(),
            self.config.interval
        );

        tokio::pin!(shutdown);
        let mut report = LoopReport::default();
        while self.config.iterations.map_or(true, |max| report.ticks < max) {
            // shutdown also cancels a tick in progress
            let outcome = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, abandoning tick in progress");
                    break;
                }
                outcome = self.tick() => outcome,
            };
            report.record(&outcome);

            if self.config.iterations.map_or(false, |max| report.ticks >= max) {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping update loop");
                    break;
                }
                _ = sleep(self.config.interval) => {}
            }
        }

        info!(
            "Update loop finished: {} ticks, {} updated, {} failed",
            report.ticks, report.successes, report.failures
        );
        Ok(report)
    }

    /// One fetch-and-deliver round with the bounded retry policy. Failures are
    /// logged and returned, never propagated.
    pub async fn tick(&self) -> TickOutcome {
        let mut attempts = 0;
        let result = attempt(
            || {
                attempts += 1;
                self.fetch_and_deliver()
            },
            self.config.max_attempts,
        )
        .await;

        match result {
            Ok(image) => {
                info!("Updated {} with APOD {} ({})", self.sink.name(), image.date, image.title);
                TickOutcome::Updated { image, attempts }
            }
            Err(error) => {
                error!("Unable to update {}: {}", self.sink.name(), error);
                TickOutcome::Failed { error, attempts }
            }
        }
    }

    async fn fetch_and_deliver(&self) -> Result<Image> {
        let image = self.source.next_image().await?;
        self.sink.deliver(&image).await?;
        Ok(image)
    }
}

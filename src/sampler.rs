use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::apod::{ApodClient, Image};
use crate::error::Result;

/// Random dates are drawn from this many days back, today included.
pub const SAMPLE_WINDOW_DAYS: i64 = 2 * 365;

/// Picks an APOD from a random day within the last two years.
pub struct RandomSampler {
    client: Arc<ApodClient>,
    rng: Mutex<StdRng>,
}

impl RandomSampler {
    /// Seeds the generator from OS entropy, once for the life of the sampler.
    pub fn new(client: Arc<ApodClient>) -> Self {
        Self::with_rng(client, StdRng::from_entropy())
    }

    pub fn with_seed(client: Arc<ApodClient>, seed: u64) -> Self {
        Self::with_rng(client, StdRng::seed_from_u64(seed))
    }

    fn with_rng(client: Arc<ApodClient>, rng: StdRng) -> Self {
        Self {
            client,
            rng: Mutex::new(rng),
        }
    }

    /// Days to go back, uniform in `[0, SAMPLE_WINDOW_DAYS)`.
    pub fn offset(&self) -> i64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..SAMPLE_WINDOW_DAYS)
    }

    pub fn pick_date(&self) -> NaiveDate {
        date_for_offset(self.client.clock().today(), self.offset())
    }

    pub async fn sample(&self) -> Result<Image> {
        let date = self.pick_date();
        debug!("Sampling APOD for {}", date);
        self.client.fetch(date).await
    }
}

pub fn date_for_offset(today: NaiveDate, offset: i64) -> NaiveDate {
    today - ChronoDuration::days(offset)
}

//! Near Earth Object feed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{NasaError, Result};
use crate::network::HttpClient;
use crate::utils::format_date;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diameter {
    #[serde(rename = "estimated_diameter_min")]
    pub min: f64,
    #[serde(rename = "estimated_diameter_max")]
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatedDiameter {
    pub kilometers: Diameter,
    pub meters: Diameter,
    pub miles: Diameter,
    pub feet: Diameter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeVelocity {
    pub kilometers_per_second: String,
    pub kilometers_per_hour: String,
    pub miles_per_hour: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissDistance {
    pub astronomical: String,
    pub lunar: String,
    pub kilometers: String,
    pub miles: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseApproach {
    pub close_approach_date: String,
    pub epoch_date_close_approach: i64,
    pub relative_velocity: RelativeVelocity,
    pub miss_distance: MissDistance,
    pub orbiting_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Asteroid {
    #[serde(rename = "neo_reference_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "nasa_jpl_url")]
    pub jpl_url: String,
    #[serde(rename = "absolute_magnitude_h")]
    pub absolute_magnitude: f64,
    pub estimated_diameter: EstimatedDiameter,
    #[serde(rename = "is_potentially_hazardous_asteroid")]
    pub potentially_hazardous: bool,
    pub close_approach_data: Vec<CloseApproach>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    pub next: String,
    pub prev: String,
}

/// Response of the NeoWs feed endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeoList {
    pub links: Links,
    #[serde(skip)]
    pub start: String,
    #[serde(skip)]
    pub end: String,
    pub element_count: i64,
    pub near_earth_objects: BTreeMap<String, Vec<Asteroid>>,
}

impl NeoList {
    pub fn hazardous(&self) -> impl Iterator<Item = &Asteroid> {
        self.near_earth_objects
            .values()
            .flatten()
            .filter(|a| a.potentially_hazardous)
    }
}

impl fmt::Display for NeoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Near Earth Objects From: {} to {}", self.start, self.end)?;
        writeln!(f, "Number: {}", self.element_count)?;
        writeln!(f, "Link: {}", self.links.self_link)?;
        for (date, asteroids) in &self.near_earth_objects {
            writeln!(f, "{}: {} objects", date, asteroids.len())?;
            let names: Vec<&str> = asteroids.iter().map(|a| a.name.as_str()).collect();
            writeln!(f, "Objects: {}", names.join(","))?;
        }
        Ok(())
    }
}

pub struct NeoClient {
    http: Arc<dyn HttpClient>,
    api_key: String,
    endpoint: String,
}

impl NeoClient {
    pub fn new(http: Arc<dyn HttpClient>, config: &ApiConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.neo_endpoint.clone(),
        }
    }

    /// Asteroids by closest approach date, limited to `start..=end`.
    pub async fn feed(&self, start: NaiveDate, end: NaiveDate) -> Result<NeoList> {
        if end < start {
            return Err(NasaError::InvalidInput(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        let (start, end) = (format_date(start), format_date(end));

        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| NasaError::ConfigInvalid(format!("invalid NEO endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("start_date", &start)
            .append_pair("end_date", &end);

        let resp = self.http.get(url.as_str()).await?;
        if !resp.status.is_success() {
            warn!("NEO feed {}..{} returned {}", start, end, resp.status);
            return Err(NasaError::UpstreamInvalid(format!("HTTP status {}", resp.status)));
        }

        let mut list: NeoList = serde_json::from_slice(&resp.body)?;
        list.start = start;
        list.end = end;
        info!("Fetched {} near earth objects", list.element_count);
        Ok(list)
    }
}

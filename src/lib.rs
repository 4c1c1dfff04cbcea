//! Client and tools for NASA's Astronomy Picture of the Day and Near Earth
//! Object APIs.
//!
//! Set `NASAKEY` to an API key from <https://api.nasa.gov>; `DEMO_KEY` is
//! used otherwise.

pub mod apod;
pub mod cache;
pub mod config;
pub mod error;
pub mod logger;
pub mod neo;
pub mod network;
pub mod retry;
pub mod sampler;
pub mod server;
pub mod sink;
pub mod updater;
pub mod utils;
pub mod wallpaper;

pub use config::Config;
pub use error::{NasaError, Result};

pub mod prelude {
    pub use crate::apod::{ApodClient, ApodDate, Image};
    pub use crate::cache::TodayCache;
    pub use crate::config::Config;
    pub use crate::error::{NasaError, Result};
    pub use crate::neo::{NeoClient, NeoList};
    pub use crate::network::{HttpClient, HyperClient};
    pub use crate::sampler::RandomSampler;
    pub use crate::server::{ApodServer, AppState};
    pub use crate::sink::Sink;
    pub use crate::updater::{ImageSource, TodaySource, UpdateConfig, UpdateLoop};
    pub use crate::wallpaper::{select_setter, WallpaperSink};
}

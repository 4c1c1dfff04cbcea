//! Desktop wallpaper sink.
//!
//! Downloads the picture behind an [`Image`], checks that the bytes really are
//! an image, stages them in a scratch file and hands that file to a
//! [`WallpaperSetter`].

mod setter;

pub use setter::{preset, select_setter, CommandSetter, WallpaperSetter, WindowsSetter, PRESETS};

use async_trait::async_trait;
use image::ImageFormat;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::apod::Image;
use crate::error::{NasaError, Result};
use crate::network::HttpClient;
use crate::sink::Sink;

/// Anything shorter is an error page or a truncated download.
pub const MIN_IMAGE_BYTES: usize = 512;

/// Sniffs the leading bytes for JPEG, PNG or GIF.
pub fn is_image(data: &[u8]) -> bool {
    if data.len() < MIN_IMAGE_BYTES {
        return false;
    }
    matches!(
        image::guess_format(data),
        Ok(ImageFormat::Jpeg) | Ok(ImageFormat::Png) | Ok(ImageFormat::Gif)
    )
}

pub struct WallpaperSink {
    http: Arc<dyn HttpClient>,
    setter: Box<dyn WallpaperSetter>,
    scratch_path: PathBuf,
    // dropping the TempPath deletes the file
    scratch: Mutex<Option<TempPath>>,
}

impl WallpaperSink {
    pub fn new(http: Arc<dyn HttpClient>, setter: Box<dyn WallpaperSetter>) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("nasa-wallpaper")
            .tempfile()
            .map_err(|e| NasaError::SinkFailure(format!("unable to get tempfile to work with: {}", e)))?
            .into_temp_path();
        let scratch_path = scratch.to_path_buf();
        info!("Staging wallpapers in {}", scratch_path.display());

        Ok(Self {
            http,
            setter,
            scratch_path,
            scratch: Mutex::new(Some(scratch)),
        })
    }

    pub fn scratch_path(&self) -> &std::path::Path {
        &self.scratch_path
    }

    async fn download(&self, image: &Image) -> Result<Vec<u8>> {
        let url = image.best_url();
        debug!("Downloading wallpaper from {}", url);
        let resp = self.http.get(url).await?;
        if !resp.status.is_success() {
            return Err(NasaError::SinkFailure(format!(
                "image download returned {} for {}",
                resp.status, url
            )));
        }
        Ok(resp.body.to_vec())
    }
}

#[async_trait]
impl Sink for WallpaperSink {
    fn name(&self) -> &str {
        "wallpaper"
    }

    async fn deliver(&self, image: &Image) -> Result<()> {
        let data = self.download(image).await?;
        if !is_image(&data) {
            return Err(NasaError::SinkFailure(format!(
                "APOD {} is not a jpeg, png or gif image",
                image.date
            )));
        }

        tokio::fs::write(&self.scratch_path, &data)
            .await
            .map_err(|e| NasaError::SinkFailure(format!("unable to update wallpaper file: {}", e)))?;
        self.setter.apply(&self.scratch_path).await?;
        info!("Wallpaper set to {} via {}", image.title, self.setter.name());
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        let scratch = self
            .scratch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(scratch) = scratch {
            match scratch.close() {
                Ok(()) => debug!("Removed {}", self.scratch_path.display()),
                Err(e) => {
                    warn!("Unable to clean up {}: {}", self.scratch_path.display(), e);
                    return Err(NasaError::SinkFailure(e.to_string()));
                }
            }
        }
        Ok(())
    }
}

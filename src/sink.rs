use async_trait::async_trait;

use crate::apod::Image;
use crate::error::Result;

/// Destination for images produced by the update loop.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Consumes one successfully fetched image.
    async fn deliver(&self, image: &Image) -> Result<()>;

    /// Releases scratch resources. Called once when the loop stops.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

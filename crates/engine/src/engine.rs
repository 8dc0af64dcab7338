//! The engine boundary: probing, frame extraction, consumer construction.

use std::path::Path;

use clipframe_common::error::{ClipframeError, ClipframeResult};

use crate::consumer::{Consumer, ConsumerTarget};
use crate::media::{Frame, FrameRequest, MediaInfo};
use crate::producer::{Producer, ProducerLink};
use crate::profile::Profile;
use crate::properties::Properties;

/// Anything that can decode a single picture from a producer's source.
pub trait FrameSource: Send + Sync {
    fn fetch_frame(&self, link: &ProducerLink, request: FrameRequest) -> ClipframeResult<Frame>;
}

/// Trait for media engines (ffmpeg tools, test doubles).
pub trait MediaEngine: FrameSource {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Check if this engine is usable on the system.
    fn is_available(&self) -> bool;

    /// Inspect a clip's native properties.
    fn probe(&self, path: &Path) -> ClipframeResult<MediaInfo>;

    /// Open a producer for `path` under `profile`.
    fn open_producer(&self, profile: &Profile, path: &Path) -> ClipframeResult<Producer> {
        if !path.exists() {
            return Err(ClipframeError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let info = self.probe(path)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = %info.frame_rate,
            "Opened producer"
        );
        Producer::new(path, info, profile)
    }

    /// Build a file-writing consumer.
    fn create_consumer(
        &self,
        profile: &Profile,
        target: ConsumerTarget,
        properties: Properties,
    ) -> ClipframeResult<Box<dyn Consumer>>;
}

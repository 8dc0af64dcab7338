//! Export of a single frame as a PNG still.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clipframe_common::error::{ClipframeError, ClipframeResult};
use clipframe_engine::{ConsumerTarget, MediaEngine, Producer, Profile, Properties};

pub struct FrameWriter {
    engine: Arc<dyn MediaEngine>,
    profile: Profile,
    producer: Producer,
}

impl FrameWriter {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        profile: Profile,
        clip_path: &Path,
    ) -> ClipframeResult<Self> {
        let producer = engine.open_producer(&profile, clip_path)?;
        Ok(Self {
            engine,
            profile,
            producer,
        })
    }

    pub fn length(&self) -> i64 {
        self.producer.length()
    }

    /// Where [`write_frame`](Self::write_frame) puts `frame`.
    pub fn output_path(output_folder: &Path, frame: i64) -> PathBuf {
        output_folder.join(format!("frame{frame}.png"))
    }

    /// Encode `frame` to `output_folder/frame<frame>.png` and block until
    /// the file is written.
    pub fn write_frame(&self, output_folder: &Path, frame: i64) -> ClipframeResult<PathBuf> {
        let length = self.length();
        if frame < 0 || frame >= length {
            return Err(ClipframeError::invalid_range(frame, frame, length));
        }

        let output = Self::output_path(output_folder, frame);
        let mut properties = Properties::new();
        properties.real_time(0).vcodec("png");
        let mut consumer = self.engine.create_consumer(
            &self.profile,
            ConsumerTarget::ImageFile(output.clone()),
            properties,
        )?;

        let cut = self.producer.cut(frame, frame)?;
        consumer.connect(&cut)?;
        let exit = consumer.run()?;
        consumer.purge();

        tracing::info!(
            frame,
            output = %output.display(),
            frames_written = exit.frames_written,
            "Frame written"
        );
        Ok(output)
    }
}

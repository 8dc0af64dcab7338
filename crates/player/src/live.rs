//! Interactive preview of a clip.
//!
//! A [`LivePlayer`] owns one producer and, once a display is attached, a
//! real-time consumer presenting that producer's current frame. Seeking,
//! playback speed and in/out marks all act on the producer's playhead, so
//! the display follows without being told.

use std::path::Path;
use std::sync::Arc;

use clipframe_common::error::{ClipframeError, ClipframeResult};
use clipframe_engine::{
    Consumer, DisplayConsumer, Frame, FrameRequest, FrameSink, MediaEngine, Producer, Profile,
    Properties, Rescale,
};

/// Default redraw cap for displays attached through [`LivePlayer::attach_display`].
pub const DEFAULT_DISPLAY_FPS_CAP: u32 = 60;

pub struct LivePlayer {
    engine: Arc<dyn MediaEngine>,
    profile: Profile,
    producer: Producer,
    consumer: Option<Box<dyn Consumer>>,
    display_fps_cap: u32,
}

impl LivePlayer {
    /// Open `clip_path` for preview under `profile`. Nothing is displayed
    /// until a display is attached and [`start`](Self::start) is called.
    pub fn create(
        engine: Arc<dyn MediaEngine>,
        profile: Profile,
        clip_path: &Path,
    ) -> ClipframeResult<Self> {
        let producer = engine.open_producer(&profile, clip_path)?;
        tracing::info!(
            clip = %clip_path.display(),
            profile = %profile.name,
            length = producer.length(),
            "Live player created"
        );
        Ok(Self {
            engine,
            profile,
            producer,
            consumer: None,
            display_fps_cap: DEFAULT_DISPLAY_FPS_CAP,
        })
    }

    pub fn with_display_fps_cap(mut self, cap: u32) -> Self {
        self.display_fps_cap = cap.max(1);
        self
    }

    /// Properties every interactive display runs with.
    pub fn display_properties() -> Properties {
        let mut properties = Properties::new();
        properties
            .real_time(1)
            .rescale(Rescale::Bicubic)
            .resize(true)
            .progressive(true)
            .scrub_audio(false);
        properties
    }

    /// Present frames to `sink`. Replaces (and stops) any display attached
    /// earlier.
    pub fn attach_display(&mut self, sink: FrameSink) -> ClipframeResult<()> {
        let display = DisplayConsumer::new(
            Arc::clone(&self.engine),
            self.profile.clone(),
            Self::display_properties(),
            sink,
            self.display_fps_cap,
        );
        self.attach_consumer(Box::new(display))
    }

    /// Use a caller-built consumer as the display.
    pub fn attach_consumer(&mut self, consumer: Box<dyn Consumer>) -> ClipframeResult<()> {
        if let Some(mut previous) = self.consumer.take() {
            previous.stop()?;
        }
        tracing::debug!(driver = consumer.driver(), "Display attached");
        self.consumer = Some(consumer);
        Ok(())
    }

    pub fn has_display(&self) -> bool {
        self.consumer.is_some()
    }

    /// Stop and restart the display so it redraws the current frame.
    /// Position and speed are left alone.
    pub fn refresh(&mut self) -> ClipframeResult<()> {
        let consumer = self.consumer.as_mut().ok_or(ClipframeError::NotAttached)?;
        consumer.stop()?;
        consumer.start()?;
        tracing::debug!(position = self.producer.position(), "Display refreshed");
        Ok(())
    }

    /// Connect the producer to the display, paused, and begin presenting
    /// its current frame.
    pub fn start(&mut self) -> ClipframeResult<()> {
        let consumer = self.consumer.as_mut().ok_or(ClipframeError::NotAttached)?;
        consumer.purge();
        self.producer.set_speed(0.0);
        consumer.connect(&self.producer)?;
        consumer.start()?;
        tracing::debug!(position = self.producer.position(), "Live player started");
        Ok(())
    }

    pub fn current_frame(&self) -> i64 {
        self.producer.position()
    }

    pub fn length(&self) -> i64 {
        self.producer.length()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// Seek to a fraction of `length`: `floor(fraction * length)`, then
    /// clamped like [`seek`](Self::seek). `length` is normally the player's
    /// own length.
    pub fn seek_normalized(&self, fraction: f64, length: i64) -> i64 {
        let target = (fraction * length as f64).floor();
        let target = if target.is_nan() {
            0
        } else {
            target.clamp(i64::MIN as f64, i64::MAX as f64) as i64
        };
        self.seek(target)
    }

    /// Seek to `frame`, clamped into `[0, length - 1]`.
    pub fn seek(&self, frame: i64) -> i64 {
        self.producer.seek(frame)
    }

    pub fn seek_relative(&self, delta: i64) -> i64 {
        self.seek(self.current_frame().saturating_add(delta))
    }

    /// Play at `speed` (1.0 is normal, negative plays backwards).
    pub fn play(&self, speed: f64) {
        self.producer.set_speed(speed);
    }

    pub fn pause(&self) {
        self.producer.set_speed(0.0);
    }

    pub fn is_playing(&self) -> bool {
        self.producer.speed() != 0.0
    }

    /// Set the in/out points a later range render will use.
    pub fn set_marks(&mut self, mark_in: i64, mark_out: i64) -> ClipframeResult<()> {
        let length = self.length();
        if mark_in < 0 || mark_in > mark_out || mark_out >= length {
            return Err(ClipframeError::invalid_range(mark_in, mark_out, length));
        }
        self.producer.set_marks(Some(mark_in), Some(mark_out));
        Ok(())
    }

    pub fn clear_marks(&mut self) {
        self.producer.set_marks(None, None);
    }

    pub fn marks(&self) -> (Option<i64>, Option<i64>) {
        (self.producer.mark_in(), self.producer.mark_out())
    }

    /// Decode the current frame at full profile size, deinterlaced.
    pub fn capture_frame(&self) -> ClipframeResult<Frame> {
        let link = self.producer.link();
        let request = FrameRequest {
            frame: link.absolute(link.playhead.position()),
            width: self.profile.width,
            height: self.profile.height,
            deinterlace: true,
        };
        self.engine.fetch_frame(&link, request)
    }

    /// Pause and stop the display. Safe to call more than once.
    pub fn shutdown(&mut self) -> ClipframeResult<()> {
        self.producer.set_speed(0.0);
        if let Some(consumer) = self.consumer.as_mut() {
            if !consumer.is_stopped() {
                consumer.stop()?;
                tracing::debug!("Live player stopped");
            }
        }
        Ok(())
    }
}

impl Drop for LivePlayer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Live player shutdown failed");
        }
    }
}

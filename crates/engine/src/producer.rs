//! Producers: decodable sources with a shared playhead.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use clipframe_common::error::{ClipframeError, ClipframeResult};

use crate::media::{MediaInfo, Rational};
use crate::profile::Profile;

/// Position and speed of a producer, shared with whichever consumer is
/// connected to it. Positions are relative to the producer's range start.
#[derive(Debug)]
pub struct Playhead {
    position: AtomicI64,
    speed_bits: AtomicU64,
    length: i64,
}

impl Playhead {
    fn new(length: i64) -> Self {
        Self {
            position: AtomicI64::new(0),
            speed_bits: AtomicU64::new(0f64.to_bits()),
            length,
        }
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn length(&self) -> i64 {
        self.length
    }

    /// Move to `frame`, clamped into the producer's range. Returns the
    /// position actually taken.
    pub fn seek(&self, frame: i64) -> i64 {
        let clamped = frame.clamp(0, (self.length - 1).max(0));
        self.position.store(clamped, Ordering::Release);
        clamped
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }

    pub fn set_speed(&self, speed: f64) {
        self.speed_bits.store(speed.to_bits(), Ordering::Release);
    }
}

/// What a consumer needs to render a producer: where the media lives, the
/// absolute range, and the playhead to drive or follow.
#[derive(Debug, Clone)]
pub struct ProducerLink {
    pub source: PathBuf,
    pub info: MediaInfo,
    /// Rate frame indices are counted in. This is the profile's rate, not
    /// necessarily the clip's.
    pub frame_rate: Rational,
    /// Absolute index of the first frame in the source.
    pub range_start: i64,
    pub length: i64,
    pub playhead: Arc<Playhead>,
}

impl ProducerLink {
    /// Absolute source frame for a playhead position.
    pub fn absolute(&self, position: i64) -> i64 {
        self.range_start + position.clamp(0, (self.length - 1).max(0))
    }

    /// Source timestamp in seconds of absolute frame `frame`.
    pub fn frame_to_secs(&self, frame: i64) -> f64 {
        let fps = self.frame_rate.as_f64();
        if fps <= 0.0 {
            return 0.0;
        }
        frame.max(0) as f64 / fps
    }
}

/// A handle to a decodable media source.
///
/// Owned by the component that opened it; consumers only receive a
/// [`ProducerLink`].
#[derive(Debug)]
pub struct Producer {
    source: PathBuf,
    info: MediaInfo,
    frame_rate: Rational,
    range_start: i64,
    playhead: Arc<Playhead>,
    mark_in: Option<i64>,
    mark_out: Option<i64>,
}

impl Producer {
    /// Wrap a probed source. Fails when the clip has no frames under `profile`.
    pub fn new(
        source: impl Into<PathBuf>,
        info: MediaInfo,
        profile: &Profile,
    ) -> ClipframeResult<Self> {
        let source = source.into();
        let length = info.length_in(profile);
        if length <= 0 {
            return Err(ClipframeError::engine(format!(
                "{} has no frames under profile {}",
                source.display(),
                profile.name
            )));
        }
        Ok(Self {
            source,
            info,
            frame_rate: profile.frame_rate,
            range_start: 0,
            playhead: Arc::new(Playhead::new(length)),
            mark_in: None,
            mark_out: None,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn length(&self) -> i64 {
        self.playhead.length()
    }

    /// Absolute index of this producer's first frame in the source.
    pub fn range_start(&self) -> i64 {
        self.range_start
    }

    pub fn position(&self) -> i64 {
        self.playhead.position()
    }

    pub fn seek(&self, frame: i64) -> i64 {
        self.playhead.seek(frame)
    }

    pub fn speed(&self) -> f64 {
        self.playhead.speed()
    }

    pub fn set_speed(&self, speed: f64) {
        self.playhead.set_speed(speed);
    }

    pub fn mark_in(&self) -> Option<i64> {
        self.mark_in
    }

    pub fn mark_out(&self) -> Option<i64> {
        self.mark_out
    }

    pub fn set_marks(&mut self, mark_in: Option<i64>, mark_out: Option<i64>) {
        self.mark_in = mark_in;
        self.mark_out = mark_out;
    }

    /// A new producer over `[mark_in, mark_out]` of this one, with its own
    /// playhead at 0. Bounds outside the range are clamped.
    pub fn cut(&self, mark_in: i64, mark_out: i64) -> ClipframeResult<Producer> {
        let length = self.length();
        if mark_in > mark_out {
            return Err(ClipframeError::invalid_range(mark_in, mark_out, length));
        }
        let last = (length - 1).max(0);
        let start = mark_in.clamp(0, last);
        let end = mark_out.clamp(0, last);
        Ok(Producer {
            source: self.source.clone(),
            info: self.info.clone(),
            frame_rate: self.frame_rate,
            range_start: self.range_start + start,
            playhead: Arc::new(Playhead::new(end - start + 1)),
            mark_in: None,
            mark_out: None,
        })
    }

    pub fn link(&self) -> ProducerLink {
        ProducerLink {
            source: self.source.clone(),
            info: self.info.clone(),
            frame_rate: self.frame_rate,
            range_start: self.range_start,
            length: self.length(),
            playhead: Arc::clone(&self.playhead),
        }
    }

    pub fn playhead(&self) -> Arc<Playhead> {
        Arc::clone(&self.playhead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Rational;
    use crate::profile::ProfileCatalog;
    use proptest::prelude::*;

    fn producer(frames: i64) -> Producer {
        let profile = ProfileCatalog::builtin().default_profile().clone();
        let info = MediaInfo {
            width: profile.width,
            height: profile.height,
            frame_rate: profile.frame_rate,
            sample_aspect: Rational::ONE,
            progressive: true,
            duration_secs: frames as f64 / profile.fps(),
            frame_count: Some(frames),
        };
        Producer::new("/media/clip.mp4", info, &profile).unwrap()
    }

    #[test]
    fn test_seek_clamps() {
        let p = producer(100);
        assert_eq!(p.seek(-5), 0);
        assert_eq!(p.seek(100), 99);
        assert_eq!(p.seek(42), 42);
        assert_eq!(p.position(), 42);
    }

    #[test]
    fn test_cut_offsets_range() {
        let p = producer(100);
        let cut = p.cut(10, 19).unwrap();
        assert_eq!(cut.length(), 10);
        assert_eq!(cut.range_start(), 10);
        assert_eq!(cut.position(), 0);
        assert_eq!(cut.link().absolute(5), 15);

        let nested = cut.cut(2, 4).unwrap();
        assert_eq!(nested.range_start(), 12);
        assert_eq!(nested.length(), 3);
    }

    #[test]
    fn test_cut_clamps_and_rejects_inverted() {
        let p = producer(50);
        let cut = p.cut(40, 500).unwrap();
        assert_eq!(cut.length(), 10);
        assert!(matches!(
            p.cut(20, 10),
            Err(ClipframeError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_link_shares_playhead() {
        let p = producer(30);
        let link = p.link();
        link.playhead.seek(7);
        p.set_speed(1.0);
        assert_eq!(p.position(), 7);
        assert_eq!(link.playhead.speed(), 1.0);
    }

    #[test]
    fn test_link_counts_frames_at_profile_rate() {
        let profile = ProfileCatalog::builtin().default_profile().clone();
        let info = MediaInfo {
            width: 1920,
            height: 1080,
            frame_rate: Rational::new(50, 1),
            sample_aspect: Rational::ONE,
            progressive: true,
            duration_secs: 10.0,
            frame_count: Some(500),
        };
        let p = Producer::new("/media/fast.mov", info, &profile).unwrap();
        assert_eq!(p.length(), 250);

        let link = p.cut(200, 249).unwrap().link();
        assert_eq!(link.frame_rate, Rational::new(25, 1));
        assert!((link.frame_to_secs(link.range_start) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_marks_start_unset() {
        let mut p = producer(30);
        assert_eq!(p.mark_in(), None);
        p.set_marks(Some(3), Some(9));
        assert_eq!((p.mark_in(), p.mark_out()), (Some(3), Some(9)));
    }

    proptest! {
        #[test]
        fn prop_seek_lands_inside_range(frames in 1i64..5_000, target in -10_000i64..10_000) {
            let p = producer(frames);
            let got = p.seek(target);
            prop_assert!(got >= 0 && got < frames);
            if target < 0 {
                prop_assert_eq!(got, 0);
            } else if target >= frames {
                prop_assert_eq!(got, frames - 1);
            } else {
                prop_assert_eq!(got, target);
            }
        }
    }
}

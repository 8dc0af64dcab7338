//! Probed clip properties and decoded frames.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profile::Profile;

/// A positive rational number (frame rates, aspect ratios).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const ONE: Rational = Rational { num: 1, den: 1 };

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Value as a float. A zero denominator yields 0.
    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Parse `"30000/1001"`, `"30000:1001"` or a plain integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (num, den) = match raw.split_once(['/', ':']) {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (raw.parse().ok()?, 1),
        };
        if den == 0 {
            return None;
        }
        Some(Self { num, den })
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Native properties of a clip as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub sample_aspect: Rational,
    pub progressive: bool,
    pub duration_secs: f64,
    /// Frame count from the container, when it reports one.
    pub frame_count: Option<i64>,
}

impl MediaInfo {
    /// Number of frames the clip spans when played back under `profile`.
    pub fn length_in(&self, profile: &Profile) -> i64 {
        if let Some(count) = self.frame_count {
            if count > 0 && self.frame_rate == profile.frame_rate {
                return count;
            }
        }
        let frames = (self.duration_secs * profile.fps()).round();
        if frames.is_finite() && frames > 0.0 {
            frames as i64
        } else {
            self.frame_count.unwrap_or(0).max(0)
        }
    }
}

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A decoded picture.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap a raw RGBA buffer, checking its size against the geometry.
    pub fn rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * PixelFormat::Rgba8.bytes_per_pixel();
        if data.len() != expected || expected == 0 {
            return None;
        }
        Some(Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data,
        })
    }

    /// RGBA pixel at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Parameters for pulling a single decoded picture out of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    /// Absolute frame index within the source.
    pub frame: i64,
    pub width: u32,
    pub height: u32,
    pub deinterlace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileCatalog;

    #[test]
    fn test_rational_parse() {
        assert_eq!(Rational::parse("30000/1001"), Some(Rational::new(30000, 1001)));
        assert_eq!(Rational::parse("16:9"), Some(Rational::new(16, 9)));
        assert_eq!(Rational::parse("25"), Some(Rational::new(25, 1)));
        assert_eq!(Rational::parse("0/0"), None);
        assert_eq!(Rational::parse("abc"), None);
    }

    #[test]
    fn test_length_prefers_frame_count_at_native_rate() {
        let catalog = ProfileCatalog::builtin();
        let (_, profile) = catalog.by_name("atsc_1080p_25").unwrap();
        let info = MediaInfo {
            width: 1920,
            height: 1080,
            frame_rate: Rational::new(25, 1),
            sample_aspect: Rational::ONE,
            progressive: true,
            duration_secs: 4.0,
            frame_count: Some(101),
        };
        assert_eq!(info.length_in(profile), 101);

        let (_, profile_50) = catalog.by_name("atsc_1080p_50").unwrap();
        assert_eq!(info.length_in(profile_50), 200);
    }

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        assert!(Frame::rgba(2, 2, vec![0; 15]).is_none());
        let frame = Frame::rgba(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(frame.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(frame.pixel(2, 0), None);
    }
}

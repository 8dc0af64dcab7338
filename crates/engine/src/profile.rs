//! Output profiles: frame geometry and rate shared by producers and consumers.
//!
//! The built-in catalog mirrors the MLT profile names editors are used to
//! (`atsc_1080p_25`, `dv_pal_wide`, ...). Extra profiles can be appended
//! from configuration.

use std::time::Duration;

use clipframe_common::config::{ProfileConfig, ProfileDefinition};
use clipframe_common::error::{ClipframeError, ClipframeResult};
use serde::{Deserialize, Serialize};

use crate::media::{MediaInfo, Rational};

/// Immutable description of frame geometry and rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub sample_aspect: Rational,
    pub display_aspect: Rational,
    pub progressive: bool,
}

impl Profile {
    /// Frames per second.
    pub fn fps(&self) -> f64 {
        self.frame_rate.as_f64()
    }

    /// Wall-clock duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        let fps = self.fps();
        if fps <= 0.0 {
            return Duration::from_millis(40);
        }
        Duration::from_secs_f64(1.0 / fps)
    }

    /// Timestamp of `frame` in seconds.
    pub fn frame_to_secs(&self, frame: i64) -> f64 {
        let fps = self.fps();
        if fps <= 0.0 {
            return 0.0;
        }
        frame.max(0) as f64 / fps
    }

    pub fn from_definition(def: &ProfileDefinition) -> ClipframeResult<Self> {
        if def.width == 0 || def.height == 0 {
            return Err(ClipframeError::profile(format!(
                "Profile '{}' has an empty frame size",
                def.name
            )));
        }
        if def.frame_rate_num == 0 || def.frame_rate_den == 0 {
            return Err(ClipframeError::profile(format!(
                "Profile '{}' has an invalid frame rate",
                def.name
            )));
        }
        if def.sample_aspect_den == 0 || def.display_aspect_den == 0 {
            return Err(ClipframeError::profile(format!(
                "Profile '{}' has a zero aspect denominator",
                def.name
            )));
        }
        Ok(Self {
            name: def.name.clone(),
            description: if def.description.is_empty() {
                def.name.clone()
            } else {
                def.description.clone()
            },
            width: def.width,
            height: def.height,
            frame_rate: Rational::new(def.frame_rate_num, def.frame_rate_den),
            sample_aspect: Rational::new(def.sample_aspect_num, def.sample_aspect_den),
            display_aspect: Rational::new(def.display_aspect_num, def.display_aspect_den),
            progressive: def.progressive,
        })
    }
}

// name, description, width, height, fps, sar, dar, progressive
type ProfileRow = (
    &'static str,
    &'static str,
    u32,
    u32,
    (u32, u32),
    (u32, u32),
    (u32, u32),
    bool,
);

const BUILTIN_PROFILES: &[ProfileRow] = &[
    ("atsc_1080p_25", "HD 1080p 25 fps", 1920, 1080, (25, 1), (1, 1), (16, 9), true),
    ("atsc_1080p_2398", "HD 1080p 23.98 fps", 1920, 1080, (24000, 1001), (1, 1), (16, 9), true),
    ("atsc_1080p_24", "HD 1080p 24 fps", 1920, 1080, (24, 1), (1, 1), (16, 9), true),
    ("atsc_1080p_2997", "HD 1080p 29.97 fps", 1920, 1080, (30000, 1001), (1, 1), (16, 9), true),
    ("atsc_1080p_30", "HD 1080p 30 fps", 1920, 1080, (30, 1), (1, 1), (16, 9), true),
    ("atsc_1080p_50", "HD 1080p 50 fps", 1920, 1080, (50, 1), (1, 1), (16, 9), true),
    ("atsc_1080p_5994", "HD 1080p 59.94 fps", 1920, 1080, (60000, 1001), (1, 1), (16, 9), true),
    ("atsc_1080p_60", "HD 1080p 60 fps", 1920, 1080, (60, 1), (1, 1), (16, 9), true),
    ("atsc_1080i_50", "HD 1080i 25 fps", 1920, 1080, (25, 1), (1, 1), (16, 9), false),
    ("atsc_1080i_5994", "HD 1080i 29.97 fps", 1920, 1080, (30000, 1001), (1, 1), (16, 9), false),
    ("atsc_720p_2398", "HD 720p 23.98 fps", 1280, 720, (24000, 1001), (1, 1), (16, 9), true),
    ("atsc_720p_24", "HD 720p 24 fps", 1280, 720, (24, 1), (1, 1), (16, 9), true),
    ("atsc_720p_25", "HD 720p 25 fps", 1280, 720, (25, 1), (1, 1), (16, 9), true),
    ("atsc_720p_2997", "HD 720p 29.97 fps", 1280, 720, (30000, 1001), (1, 1), (16, 9), true),
    ("atsc_720p_30", "HD 720p 30 fps", 1280, 720, (30, 1), (1, 1), (16, 9), true),
    ("atsc_720p_50", "HD 720p 50 fps", 1280, 720, (50, 1), (1, 1), (16, 9), true),
    ("atsc_720p_5994", "HD 720p 59.94 fps", 1280, 720, (60000, 1001), (1, 1), (16, 9), true),
    ("atsc_720p_60", "HD 720p 60 fps", 1280, 720, (60, 1), (1, 1), (16, 9), true),
    ("dv_pal", "DV/DVD PAL", 720, 576, (25, 1), (16, 15), (4, 3), false),
    ("dv_pal_wide", "DV/DVD Widescreen PAL", 720, 576, (25, 1), (64, 45), (16, 9), false),
    ("dv_ntsc", "DV/DVD NTSC", 720, 480, (30000, 1001), (8, 9), (4, 3), false),
    ("dv_ntsc_wide", "DV/DVD Widescreen NTSC", 720, 480, (30000, 1001), (32, 27), (16, 9), false),
    ("hdv_1080_25p", "HDV 1440x1080p 25 fps", 1440, 1080, (25, 1), (4, 3), (16, 9), true),
    ("hdv_1080_30p", "HDV 1440x1080p 30 fps", 1440, 1080, (30, 1), (4, 3), (16, 9), true),
    ("uhd_2160p_2398", "UHD 2160p 23.98 fps", 3840, 2160, (24000, 1001), (1, 1), (16, 9), true),
    ("uhd_2160p_24", "UHD 2160p 24 fps", 3840, 2160, (24, 1), (1, 1), (16, 9), true),
    ("uhd_2160p_25", "UHD 2160p 25 fps", 3840, 2160, (25, 1), (1, 1), (16, 9), true),
    ("uhd_2160p_2997", "UHD 2160p 29.97 fps", 3840, 2160, (30000, 1001), (1, 1), (16, 9), true),
    ("uhd_2160p_30", "UHD 2160p 30 fps", 3840, 2160, (30, 1), (1, 1), (16, 9), true),
    ("uhd_2160p_50", "UHD 2160p 50 fps", 3840, 2160, (50, 1), (1, 1), (16, 9), true),
    ("uhd_2160p_60", "UHD 2160p 60 fps", 3840, 2160, (60, 1), (1, 1), (16, 9), true),
    ("vertical_hd_30", "Vertical HD 30 fps", 1080, 1920, (30, 1), (1, 1), (9, 16), true),
    ("vertical_hd_60", "Vertical HD 60 fps", 1080, 1920, (60, 1), (1, 1), (9, 16), true),
];

/// Ordered set of known profiles. Indices are stable for the lifetime of
/// the catalog and are what the resolver reports.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: Vec<Profile>,
    default_index: usize,
}

impl ProfileCatalog {
    /// The built-in profiles, defaulting to `atsc_1080p_25`.
    pub fn builtin() -> Self {
        let profiles = BUILTIN_PROFILES
            .iter()
            .map(|&(name, description, width, height, fps, sar, dar, progressive)| Profile {
                name: name.to_string(),
                description: description.to_string(),
                width,
                height,
                frame_rate: Rational::new(fps.0, fps.1),
                sample_aspect: Rational::new(sar.0, sar.1),
                display_aspect: Rational::new(dar.0, dar.1),
                progressive,
            })
            .collect();
        Self {
            profiles,
            default_index: 0,
        }
    }

    /// Built-in profiles plus configured extras, with the configured default.
    pub fn from_config(config: &ProfileConfig) -> ClipframeResult<Self> {
        let mut catalog = Self::builtin();
        for def in &config.extra {
            let profile = Profile::from_definition(def)?;
            if catalog.by_name(&profile.name).is_some() {
                return Err(ClipframeError::profile(format!(
                    "Profile '{}' is already defined",
                    profile.name
                )));
            }
            catalog.profiles.push(profile);
        }
        let (default_index, _) = catalog.by_name(&config.default_profile).ok_or_else(|| {
            ClipframeError::profile(format!(
                "Unknown default profile '{}'",
                config.default_profile
            ))
        })?;
        catalog.default_index = default_index;
        Ok(catalog)
    }

    pub fn list(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Profile> {
        self.profiles.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<(usize, &Profile)> {
        self.profiles
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn default_profile(&self) -> &Profile {
        &self.profiles[self.default_index]
    }

    /// Index of the profile that best fits a probed clip.
    ///
    /// Frame size dominates, then frame rate, then scan type, then sample
    /// aspect. Ties resolve to the lowest index.
    pub fn closest_match(&self, info: &MediaInfo) -> usize {
        self.profiles
            .iter()
            .enumerate()
            .min_by_key(|(index, profile)| (match_score(profile, info), *index))
            .map(|(index, _)| index)
            .unwrap_or(self.default_index)
    }
}

fn match_score(profile: &Profile, info: &MediaInfo) -> (u64, u64, u8, u64) {
    let size = (profile.width as i64 - info.width as i64).unsigned_abs()
        + (profile.height as i64 - info.height as i64).unsigned_abs();
    let fps = milli_distance(profile.fps(), info.frame_rate.as_f64());
    let scan = u8::from(profile.progressive != info.progressive);
    let sar = milli_distance(profile.sample_aspect.as_f64(), info.sample_aspect.as_f64());
    (size, fps, scan, sar)
}

fn milli_distance(a: f64, b: f64) -> u64 {
    let d = ((a - b).abs() * 1000.0).round();
    if d.is_finite() {
        d as u64
    } else {
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(width: u32, height: u32, fps: Rational, progressive: bool) -> MediaInfo {
        MediaInfo {
            width,
            height,
            frame_rate: fps,
            sample_aspect: Rational::ONE,
            progressive,
            duration_secs: 10.0,
            frame_count: None,
        }
    }

    #[test]
    fn test_builtin_names_unique() {
        let catalog = ProfileCatalog::builtin();
        for (i, p) in catalog.list().iter().enumerate() {
            assert_eq!(catalog.by_name(&p.name).map(|(idx, _)| idx), Some(i));
        }
        assert_eq!(catalog.default_profile().name, "atsc_1080p_25");
    }

    #[test]
    fn test_exact_match() {
        let catalog = ProfileCatalog::builtin();
        let idx = catalog.closest_match(&clip(1280, 720, Rational::new(60000, 1001), true));
        assert_eq!(catalog.get(idx).unwrap().name, "atsc_720p_5994");
    }

    #[test]
    fn test_size_dominates_rate() {
        let catalog = ProfileCatalog::builtin();
        let idx = catalog.closest_match(&clip(3840, 2160, Rational::new(48, 1), true));
        let profile = catalog.get(idx).unwrap();
        assert_eq!((profile.width, profile.height), (3840, 2160));
        assert_eq!(profile.name, "uhd_2160p_50");
    }

    #[test]
    fn test_scan_type_breaks_rate_tie() {
        let catalog = ProfileCatalog::builtin();
        let idx = catalog.closest_match(&clip(1920, 1080, Rational::new(25, 1), false));
        assert_eq!(catalog.get(idx).unwrap().name, "atsc_1080i_50");
    }

    #[test]
    fn test_odd_size_picks_nearest_geometry() {
        let catalog = ProfileCatalog::builtin();
        let idx = catalog.closest_match(&clip(1918, 1078, Rational::new(30, 1), true));
        assert_eq!(catalog.get(idx).unwrap().name, "atsc_1080p_30");
    }

    #[test]
    fn test_from_config_adds_extras_and_default() {
        let config = ProfileConfig {
            default_profile: "square_720".to_string(),
            extra: vec![ProfileDefinition {
                name: "square_720".to_string(),
                description: String::new(),
                width: 720,
                height: 720,
                frame_rate_num: 30,
                frame_rate_den: 1,
                sample_aspect_num: 1,
                sample_aspect_den: 1,
                display_aspect_num: 1,
                display_aspect_den: 1,
                progressive: true,
            }],
        };
        let catalog = ProfileCatalog::from_config(&config).unwrap();
        assert_eq!(catalog.default_profile().name, "square_720");
        assert_eq!(catalog.default_profile().description, "square_720");
        assert_eq!(catalog.len(), ProfileCatalog::builtin().len() + 1);
    }

    #[test]
    fn test_from_config_rejects_unknown_default() {
        let config = ProfileConfig {
            default_profile: "nope".to_string(),
            extra: Vec::new(),
        };
        assert!(matches!(
            ProfileCatalog::from_config(&config),
            Err(ClipframeError::Profile { .. })
        ));
    }

    #[test]
    fn test_frame_to_secs() {
        let catalog = ProfileCatalog::builtin();
        let (_, p) = catalog.by_name("atsc_1080p_25").unwrap();
        assert!((p.frame_to_secs(50) - 2.0).abs() < 1e-9);
        assert_eq!(p.frame_duration(), Duration::from_millis(40));
    }
}

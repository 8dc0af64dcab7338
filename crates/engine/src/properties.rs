//! Consumer configuration passed through to the engine verbatim.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clipframe_common::error::ClipframeError;

/// Scaling algorithm names understood by the engine's `rescale` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rescale {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
    Hyper,
}

impl Rescale {
    pub fn as_str(self) -> &'static str {
        match self {
            Rescale::Nearest => "nearest",
            Rescale::Bilinear => "bilinear",
            Rescale::Bicubic => "bicubic",
            Rescale::Hyper => "hyper",
        }
    }
}

impl fmt::Display for Rescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rescale {
    type Err = ClipframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(Rescale::Nearest),
            "bilinear" => Ok(Rescale::Bilinear),
            "bicubic" => Ok(Rescale::Bicubic),
            "hyper" => Ok(Rescale::Hyper),
            other => Err(ClipframeError::engine(format!(
                "Unknown rescale mode '{other}' (expected nearest, bilinear, bicubic or hyper)"
            ))),
        }
    }
}

/// Ordered key/value options. Values are stored as the engine receives them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub const REAL_TIME: &'static str = "real_time";
    pub const RESCALE: &'static str = "rescale";
    pub const RESIZE: &'static str = "resize";
    pub const PROGRESSIVE: &'static str = "progressive";
    pub const SCRUB_AUDIO: &'static str = "scrub_audio";
    pub const VCODEC: &'static str = "vcodec";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    /// Non-zero integers and `"true"` count as set.
    pub fn get_flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some("true") => true,
            Some(_) => self.get_int(key).is_some_and(|v| v != 0),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `real_time`: 1 drops frames to keep pace, 0 or negative renders every frame.
    pub fn real_time(&mut self, value: i32) -> &mut Self {
        self.set(Self::REAL_TIME, value)
    }

    pub fn rescale(&mut self, mode: Rescale) -> &mut Self {
        self.set(Self::RESCALE, mode.as_str())
    }

    pub fn resize(&mut self, enabled: bool) -> &mut Self {
        self.set(Self::RESIZE, u8::from(enabled))
    }

    pub fn progressive(&mut self, enabled: bool) -> &mut Self {
        self.set(Self::PROGRESSIVE, u8::from(enabled))
    }

    pub fn scrub_audio(&mut self, enabled: bool) -> &mut Self {
        self.set(Self::SCRUB_AUDIO, u8::from(enabled))
    }

    pub fn vcodec(&mut self, codec: &str) -> &mut Self {
        self.set(Self::VCODEC, codec)
    }

    pub fn rescale_mode(&self) -> Option<Rescale> {
        self.get(Self::RESCALE)?.parse().ok()
    }

    pub fn is_real_time(&self) -> bool {
        self.get_int(Self::REAL_TIME).is_some_and(|v| v > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_store_engine_values() {
        let mut props = Properties::new();
        props
            .real_time(-1)
            .rescale(Rescale::Bicubic)
            .resize(true)
            .scrub_audio(false)
            .vcodec("png");

        assert_eq!(props.get("real_time"), Some("-1"));
        assert_eq!(props.get("rescale"), Some("bicubic"));
        assert_eq!(props.get("resize"), Some("1"));
        assert_eq!(props.get("scrub_audio"), Some("0"));
        assert_eq!(props.get("vcodec"), Some("png"));
        assert!(!props.is_real_time());
        assert!(props.get_flag("resize"));
        assert!(!props.get_flag("scrub_audio"));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let mut props = Properties::new();
        props.set("deinterlace_method", "yadif");
        assert_eq!(props.iter().count(), 1);
        assert_eq!(props.get("deinterlace_method"), Some("yadif"));
    }

    #[test]
    fn test_rescale_parse() {
        assert_eq!("hyper".parse::<Rescale>().unwrap(), Rescale::Hyper);
        assert!("lanczos".parse::<Rescale>().is_err());
    }
}

//! Picks the output profile that best fits a sample clip.

use std::path::Path;
use std::sync::Arc;

use clipframe_common::error::ClipframeResult;
use clipframe_engine::{MediaEngine, MediaInfo, Profile, ProfileCatalog};

/// Outcome of resolving a clip against the catalog.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    /// Index into the catalog.
    pub index: usize,
    pub profile: Profile,
    /// The clip's native properties that drove the choice.
    pub info: MediaInfo,
}

pub struct ProfileResolver {
    engine: Arc<dyn MediaEngine>,
    catalog: ProfileCatalog,
}

impl ProfileResolver {
    pub fn new(engine: Arc<dyn MediaEngine>, catalog: ProfileCatalog) -> Self {
        Self { engine, catalog }
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Open `clip_path` under the default profile, inspect it, and return
    /// the closest catalog profile. The returned profile is what every
    /// player and writer for this clip should be built with.
    pub fn resolve(&self, clip_path: &Path) -> ClipframeResult<ResolvedProfile> {
        let producer = self
            .engine
            .open_producer(self.catalog.default_profile(), clip_path)?;
        let info = producer.info().clone();
        let index = self.catalog.closest_match(&info);
        let profile = self
            .catalog
            .get(index)
            .unwrap_or_else(|| self.catalog.default_profile())
            .clone();

        tracing::info!(
            clip = %clip_path.display(),
            index,
            profile = %profile.name,
            width = info.width,
            height = info.height,
            fps = %info.frame_rate,
            "Resolved clip profile"
        );

        Ok(ResolvedProfile {
            index,
            profile,
            info,
        })
    }
}

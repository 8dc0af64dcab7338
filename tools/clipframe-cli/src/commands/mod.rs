pub mod check;
pub mod frame;
pub mod probe;
pub mod profiles;
pub mod range;
pub mod script;

use std::path::Path;
use std::sync::Arc;

use clipframe_common::config::AppConfig;
use clipframe_engine::{FfmpegEngine, MediaEngine, Profile, ProfileCatalog};
use clipframe_player::ProfileResolver;

pub fn engine(config: &AppConfig) -> Arc<dyn MediaEngine> {
    Arc::new(FfmpegEngine::new(&config.tools))
}

pub fn catalog(config: &AppConfig) -> anyhow::Result<ProfileCatalog> {
    ProfileCatalog::from_config(&config.profiles)
        .map_err(|e| anyhow::anyhow!("Failed to build profile catalog: {e}"))
}

/// The named profile, or the catalog's closest match for `clip`.
pub fn pick_profile(
    config: &AppConfig,
    engine: &Arc<dyn MediaEngine>,
    clip: &Path,
    name: Option<&str>,
) -> anyhow::Result<Profile> {
    let catalog = catalog(config)?;
    match name {
        Some(name) => catalog
            .by_name(name)
            .map(|(_, profile)| profile.clone())
            .ok_or_else(|| anyhow::anyhow!("Unknown profile: {name}. See `clipframe profiles`")),
        None => {
            let resolved = ProfileResolver::new(Arc::clone(engine), catalog).resolve(clip)?;
            Ok(resolved.profile)
        }
    }
}
